//! Page slicing for list endpoints

use serde::Serialize;

/// Requested page, already clamped to the configured size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, per_page: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page.max(1),
        }
    }
}

/// Pagination block returned as `meta` next to list data
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: u32,
    pub per_page: u32,
    pub total: usize,
    pub last_page: u32,
}

/// One page of results
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    /// Slice an already filtered and sorted result set
    pub fn from_vec(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let per_page = request.per_page as usize;
        let last_page = total.div_ceil(per_page).max(1) as u32;
        let skip = (request.page as usize - 1).saturating_mul(per_page);

        Self {
            items: all.into_iter().skip(skip).take(per_page).collect(),
            meta: PageMeta {
                current_page: request.page,
                per_page: request.per_page,
                total,
                last_page,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// Case-insensitive substring match used by `search` filters
pub fn matches_search(search: Option<&str>, fields: &[Option<&str>]) -> bool {
    let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) else {
        return true;
    };
    let needle = needle.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_pages() {
        let page = Page::from_vec((1..=7).collect::<Vec<_>>(), PageRequest::new(Some(2), 3));
        assert_eq!(page.items, vec![4, 5, 6]);
        assert_eq!(page.meta.total, 7);
        assert_eq!(page.meta.last_page, 3);

        let past_end = Page::from_vec((1..=7).collect::<Vec<_>>(), PageRequest::new(Some(9), 3));
        assert!(past_end.items.is_empty());
        assert_eq!(past_end.meta.current_page, 9);
    }

    #[test]
    fn test_empty_set_has_one_page() {
        let page: Page<u8> = Page::from_vec(Vec::new(), PageRequest::new(None, 15));
        assert_eq!(page.meta.current_page, 1);
        assert_eq!(page.meta.last_page, 1);
    }

    #[test]
    fn test_search_matching() {
        assert!(matches_search(None, &[Some("anything")]));
        assert!(matches_search(Some("  "), &[None]));
        assert!(matches_search(Some("ΠΥΡΟ"), &[None, Some("Πυροπροστασία δασών")]));
        assert!(!matches_search(Some("flood"), &[Some("Fire watch"), None]));
    }
}
