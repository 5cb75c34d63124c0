//! Per-field input validation
//!
//! Handlers collect every problem with a request body before answering, so
//! clients get the full `{field: [messages]}` map in a single 422.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use super::error::{ApiError, Result};

/// Validation messages keyed by field name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// `Ok(())` when nothing was recorded, otherwise a 422 error
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<&str> = self.0.keys().map(String::as_str).collect();
        write!(f, "{}", fields.join(", "))
    }
}

/// Accumulating validator over request fields
#[derive(Debug, Default)]
pub struct Validator {
    errors: FieldErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field must be present and non-blank
    pub fn required(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if value.map(|v| v.trim().is_empty()).unwrap_or(true) {
            self.errors
                .add(field, format!("Το πεδίο {} είναι υποχρεωτικό.", field));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.errors.add(
                    field,
                    format!("Το πεδίο {} δεν μπορεί να ξεπερνά τους {} χαρακτήρες.", field, max),
                );
            }
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize) -> &mut Self {
        if let Some(v) = value {
            if v.chars().count() < min {
                self.errors.add(
                    field,
                    format!("Το πεδίο {} πρέπει να έχει τουλάχιστον {} χαρακτήρες.", field, min),
                );
            }
        }
        self
    }

    pub fn email(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            if !v.trim().is_empty() && !is_valid_email(v) {
                self.errors.add(
                    field,
                    format!("Το πεδίο {} πρέπει να είναι έγκυρη διεύθυνση email.", field),
                );
            }
        }
        self
    }

    /// `value` must equal its `<field>_confirmation` counterpart
    pub fn confirmed(&mut self, field: &str, value: Option<&str>, confirmation: Option<&str>) -> &mut Self {
        if value.is_some() && value != confirmation {
            self.errors
                .add(field, format!("Η επιβεβαίωση του πεδίου {} δεν ταιριάζει.", field));
        }
        self
    }

    pub fn min_value(&mut self, field: &str, value: Option<i64>, min: i64) -> &mut Self {
        if let Some(v) = value {
            if v < min {
                self.errors.add(
                    field,
                    format!("Το πεδίο {} πρέπει να είναι τουλάχιστον {}.", field, min),
                );
            }
        }
        self
    }

    /// Record an arbitrary failure when `condition` does not hold
    pub fn check(&mut self, condition: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if !condition {
            self.errors.add(field, message);
        }
        self
    }

    pub fn finish(self) -> Result<()> {
        self.errors.into_result()
    }
}

fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_all_failures() {
        let mut v = Validator::new();
        v.required("name", Some("  "))
            .email("email", Some("not-an-email"))
            .min_len("password", Some("short"), 8);

        match v.finish() {
            Err(ApiError::Validation(errors)) => {
                assert!(errors.contains("name"));
                assert!(errors.contains("email"));
                assert!(errors.contains("password"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_input_passes() {
        let mut v = Validator::new();
        v.required("name", Some("Μαρία"))
            .email("email", Some("maria@example.gr"))
            .confirmed("password", Some("secret123"), Some("secret123"));
        assert!(v.finish().is_ok());
    }

    #[test]
    fn test_email_shapes() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a b@c.co"));
        assert!(!is_valid_email("a@@b.co"));
    }

    #[test]
    fn test_confirmation_mismatch() {
        let mut v = Validator::new();
        v.confirmed("password", Some("one"), Some("two"));
        let errors = match v.finish() {
            Err(ApiError::Validation(e)) => e,
            _ => unreachable!(),
        };
        assert_eq!(errors.get("password").map(|m| m.len()), Some(1));
    }
}
