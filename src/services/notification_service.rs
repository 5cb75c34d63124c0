//! Notification service - per-user inbox
//!
//! Notifications are written by the event listener in `crate::notify`;
//! users only read them and mark them read.

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::db::schemas::NotificationDoc;
use crate::db::Collection;
use crate::types::{ApiError, Result};

use super::pagination::{Page, PageRequest};
use super::Caller;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct NotificationFilter {
    #[serde(default)]
    pub unread: bool,
}

pub struct NotificationService {
    notifications: Collection<NotificationDoc>,
}

impl NotificationService {
    pub fn new(notifications: Collection<NotificationDoc>) -> Self {
        Self { notifications }
    }

    async fn own(&self, user_id: &str) -> Result<Vec<NotificationDoc>> {
        self.notifications
            .find(bson::doc! { "user_id": user_id })
            .await
    }

    /// Store a notification for one user
    pub async fn notify(
        &self,
        user_id: &str,
        kind: &str,
        title: String,
        message: String,
        data: Value,
    ) -> Result<NotificationDoc> {
        self.notifications
            .insert(NotificationDoc::new(user_id, kind, title, message, data))
            .await
    }

    /// Caller's notifications, newest first
    pub async fn list(
        &self,
        caller: &Caller,
        filter: &NotificationFilter,
        page: PageRequest,
    ) -> Result<Page<NotificationDoc>> {
        let mut items: Vec<NotificationDoc> = self
            .own(&caller.actor.id)
            .await?
            .into_iter()
            .filter(|n| !filter.unread || !n.is_read())
            .collect();
        items.sort_by(|a, b| b.metadata.created().cmp(&a.metadata.created()));
        Ok(Page::from_vec(items, page))
    }

    pub async fn unread_count(&self, caller: &Caller) -> Result<usize> {
        Ok(self
            .own(&caller.actor.id)
            .await?
            .iter()
            .filter(|n| !n.is_read())
            .count())
    }

    /// Mark one of the caller's notifications read; other users' answer 404
    pub async fn mark_read(&self, caller: &Caller, id: &str) -> Result<NotificationDoc> {
        let notification = self
            .notifications
            .get(id)
            .await?
            .filter(|n| n.user_id == caller.actor.id)
            .ok_or_else(|| ApiError::NotFound("Η ειδοποίηση δεν βρέθηκε.".into()))?;

        if notification.is_read() {
            return Ok(notification);
        }
        let mut notification = notification;
        notification.read_at = Some(Utc::now());
        self.notifications.update(notification).await
    }

    /// Returns how many notifications changed
    pub async fn mark_all_read(&self, caller: &Caller) -> Result<usize> {
        let now = Utc::now();
        let mut changed = 0;
        for mut notification in self.own(&caller.actor.id).await? {
            if notification.is_read() {
                continue;
            }
            notification.read_at = Some(now);
            match self.notifications.update(notification).await {
                Ok(_) => changed += 1,
                // Someone else marked it in the meantime
                Err(ApiError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(changed)
    }
}
