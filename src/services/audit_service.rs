//! Audit service - append-only record of mutating operations

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use crate::db::schemas::{AuditLogDoc, Metadata};
use crate::db::Collection;
use crate::types::Result;

use super::pagination::{Page, PageRequest};
use super::Caller;

/// Filters for the audit log listing
#[derive(Debug, Default, Clone, Deserialize)]
pub struct AuditFilter {
    pub actor_id: Option<String>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

pub struct AuditService {
    logs: Collection<AuditLogDoc>,
}

impl AuditService {
    pub fn new(logs: Collection<AuditLogDoc>) -> Self {
        Self { logs }
    }

    /// Append an entry for an action taken by an authenticated caller
    pub async fn record(
        &self,
        caller: &Caller,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        changes: Value,
    ) {
        self.append(
            Some(caller.actor.id.clone()),
            caller.ip.clone(),
            action,
            entity_type,
            entity_id,
            changes,
        )
        .await
    }

    /// Append an entry.
    ///
    /// Failures are logged and swallowed: the audited change already
    /// happened and the client should still see its result.
    pub async fn append(
        &self,
        actor_id: Option<String>,
        ip_address: Option<String>,
        action: &str,
        entity_type: &str,
        entity_id: &str,
        changes: Value,
    ) {
        let entry = AuditLogDoc {
            id: uuid::Uuid::new_v4().to_string(),
            metadata: Metadata::new(),
            actor_id,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            changes,
            ip_address,
        };

        if let Err(e) = self.logs.insert(entry).await {
            error!(action, entity_type, entity_id, "Failed to write audit log: {}", e);
        }
    }

    /// Newest first. Equality filters go to the store; the time window is
    /// applied to what comes back.
    pub async fn list(&self, filter: &AuditFilter, page: PageRequest) -> Result<Page<AuditLogDoc>> {
        let mut query = bson::Document::new();
        if let Some(ref actor_id) = filter.actor_id {
            query.insert("actor_id", actor_id.as_str());
        }
        if let Some(ref entity_type) = filter.entity_type {
            query.insert("entity_type", entity_type.as_str());
        }
        if let Some(ref action) = filter.action {
            query.insert("action", action.as_str());
        }

        let mut entries: Vec<AuditLogDoc> = self
            .logs
            .find(query)
            .await?
            .into_iter()
            .filter(|e| filter.from.map_or(true, |from| e.metadata.created() >= from))
            .filter(|e| filter.to.map_or(true, |to| e.metadata.created() <= to))
            .collect();

        entries.sort_by(|a, b| b.metadata.created().cmp(&a.metadata.created()));
        Ok(Page::from_vec(entries, page))
    }

    /// Every entry for one entity, oldest first
    pub async fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogDoc>> {
        let mut entries = self
            .logs
            .find(bson::doc! { "entity_type": entity_type, "entity_id": entity_id })
            .await?;
        entries.sort_by(|a, b| a.metadata.created().cmp(&b.metadata.created()));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_list_filters_in_query() {
        let audit = AuditService::new(Collection::new(Arc::new(MemoryStore::new())));
        audit
            .append(Some("u1".into()), None, "mission.created", "mission", "m1", json!({}))
            .await;
        audit
            .append(Some("u1".into()), None, "shift.created", "shift", "s1", json!({}))
            .await;
        audit
            .append(Some("u2".into()), None, "mission.created", "mission", "m2", json!({}))
            .await;
        audit
            .append(None, None, "auth.failed_login", "user", "u3", json!({}))
            .await;

        let by_actor = AuditFilter {
            actor_id: Some("u1".into()),
            ..Default::default()
        };
        let page = audit.list(&by_actor, PageRequest::new(None, 20)).await.unwrap();
        assert_eq!(page.meta.total, 2);

        let by_action = AuditFilter {
            action: Some("mission.created".into()),
            entity_type: Some("mission".into()),
            ..Default::default()
        };
        let page = audit.list(&by_action, PageRequest::new(None, 20)).await.unwrap();
        assert_eq!(page.meta.total, 2);
        assert!(page.items.iter().all(|e| e.action == "mission.created"));

        let page = audit
            .list(&AuditFilter::default(), PageRequest::new(None, 20))
            .await
            .unwrap();
        assert_eq!(page.meta.total, 4);
    }
}
