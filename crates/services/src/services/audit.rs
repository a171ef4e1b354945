//! Best-effort audit trail for admin mutations.

use chrono::{DateTime, Utc};
use db::models::audit_log::{AuditLogEntry, AuditLogFilter, CreateAuditLog};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::warn;
use ts_rs::TS;
use utils::validation::{FieldErrors, non_empty};
use uuid::Uuid;

use super::agencies::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Fields that change on every write and would only add noise to a diff.
const IGNORED_FIELDS: &[&str] = &["updated_at"];

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AuditLogParams {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// An entry with its change set decoded for the admin screen.
#[derive(Debug, Clone, Serialize, TS)]
pub struct AuditLogView {
    pub id: Uuid,
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub changes: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl From<AuditLogEntry> for AuditLogView {
    fn from(entry: AuditLogEntry) -> Self {
        Self {
            changes: entry.parsed_changes(),
            id: entry.id,
            actor_id: entry.actor_id,
            action: entry.action,
            entity_type: entry.entity_type,
            entity_id: entry.entity_id,
            created_at: entry.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct AuditLogPage {
    pub entries: Vec<AuditLogView>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Clone)]
pub struct AuditLogger {
    pool: SqlitePool,
}

impl AuditLogger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Writes the entry. Failures are logged and swallowed: audit logging
    /// must not break the operation being audited.
    pub async fn record(&self, entry: CreateAuditLog) {
        if let Err(e) = AuditLogEntry::create(&self.pool, &entry).await {
            warn!(
                action = %entry.action,
                entity_type = %entry.entity_type,
                entity_id = ?entry.entity_id,
                error = %e,
                "failed to write audit log entry"
            );
        }
    }

    /// Newest entries first.
    pub async fn list(&self, params: &AuditLogParams) -> Result<AuditLogPage, AuditLogError> {
        let mut errors = FieldErrors::new();
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            errors.add("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }
        let offset = params.offset.unwrap_or(0);
        if offset < 0 {
            errors.add("offset", "must not be negative");
        }
        errors.into_result().map_err(AuditLogError::Validation)?;

        let filter = AuditLogFilter {
            entity_type: non_empty(params.entity_type.as_deref()),
            entity_id: non_empty(params.entity_id.as_deref()),
            actor_id: params.actor_id,
            action: non_empty(params.action.as_deref()),
            limit,
            offset,
        };
        let entries = AuditLogEntry::list(&self.pool, &filter).await?;
        let total = AuditLogEntry::count(&self.pool, &filter).await?;
        Ok(AuditLogPage {
            has_more: offset + (entries.len() as i64) < total,
            entries: entries.into_iter().map(AuditLogView::from).collect(),
            total,
            limit,
            offset,
        })
    }
}

/// `{ field: { old, new } }` for every top-level field that differs between
/// the two serialised values.
pub fn diff<T: Serialize>(before: &T, after: &T) -> Value {
    let before = serde_json::to_value(before).unwrap_or(Value::Null);
    let after = serde_json::to_value(after).unwrap_or(Value::Null);

    let (Value::Object(before), Value::Object(after)) = (before, after) else {
        return Value::Object(Map::new());
    };

    let mut changes = Map::new();
    for (key, new) in &after {
        if IGNORED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let old = before.get(key).cloned().unwrap_or(Value::Null);
        if &old != new {
            changes.insert(key.clone(), json!({ "old": old, "new": new }));
        }
    }
    Value::Object(changes)
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        phone: Option<&'static str>,
        updated_at: u32,
    }

    #[test]
    fn diff_reports_changed_fields_only() {
        let before = Row {
            name: "Acme",
            phone: None,
            updated_at: 1,
        };
        let after = Row {
            name: "Acme",
            phone: Some("555-123-4567"),
            updated_at: 2,
        };
        assert_eq!(
            diff(&before, &after),
            json!({ "phone": { "old": null, "new": "555-123-4567" } })
        );
    }

    #[tokio::test]
    async fn record_never_fails_the_caller() {
        let db = DBService::new_in_memory().await.unwrap();
        let logger = AuditLogger::new(db.pool.clone());
        logger
            .record(CreateAuditLog::new(None, "agency.create", "agency", None))
            .await;
        let filter = AuditLogFilter {
            limit: 10,
            ..Default::default()
        };
        assert_eq!(AuditLogEntry::count(&db.pool, &filter).await.unwrap(), 1);

        // A closed pool makes the insert fail; the call still returns.
        db.pool.close().await;
        logger
            .record(CreateAuditLog::new(None, "agency.update", "agency", None))
            .await;
    }

    #[tokio::test]
    async fn list_filters_and_decodes_changes() {
        let db = DBService::new_in_memory().await.unwrap();
        let logger = AuditLogger::new(db.pool.clone());
        let actor = Uuid::new_v4();
        logger
            .record(
                CreateAuditLog::new(Some(actor), "agency.update", "agency", Some("a1".into()))
                    .with_changes(json!({ "name": { "old": "Acme", "new": "Acme Staffing" } })),
            )
            .await;
        logger
            .record(CreateAuditLog::new(None, "agency.bulk_import", "agency", None))
            .await;

        let page = logger
            .list(&AuditLogParams {
                action: Some("agency.update".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert!(!page.has_more);
        assert_eq!(page.entries[0].actor_id, Some(actor));
        assert_eq!(
            page.entries[0].changes,
            Some(json!({ "name": { "old": "Acme", "new": "Acme Staffing" } }))
        );

        let err = logger
            .list(&AuditLogParams {
                limit: Some(0),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuditLogError::Validation(_)));
    }
}
