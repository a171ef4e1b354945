use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteExecutor};
use ts_rs::TS;
use uuid::Uuid;

/// Immutable record of an admin mutation. The table rejects UPDATE and
/// DELETE at the trigger level.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub actor_id: Option<Uuid>, // None for the command-line importer
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    #[ts(type = "string | null")]
    pub changes: Option<String>, // JSON-serialized
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    pub fn parsed_changes(&self) -> Option<Value> {
        self.changes
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
    }
}

#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub actor_id: Option<Uuid>,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub changes: Option<Value>,
}

impl CreateAuditLog {
    pub fn new(
        actor_id: Option<Uuid>,
        action: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: Option<String>,
    ) -> Self {
        Self {
            actor_id,
            action: action.into(),
            entity_type: entity_type.into(),
            entity_id,
            changes: None,
        }
    }

    pub fn with_changes(mut self, changes: Value) -> Self {
        self.changes = Some(changes);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub actor_id: Option<Uuid>,
    pub action: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditLogEntry {
    pub async fn create<'e, E>(executor: E, data: &CreateAuditLog) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let changes = data
            .changes
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| sqlx::Error::Protocol(e.to_string()))?;
        sqlx::query_as::<_, AuditLogEntry>(
            r#"INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, changes)
               VALUES ($1, $2, $3, $4, $5, $6)
               RETURNING id, actor_id, action, entity_type, entity_id, changes, created_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(data.actor_id)
        .bind(&data.action)
        .bind(&data.entity_type)
        .bind(&data.entity_id)
        .bind(changes)
        .fetch_one(executor)
        .await
    }

    pub async fn list<'e, E>(
        executor: E,
        filter: &AuditLogFilter,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, actor_id, action, entity_type, entity_id, changes, created_at FROM audit_logs",
        );
        push_audit_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, rowid DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        qb.build_query_as::<AuditLogEntry>().fetch_all(executor).await
    }

    pub async fn count<'e, E>(executor: E, filter: &AuditLogFilter) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM audit_logs");
        push_audit_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>().fetch_one(executor).await
    }
}

fn push_audit_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AuditLogFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(entity_type) = &filter.entity_type {
        qb.push(" AND entity_type = ").push_bind(entity_type.clone());
    }
    if let Some(entity_id) = &filter.entity_id {
        qb.push(" AND entity_id = ").push_bind(entity_id.clone());
    }
    if let Some(actor_id) = filter.actor_id {
        qb.push(" AND actor_id = ").push_bind(actor_id);
    }
    if let Some(action) = &filter.action {
        qb.push(" AND action = ").push_bind(action.clone());
    }
}
