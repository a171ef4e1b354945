use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteExecutor};
use ts_rs::TS;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct FeatureFlag {
    pub key: String,
    pub enabled: bool,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    pub async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, FeatureFlag>(
            "SELECT key, enabled, description, updated_at FROM feature_flags ORDER BY key ASC",
        )
        .fetch_all(executor)
        .await
    }

    pub async fn find_by_key<'e, E>(executor: E, key: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, FeatureFlag>(
            "SELECT key, enabled, description, updated_at FROM feature_flags WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(executor)
        .await
    }

    /// Inserts or updates a flag. A `None` description keeps the stored one.
    pub async fn upsert<'e, E>(
        executor: E,
        key: &str,
        enabled: bool,
        description: Option<&str>,
    ) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, FeatureFlag>(
            r#"INSERT INTO feature_flags (key, enabled, description)
               VALUES ($1, $2, $3)
               ON CONFLICT(key) DO UPDATE SET
                   enabled = excluded.enabled,
                   description = COALESCE(excluded.description, feature_flags.description),
                   updated_at = datetime('now', 'subsec')
               RETURNING key, enabled, description, updated_at"#,
        )
        .bind(key)
        .bind(enabled)
        .bind(description)
        .fetch_one(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn upsert_keeps_description_when_omitted() {
        let db = DBService::new_in_memory().await.unwrap();
        FeatureFlag::upsert(&db.pool, "claims_enabled", true, Some("Allow claim requests"))
            .await
            .unwrap();
        let flag = FeatureFlag::upsert(&db.pool, "claims_enabled", false, None)
            .await
            .unwrap();

        assert!(!flag.enabled);
        assert_eq!(flag.description.as_deref(), Some("Allow claim requests"));
        assert_eq!(FeatureFlag::find_all(&db.pool).await.unwrap().len(), 1);
    }
}
