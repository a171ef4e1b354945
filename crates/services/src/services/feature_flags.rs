//! Runtime feature toggles with a short-lived in-process cache.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use db::models::feature_flag::FeatureFlag;
use moka::future::Cache;
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::validation::FieldErrors;

use super::audit::diff;

const KEY_MAX: usize = 64;
const DESCRIPTION_MAX: usize = 500;
const ALL_FLAGS: &str = "all";

pub type FlagMap = Arc<BTreeMap<String, bool>>;

#[derive(Debug, Error)]
pub enum FeatureFlagError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database error: {0}")]
    Load(#[from] Arc<sqlx::Error>),
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SetFeatureFlag {
    pub enabled: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FlagChange {
    pub before: Option<FeatureFlag>,
    pub after: FeatureFlag,
}

impl FlagChange {
    /// Field diff for the audit log; a new flag diffs against an empty row.
    pub fn changes(&self) -> Value {
        let before = self.before.as_ref().map_or_else(|| json!({}), |flag| json!(flag));
        diff(&before, &json!(self.after))
    }
}

#[derive(Clone)]
pub struct FeatureFlagService {
    pool: SqlitePool,
    cache: Cache<&'static str, FlagMap>,
    // Bumped by every write; a load that straddles a write drops its result.
    generation: Arc<AtomicU64>,
}

impl FeatureFlagService {
    pub fn new(pool: SqlitePool, ttl: Duration) -> Self {
        Self {
            pool,
            cache: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Every flag as `key → enabled`, served from cache when fresh.
    /// Concurrent misses share a single load.
    pub async fn all(&self) -> Result<FlagMap, FeatureFlagError> {
        let generation = self.generation.load(Ordering::SeqCst);
        let flags = self.cache.try_get_with(ALL_FLAGS, self.load()).await?;
        self.discard_if_stale(generation).await;
        Ok(flags)
    }

    async fn load(&self) -> Result<FlagMap, sqlx::Error> {
        let flags: FlagMap = Arc::new(
            FeatureFlag::find_all(&self.pool)
                .await?
                .into_iter()
                .map(|f| (f.key, f.enabled))
                .collect(),
        );
        debug!(count = flags.len(), "feature flags loaded");
        Ok(flags)
    }

    /// Drops the cached map if a write landed after `generation` was read,
    /// since the map may have been loaded before that write.
    async fn discard_if_stale(&self, generation: u64) {
        if self.generation.load(Ordering::SeqCst) != generation {
            self.cache.invalidate(ALL_FLAGS).await;
        }
    }

    /// Unknown flags are off.
    pub async fn is_enabled(&self, key: &str) -> Result<bool, FeatureFlagError> {
        Ok(self.all().await?.get(key).copied().unwrap_or(false))
    }

    /// Full rows for the admin screen, bypassing the cache.
    pub async fn list(&self) -> Result<Vec<FeatureFlag>, FeatureFlagError> {
        Ok(FeatureFlag::find_all(&self.pool).await?)
    }

    pub async fn set(&self, key: &str, input: &SetFeatureFlag) -> Result<FlagChange, FeatureFlagError> {
        let mut errors = FieldErrors::new();
        if !is_valid_key(key) {
            errors.add(
                "key",
                format!("must be 1 to {KEY_MAX} characters of a-z, 0-9 or _"),
            );
        }
        let description = input
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty());
        if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX) {
            errors.add(
                "description",
                format!("must be at most {DESCRIPTION_MAX} characters"),
            );
        }
        errors.into_result().map_err(FeatureFlagError::Validation)?;

        let before = FeatureFlag::find_by_key(&self.pool, key).await?;
        let after = FeatureFlag::upsert(&self.pool, key, input.enabled, description).await?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate(ALL_FLAGS).await;

        info!(key, enabled = after.enabled, "feature flag updated");
        Ok(FlagChange { before, after })
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= KEY_MAX
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;

    #[test]
    fn keys_are_snake_case() {
        assert!(is_valid_key("bulk_import_v2"));
        assert!(!is_valid_key("Bulk-Import"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key(&"a".repeat(KEY_MAX + 1)));
    }

    #[tokio::test]
    async fn writes_through_the_service_invalidate_the_cache() {
        let db = DBService::new_in_memory().await.unwrap();
        let flags = FeatureFlagService::new(db.pool.clone(), Duration::from_secs(300));
        assert!(!flags.is_enabled("claims_enabled").await.unwrap());

        // A write behind the service's back stays invisible until the TTL.
        FeatureFlag::upsert(&db.pool, "claims_enabled", true, None)
            .await
            .unwrap();
        assert!(!flags.is_enabled("claims_enabled").await.unwrap());

        let change = flags
            .set(
                "claims_enabled",
                &SetFeatureFlag {
                    enabled: true,
                    description: Some("Accept claim requests".into()),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            change.changes(),
            json!({
                "description": { "old": null, "new": "Accept claim requests" }
            })
        );
        assert!(change.before.is_some_and(|f| f.enabled));
        assert_eq!(
            change.after.description.as_deref(),
            Some("Accept claim requests")
        );
        assert!(flags.is_enabled("claims_enabled").await.unwrap());
    }

    #[tokio::test]
    async fn a_load_overtaken_by_a_write_is_not_kept() {
        let db = DBService::new_in_memory().await.unwrap();
        let flags = FeatureFlagService::new(db.pool.clone(), Duration::from_secs(300));

        // A reader snapshots the generation and reads the table...
        let generation = flags.generation.load(Ordering::SeqCst);
        let stale = flags.load().await.unwrap();

        // ...a write lands and invalidates...
        flags
            .set(
                "claims_enabled",
                &SetFeatureFlag {
                    enabled: true,
                    description: None,
                },
            )
            .await
            .unwrap();

        // ...and only then does the slow reader's map reach the cache.
        flags.cache.insert(ALL_FLAGS, stale).await;
        flags.discard_if_stale(generation).await;

        assert!(flags.cache.get(ALL_FLAGS).await.is_none());
        assert!(flags.is_enabled("claims_enabled").await.unwrap());
    }

    #[tokio::test]
    async fn invalid_keys_are_rejected() {
        let db = DBService::new_in_memory().await.unwrap();
        let flags = FeatureFlagService::new(db.pool.clone(), Duration::from_secs(60));
        let err = flags
            .set(
                "Not A Key",
                &SetFeatureFlag {
                    enabled: true,
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FeatureFlagError::Validation(_)));
        assert!(flags.all().await.unwrap().is_empty());
    }
}
