use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};
use ts_rs::TS;
use uuid::Uuid;

use super::lookup::{LookupMatch, resolve_lookup};

/// A construction trade an agency staffs for (e.g. Electrical).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Trade {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AgencyTradeRow {
    agency_id: Uuid,
    #[sqlx(flatten)]
    trade: Trade,
}

impl Trade {
    pub async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Trade>(
            r#"SELECT id, name, slug, created_at FROM trades ORDER BY name ASC"#,
        )
        .fetch_all(executor)
        .await
    }

    /// Matches user input (slug or case-insensitive name) against the
    /// catalogue. Unmatched inputs are returned as they were given.
    pub async fn resolve<'e, E>(
        executor: E,
        inputs: &[String],
    ) -> Result<LookupMatch<Trade>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let all = Self::find_all(executor).await?;
        Ok(resolve_lookup(all, inputs, |t| (&t.name, &t.slug)))
    }

    /// Trades for each of `agency_ids`, keyed by agency.
    pub async fn find_for_agencies<'e, E>(
        executor: E,
        agency_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Trade>>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut grouped: HashMap<Uuid, Vec<Trade>> = HashMap::new();
        if agency_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT at.agency_id, t.id, t.name, t.slug, t.created_at
               FROM agency_trades at
               JOIN trades t ON t.id = at.trade_id
               WHERE at.agency_id IN ("#,
        );
        let mut ids = qb.separated(", ");
        for id in agency_ids {
            ids.push_bind(*id);
        }
        qb.push(") ORDER BY t.name ASC");

        let rows = qb
            .build_query_as::<AgencyTradeRow>()
            .fetch_all(executor)
            .await?;
        for row in rows {
            grouped.entry(row.agency_id).or_default().push(row.trade);
        }
        Ok(grouped)
    }

    /// Replaces the agency's trade set.
    pub async fn replace_for_agency(
        conn: &mut SqliteConnection,
        agency_id: Uuid,
        trade_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM agency_trades WHERE agency_id = $1")
            .bind(agency_id)
            .execute(&mut *conn)
            .await?;
        for trade_id in trade_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO agency_trades (agency_id, trade_id) VALUES ($1, $2)",
            )
            .bind(agency_id)
            .bind(trade_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn seeded_trades_resolve_by_name_or_slug() {
        let db = DBService::new_in_memory().await.unwrap();
        let found = Trade::resolve(
            &db.pool,
            &[
                "electrical".to_string(),
                "Heavy Equipment Operation".to_string(),
                "Underwater Basket Weaving".to_string(),
            ],
        )
        .await
        .unwrap();

        let slugs: Vec<_> = found.matched.iter().map(|t| t.slug.as_str()).collect();
        assert_eq!(slugs, vec!["electrical", "heavy-equipment-operation"]);
        assert_eq!(found.unknown, vec!["Underwater Basket Weaving".to_string()]);
    }
}
