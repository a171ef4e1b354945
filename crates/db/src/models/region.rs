use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};
use ts_rs::TS;
use uuid::Uuid;

use super::lookup::{LookupMatch, resolve_lookup};

/// A metro area or service region; `state_code` is the two-letter state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Region {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub state_code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct AgencyRegionRow {
    agency_id: Uuid,
    #[sqlx(flatten)]
    region: Region,
}

impl Region {
    pub async fn find_all<'e, E>(executor: E) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Region>(
            r#"SELECT id, name, slug, state_code, created_at FROM regions ORDER BY name ASC"#,
        )
        .fetch_all(executor)
        .await
    }

    pub async fn resolve<'e, E>(
        executor: E,
        inputs: &[String],
    ) -> Result<LookupMatch<Region>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let all = Self::find_all(executor).await?;
        Ok(resolve_lookup(all, inputs, |r| (&r.name, &r.slug)))
    }

    pub async fn find_for_agencies<'e, E>(
        executor: E,
        agency_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<Region>>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut grouped: HashMap<Uuid, Vec<Region>> = HashMap::new();
        if agency_ids.is_empty() {
            return Ok(grouped);
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            r#"SELECT ar.agency_id, r.id, r.name, r.slug, r.state_code, r.created_at
               FROM agency_regions ar
               JOIN regions r ON r.id = ar.region_id
               WHERE ar.agency_id IN ("#,
        );
        let mut ids = qb.separated(", ");
        for id in agency_ids {
            ids.push_bind(*id);
        }
        qb.push(") ORDER BY r.name ASC");

        let rows = qb
            .build_query_as::<AgencyRegionRow>()
            .fetch_all(executor)
            .await?;
        for row in rows {
            grouped.entry(row.agency_id).or_default().push(row.region);
        }
        Ok(grouped)
    }

    pub async fn replace_for_agency(
        conn: &mut SqliteConnection,
        agency_id: Uuid,
        region_ids: &[Uuid],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM agency_regions WHERE agency_id = $1")
            .bind(agency_id)
            .execute(&mut *conn)
            .await?;
        for region_id in region_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO agency_regions (agency_id, region_id) VALUES ($1, $2)",
            )
            .bind(agency_id)
            .bind(region_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }
}
