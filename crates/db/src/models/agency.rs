use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteExecutor, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

use super::{region::Region, trade::Trade};

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "company_size", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CompanySize {
    Small,
    Medium,
    Large,
    Enterprise,
}

/// Listing order for directory searches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS, Default, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgencySort {
    #[default]
    Name,
    Newest,
    Completion,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS, PartialEq)]
pub struct Agency {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub employee_count: Option<String>,
    pub company_size: Option<CompanySize>,
    pub is_claimed: bool,
    pub is_active: bool,
    pub is_union: bool,
    pub offers_per_diem: bool,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<Uuid>, // Profile that owns the listing after an approved claim
    pub claimed_at: Option<DateTime<Utc>>,
    pub profile_completion_percentage: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Writable columns of an agency row, already validated and normalised.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyFields {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub employee_count: Option<String>,
    pub company_size: Option<CompanySize>,
    pub is_active: bool,
    pub is_union: bool,
    pub offers_per_diem: bool,
    pub is_verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub profile_completion_percentage: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct AgencyWithRelations {
    #[serde(flatten)]
    #[ts(flatten)]
    pub agency: Agency,
    pub trades: Vec<Trade>,
    pub regions: Vec<Region>,
}

impl std::ops::Deref for AgencyWithRelations {
    type Target = Agency;
    fn deref(&self) -> &Self::Target {
        &self.agency
    }
}

/// Search criteria. Trade and region values are slugs; a value matching
/// nothing simply contributes no agencies.
#[derive(Debug, Clone, Default)]
pub struct AgencyFilter {
    pub search: Option<String>,
    pub trade_slugs: Vec<String>,
    pub region_slugs: Vec<String>,
    pub state_codes: Vec<String>,
    pub is_union: Option<bool>,
    pub offers_per_diem: Option<bool>,
    pub is_claimed: Option<bool>,
    pub is_verified: Option<bool>,
    pub company_size: Option<CompanySize>,
    pub include_inactive: bool,
    pub sort: AgencySort,
    pub limit: i64,
    pub offset: i64,
}

const AGENCY_COLUMNS: &str = r#"id, name, slug, description, logo_url, website, phone, email,
    headquarters, founded_year, employee_count, company_size, is_claimed, is_active,
    is_union, offers_per_diem, is_verified, verified_at, claimed_by, claimed_at,
    profile_completion_percentage, created_at, updated_at"#;

impl Agency {
    pub fn fields(&self) -> AgencyFields {
        AgencyFields {
            name: self.name.clone(),
            slug: self.slug.clone(),
            description: self.description.clone(),
            logo_url: self.logo_url.clone(),
            website: self.website.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
            headquarters: self.headquarters.clone(),
            founded_year: self.founded_year,
            employee_count: self.employee_count.clone(),
            company_size: self.company_size,
            is_active: self.is_active,
            is_union: self.is_union,
            offers_per_diem: self.offers_per_diem,
            is_verified: self.is_verified,
            verified_at: self.verified_at,
            profile_completion_percentage: self.profile_completion_percentage,
        }
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Agency>(&format!(
            "SELECT {AGENCY_COLUMNS} FROM agencies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_slug<'e, E>(executor: E, slug: &str) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Agency>(&format!(
            "SELECT {AGENCY_COLUMNS} FROM agencies WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(executor)
        .await
    }

    /// Case-insensitive name lookup, optionally ignoring one agency (the one
    /// being renamed).
    pub async fn name_taken<'e, E>(
        executor: E,
        name: &str,
        exclude_id: Option<Uuid>,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM agencies
               WHERE lower(name) = lower($1) AND ($2 IS NULL OR id != $2)"#,
        )
        .bind(name.trim())
        .bind(exclude_id)
        .fetch_one(executor)
        .await?;
        Ok(count > 0)
    }

    /// Lower-cased names of every agency, for bulk duplicate detection.
    pub async fn all_names_lower<'e, E>(executor: E) -> Result<Vec<String>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar::<_, String>("SELECT lower(name) FROM agencies")
            .fetch_all(executor)
            .await
    }

    /// Slugs equal to `base` or of the form `base-…`.
    pub async fn slugs_with_prefix<'e, E>(
        executor: E,
        base: &str,
    ) -> Result<Vec<String>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_scalar::<_, String>(
            r#"SELECT slug FROM agencies WHERE slug = $1 OR slug LIKE $2 ESCAPE '\'"#,
        )
        .bind(base)
        .bind(format!("{}-%", escape_like(base)))
        .fetch_all(executor)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        data: &AgencyFields,
    ) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Agency>(&format!(
            r#"INSERT INTO agencies (id, name, slug, description, logo_url, website, phone, email,
                   headquarters, founded_year, employee_count, company_size, is_active, is_union,
                   offers_per_diem, is_verified, verified_at, profile_completion_percentage)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
               RETURNING {AGENCY_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&data.slug)
        .bind(&data.description)
        .bind(&data.logo_url)
        .bind(&data.website)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(&data.headquarters)
        .bind(data.founded_year)
        .bind(&data.employee_count)
        .bind(data.company_size)
        .bind(data.is_active)
        .bind(data.is_union)
        .bind(data.offers_per_diem)
        .bind(data.is_verified)
        .bind(data.verified_at)
        .bind(data.profile_completion_percentage)
        .fetch_one(executor)
        .await
    }

    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        data: &AgencyFields,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Agency>(&format!(
            r#"UPDATE agencies
               SET name = $2, slug = $3, description = $4, logo_url = $5, website = $6,
                   phone = $7, email = $8, headquarters = $9, founded_year = $10,
                   employee_count = $11, company_size = $12, is_active = $13, is_union = $14,
                   offers_per_diem = $15, is_verified = $16, verified_at = $17,
                   profile_completion_percentage = $18,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {AGENCY_COLUMNS}"#
        ))
        .bind(id)
        .bind(&data.name)
        .bind(&data.slug)
        .bind(&data.description)
        .bind(&data.logo_url)
        .bind(&data.website)
        .bind(&data.phone)
        .bind(&data.email)
        .bind(&data.headquarters)
        .bind(data.founded_year)
        .bind(&data.employee_count)
        .bind(data.company_size)
        .bind(data.is_active)
        .bind(data.is_union)
        .bind(data.offers_per_diem)
        .bind(data.is_verified)
        .bind(data.verified_at)
        .bind(data.profile_completion_percentage)
        .fetch_optional(executor)
        .await
    }

    /// Records ownership after an approved claim. Returns `false` if the
    /// agency was already claimed.
    pub async fn mark_claimed<'e, E>(
        executor: E,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<bool, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let result = sqlx::query(
            r#"UPDATE agencies
               SET is_claimed = 1,
                   claimed_by = $2,
                   claimed_at = datetime('now', 'subsec'),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND is_claimed = 0"#,
        )
        .bind(id)
        .bind(owner_id)
        .execute(executor)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Clears ownership so the listing can be claimed again.
    pub async fn release_claim<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Agency>(&format!(
            r#"UPDATE agencies
               SET is_claimed = 0,
                   claimed_by = NULL,
                   claimed_at = NULL,
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {AGENCY_COLUMNS}"#
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn search<'e, E>(executor: E, filter: &AgencyFilter) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {AGENCY_COLUMNS} FROM agencies a"));
        push_agency_filters(&mut qb, filter);
        qb.push(match filter.sort {
            AgencySort::Name => " ORDER BY a.name COLLATE NOCASE ASC",
            AgencySort::Newest => " ORDER BY a.created_at DESC, a.name COLLATE NOCASE ASC",
            AgencySort::Completion => {
                " ORDER BY a.profile_completion_percentage DESC, a.name COLLATE NOCASE ASC"
            }
        });
        qb.push(" LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        qb.build_query_as::<Agency>().fetch_all(executor).await
    }

    pub async fn count<'e, E>(executor: E, filter: &AgencyFilter) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM agencies a");
        push_agency_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>().fetch_one(executor).await
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_agency_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &AgencyFilter) {
    qb.push(" WHERE 1 = 1");
    if !filter.include_inactive {
        qb.push(" AND a.is_active = 1");
    }

    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", escape_like(search));
        qb.push(" AND (a.name LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR a.description LIKE ")
            .push_bind(pattern.clone())
            .push(" ESCAPE '\\' OR a.headquarters LIKE ")
            .push_bind(pattern)
            .push(" ESCAPE '\\')");
    }

    if !filter.trade_slugs.is_empty() {
        qb.push(
            r#" AND a.id IN (SELECT at.agency_id FROM agency_trades at
                 JOIN trades t ON t.id = at.trade_id WHERE t.slug IN ("#,
        );
        let mut slugs = qb.separated(", ");
        for slug in &filter.trade_slugs {
            slugs.push_bind(slug.clone());
        }
        qb.push("))");
    }

    if !filter.region_slugs.is_empty() {
        qb.push(
            r#" AND a.id IN (SELECT ar.agency_id FROM agency_regions ar
                 JOIN regions r ON r.id = ar.region_id WHERE r.slug IN ("#,
        );
        let mut slugs = qb.separated(", ");
        for slug in &filter.region_slugs {
            slugs.push_bind(slug.clone());
        }
        qb.push("))");
    }

    if !filter.state_codes.is_empty() {
        qb.push(
            r#" AND a.id IN (SELECT ar.agency_id FROM agency_regions ar
                 JOIN regions r ON r.id = ar.region_id WHERE r.state_code IN ("#,
        );
        let mut codes = qb.separated(", ");
        for code in &filter.state_codes {
            codes.push_bind(code.clone());
        }
        qb.push("))");
    }

    if let Some(is_union) = filter.is_union {
        qb.push(" AND a.is_union = ").push_bind(is_union);
    }
    if let Some(per_diem) = filter.offers_per_diem {
        qb.push(" AND a.offers_per_diem = ").push_bind(per_diem);
    }
    if let Some(claimed) = filter.is_claimed {
        qb.push(" AND a.is_claimed = ").push_bind(claimed);
    }
    if let Some(verified) = filter.is_verified {
        qb.push(" AND a.is_verified = ").push_bind(verified);
    }
    if let Some(size) = filter.company_size {
        qb.push(" AND a.company_size = ").push_bind(size);
    }
}
