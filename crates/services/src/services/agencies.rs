//! Directory listings: search, create and edit agencies.

use std::{collections::HashSet, str::FromStr};

use chrono::Utc;
use db::{
    is_unique_violation,
    models::{
        agency::{Agency, AgencyFields, AgencyFilter, AgencySort, AgencyWithRelations},
        profile::Profile,
        region::Region,
        trade::Trade,
    },
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;
use tracing::{debug, info};
use ts_rs::TS;
use utils::{
    slug::{slugify, unique_slug},
    validation::FieldErrors,
};
use uuid::Uuid;

use super::{
    agency_validation::{
        DESCRIPTION_MAX, EMPLOYEE_COUNT_MAX, HEADQUARTERS_MAX, profile_completion,
        validate_company_size, validate_email, validate_founded_year, validate_name,
        validate_phone, validate_text, validate_url,
    },
    audit::diff,
    auth::can_edit_agency,
};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
const FALLBACK_SLUG: &str = "agency";

#[derive(Debug, Error)]
pub enum AgencyError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("agency not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for AgencyError {
    fn from(e: sqlx::Error) -> Self {
        if is_unique_violation(&e) {
            AgencyError::Conflict("an agency with this name already exists".to_string())
        } else {
            AgencyError::Database(e)
        }
    }
}

/// Query string of the directory search. Array filters may be repeated
/// (`trades=a&trades=b`) or comma-separated.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct AgencySearchParams {
    pub search: Option<String>,
    #[serde(default)]
    pub trades: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub states: Vec<String>,
    pub is_union: Option<bool>,
    pub offers_per_diem: Option<bool>,
    pub is_claimed: Option<bool>,
    pub is_verified: Option<bool>,
    pub company_size: Option<String>,
    pub sort: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct AgencySearchResponse {
    pub agencies: Vec<AgencyWithRelations>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct CreateAgency {
    pub name: String,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub employee_count: Option<String>,
    pub company_size: Option<String>,
    #[serde(default)]
    pub is_union: bool,
    #[serde(default)]
    pub offers_per_diem: bool,
    #[serde(default)]
    pub is_verified: bool,
    pub is_active: Option<bool>,
    #[serde(default)]
    pub trades: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

/// Partial update. Absent fields are left alone; an empty string clears an
/// optional text field.
#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UpdateAgency {
    pub name: Option<String>,
    pub description: Option<String>,
    pub logo_url: Option<String>,
    pub website: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub headquarters: Option<String>,
    pub founded_year: Option<i32>,
    pub employee_count: Option<String>,
    pub company_size: Option<String>,
    pub is_union: Option<bool>,
    pub offers_per_diem: Option<bool>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
    pub is_claimed: Option<bool>,
    pub trades: Option<Vec<String>>,
    pub regions: Option<Vec<String>>,
}

impl UpdateAgency {
    fn touches_admin_fields(&self) -> bool {
        self.is_active.is_some() || self.is_verified.is_some() || self.is_claimed.is_some()
    }
}

/// Result of an edit, keeping the prior state for the audit diff.
#[derive(Debug, Clone)]
pub struct AgencyUpdate {
    pub before: AgencyWithRelations,
    pub after: AgencyWithRelations,
}

impl AgencyUpdate {
    pub fn changes(&self) -> Value {
        diff(&Snapshot::of(&self.before), &Snapshot::of(&self.after))
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    #[serde(flatten)]
    agency: &'a Agency,
    trades: Vec<&'a str>,
    regions: Vec<&'a str>,
}

impl<'a> Snapshot<'a> {
    fn of(agency: &'a AgencyWithRelations) -> Self {
        Self {
            agency: &agency.agency,
            trades: agency.trades.iter().map(|t| t.slug.as_str()).collect(),
            regions: agency.regions.iter().map(|r| r.slug.as_str()).collect(),
        }
    }
}

pub struct AgencyService;

impl AgencyService {
    /// Validates search parameters. `include_inactive` is honoured only when
    /// `allow_inactive` is set (admin listings).
    pub fn filter_from_params(
        params: &AgencySearchParams,
        allow_inactive: bool,
    ) -> Result<AgencyFilter, FieldErrors> {
        let mut errors = FieldErrors::new();

        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            errors.add("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }
        let offset = params.offset.unwrap_or(0);
        if offset < 0 {
            errors.add("offset", "must not be negative");
        }

        let sort = match params.sort.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => AgencySort::from_str(&raw.to_ascii_lowercase()).unwrap_or_else(|_| {
                errors.add("sort", "must be one of name, newest, completion");
                AgencySort::default()
            }),
            None => AgencySort::default(),
        };
        let company_size = validate_company_size(params.company_size.as_deref(), &mut errors);

        errors.into_result()?;

        Ok(AgencyFilter {
            search: params
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            trade_slugs: split_list(&params.trades).map(|v| slugify(&v)).collect(),
            region_slugs: split_list(&params.regions).map(|v| slugify(&v)).collect(),
            state_codes: split_list(&params.states)
                .map(|v| v.to_ascii_uppercase())
                .collect(),
            is_union: params.is_union,
            offers_per_diem: params.offers_per_diem,
            is_claimed: params.is_claimed,
            is_verified: params.is_verified,
            company_size,
            include_inactive: allow_inactive && params.include_inactive,
            sort,
            limit,
            offset,
        })
    }

    pub async fn search(
        pool: &SqlitePool,
        filter: &AgencyFilter,
    ) -> Result<AgencySearchResponse, AgencyError> {
        let mut conn = pool.acquire().await?;
        let agencies = Agency::search(&mut *conn, filter).await?;
        let total = Agency::count(&mut *conn, filter).await?;
        let agencies = load_relations(&mut conn, agencies).await?;
        let has_more = filter.offset + (agencies.len() as i64) < total;
        debug!(total, returned = agencies.len(), "agency search");
        Ok(AgencySearchResponse {
            agencies,
            total,
            limit: filter.limit,
            offset: filter.offset,
            has_more,
        })
    }

    /// Public profile lookup; inactive listings are hidden.
    pub async fn get_active_by_slug(
        pool: &SqlitePool,
        slug: &str,
    ) -> Result<AgencyWithRelations, AgencyError> {
        let mut conn = pool.acquire().await?;
        let agency = Agency::find_by_slug(&mut *conn, slug)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AgencyError::NotFound)?;
        load_one(&mut conn, agency).await
    }

    pub async fn get_by_id(pool: &SqlitePool, id: Uuid) -> Result<AgencyWithRelations, AgencyError> {
        let mut conn = pool.acquire().await?;
        let agency = Agency::find_by_id(&mut *conn, id)
            .await?
            .ok_or(AgencyError::NotFound)?;
        load_one(&mut conn, agency).await
    }

    pub async fn create(
        pool: &SqlitePool,
        input: &CreateAgency,
    ) -> Result<AgencyWithRelations, AgencyError> {
        let mut errors = FieldErrors::new();
        let mut fields = AgencyFields {
            name: validate_name(&input.name, &mut errors),
            slug: String::new(),
            description: validate_text(
                "description",
                input.description.as_deref(),
                DESCRIPTION_MAX,
                &mut errors,
            ),
            logo_url: validate_url("logo_url", input.logo_url.as_deref(), &mut errors),
            website: validate_url("website", input.website.as_deref(), &mut errors),
            phone: validate_phone("phone", input.phone.as_deref(), &mut errors),
            email: validate_email("email", input.email.as_deref(), &mut errors),
            headquarters: validate_text(
                "headquarters",
                input.headquarters.as_deref(),
                HEADQUARTERS_MAX,
                &mut errors,
            ),
            founded_year: validate_founded_year(input.founded_year, &mut errors),
            employee_count: validate_text(
                "employee_count",
                input.employee_count.as_deref(),
                EMPLOYEE_COUNT_MAX,
                &mut errors,
            ),
            company_size: validate_company_size(input.company_size.as_deref(), &mut errors),
            is_active: input.is_active.unwrap_or(true),
            is_union: input.is_union,
            offers_per_diem: input.offers_per_diem,
            is_verified: input.is_verified,
            verified_at: input.is_verified.then(Utc::now),
            profile_completion_percentage: 0,
        };

        let mut tx = pool.begin().await?;
        let trades = Trade::resolve(&mut *tx, &input.trades).await?;
        let regions = Region::resolve(&mut *tx, &input.regions).await?;
        report_unknown("trades", "trade", &trades.unknown, &mut errors);
        report_unknown("regions", "region", &regions.unknown, &mut errors);
        errors.into_result().map_err(AgencyError::Validation)?;

        if Agency::name_taken(&mut *tx, &fields.name, None).await? {
            return Err(AgencyError::Conflict(format!(
                "an agency named \"{}\" already exists",
                fields.name
            )));
        }
        fields.slug = available_slug(&mut tx, &fields.name, None).await?;
        fields.profile_completion_percentage =
            profile_completion(&fields, trades.matched.len(), regions.matched.len());

        let agency = Agency::create(&mut *tx, Uuid::new_v4(), &fields).await?;
        let trade_ids: Vec<Uuid> = trades.matched.iter().map(|t| t.id).collect();
        let region_ids: Vec<Uuid> = regions.matched.iter().map(|r| r.id).collect();
        Trade::replace_for_agency(&mut tx, agency.id, &trade_ids).await?;
        Region::replace_for_agency(&mut tx, agency.id, &region_ids).await?;
        tx.commit().await?;

        info!(agency_id = %agency.id, slug = %agency.slug, "agency created");
        Ok(AgencyWithRelations {
            agency,
            trades: trades.matched,
            regions: regions.matched,
        })
    }

    /// Applies `patch` on behalf of `editor`. Admins may change anything;
    /// an owner may change descriptive fields of the agency they claimed.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        patch: &UpdateAgency,
        editor: &Profile,
    ) -> Result<AgencyUpdate, AgencyError> {
        let mut tx = pool.begin().await?;
        let current = Agency::find_by_id(&mut *tx, id)
            .await?
            .ok_or(AgencyError::NotFound)?;

        if !can_edit_agency(editor, current.claimed_by) {
            return Err(AgencyError::Forbidden(
                "you can only edit the agency you manage",
            ));
        }
        if !editor.role.is_admin() && patch.touches_admin_fields() {
            return Err(AgencyError::Forbidden(
                "only admins can change verification, listing or claim status",
            ));
        }

        let before = load_one(&mut tx, current).await?;
        let mut errors = FieldErrors::new();
        let mut fields = before.agency.fields();

        if let Some(name) = &patch.name {
            fields.name = validate_name(name, &mut errors);
        }
        if let Some(value) = &patch.description {
            fields.description =
                validate_text("description", Some(value), DESCRIPTION_MAX, &mut errors);
        }
        if let Some(value) = &patch.logo_url {
            fields.logo_url = validate_url("logo_url", Some(value), &mut errors);
        }
        if let Some(value) = &patch.website {
            fields.website = validate_url("website", Some(value), &mut errors);
        }
        if let Some(value) = &patch.phone {
            fields.phone = validate_phone("phone", Some(value), &mut errors);
        }
        if let Some(value) = &patch.email {
            fields.email = validate_email("email", Some(value), &mut errors);
        }
        if let Some(value) = &patch.headquarters {
            fields.headquarters =
                validate_text("headquarters", Some(value), HEADQUARTERS_MAX, &mut errors);
        }
        if let Some(year) = patch.founded_year {
            fields.founded_year = validate_founded_year(Some(year), &mut errors);
        }
        if let Some(value) = &patch.employee_count {
            fields.employee_count =
                validate_text("employee_count", Some(value), EMPLOYEE_COUNT_MAX, &mut errors);
        }
        if let Some(value) = &patch.company_size {
            fields.company_size = validate_company_size(Some(value), &mut errors);
        }
        if let Some(value) = patch.is_union {
            fields.is_union = value;
        }
        if let Some(value) = patch.offers_per_diem {
            fields.offers_per_diem = value;
        }
        if let Some(value) = patch.is_active {
            fields.is_active = value;
        }
        if let Some(verified) = patch.is_verified {
            if verified && !before.is_verified {
                fields.verified_at = Some(Utc::now());
            } else if !verified {
                fields.verified_at = None;
            }
            fields.is_verified = verified;
        }

        let release_claim = match patch.is_claimed {
            Some(false) => before.is_claimed,
            Some(true) if !before.is_claimed => {
                errors.add(
                    "is_claimed",
                    "ownership is granted by approving a claim request",
                );
                false
            }
            _ => false,
        };

        let trades = match &patch.trades {
            Some(inputs) => {
                let resolved = Trade::resolve(&mut *tx, inputs).await?;
                report_unknown("trades", "trade", &resolved.unknown, &mut errors);
                Some(resolved.matched)
            }
            None => None,
        };
        let regions = match &patch.regions {
            Some(inputs) => {
                let resolved = Region::resolve(&mut *tx, inputs).await?;
                report_unknown("regions", "region", &resolved.unknown, &mut errors);
                Some(resolved.matched)
            }
            None => None,
        };
        errors.into_result().map_err(AgencyError::Validation)?;

        if fields.name != before.name {
            if Agency::name_taken(&mut *tx, &fields.name, Some(id)).await? {
                return Err(AgencyError::Conflict(format!(
                    "an agency named \"{}\" already exists",
                    fields.name
                )));
            }
            fields.slug = available_slug(&mut tx, &fields.name, Some(&before.slug)).await?;
        }

        fields.profile_completion_percentage = profile_completion(
            &fields,
            trades.as_ref().map_or(before.trades.len(), Vec::len),
            regions.as_ref().map_or(before.regions.len(), Vec::len),
        );

        Agency::update(&mut *tx, id, &fields)
            .await?
            .ok_or(AgencyError::NotFound)?;
        if let Some(trades) = &trades {
            let ids: Vec<Uuid> = trades.iter().map(|t| t.id).collect();
            Trade::replace_for_agency(&mut tx, id, &ids).await?;
        }
        if let Some(regions) = &regions {
            let ids: Vec<Uuid> = regions.iter().map(|r| r.id).collect();
            Region::replace_for_agency(&mut tx, id, &ids).await?;
        }
        if release_claim {
            Agency::release_claim(&mut *tx, id).await?;
        }

        let updated = Agency::find_by_id(&mut *tx, id)
            .await?
            .ok_or(AgencyError::NotFound)?;
        let after = load_one(&mut tx, updated).await?;
        tx.commit().await?;

        info!(agency_id = %id, editor_id = %editor.id, "agency updated");
        Ok(AgencyUpdate { before, after })
    }
}

/// Attaches trades and regions to each agency.
pub async fn load_relations(
    conn: &mut SqliteConnection,
    agencies: Vec<Agency>,
) -> Result<Vec<AgencyWithRelations>, sqlx::Error> {
    let ids: Vec<Uuid> = agencies.iter().map(|a| a.id).collect();
    let mut trades = Trade::find_for_agencies(&mut *conn, &ids).await?;
    let mut regions = Region::find_for_agencies(&mut *conn, &ids).await?;
    Ok(agencies
        .into_iter()
        .map(|agency| AgencyWithRelations {
            trades: trades.remove(&agency.id).unwrap_or_default(),
            regions: regions.remove(&agency.id).unwrap_or_default(),
            agency,
        })
        .collect())
}

async fn load_one(
    conn: &mut SqliteConnection,
    agency: Agency,
) -> Result<AgencyWithRelations, AgencyError> {
    load_relations(conn, vec![agency])
        .await?
        .pop()
        .ok_or(AgencyError::NotFound)
}

/// Free slug for `name`. `current` is the agency's own slug when renaming,
/// which never counts as a collision.
pub(crate) async fn available_slug(
    conn: &mut SqliteConnection,
    name: &str,
    current: Option<&str>,
) -> Result<String, sqlx::Error> {
    let mut base = slugify(name);
    if base.is_empty() {
        base = FALLBACK_SLUG.to_string();
    }
    if current == Some(base.as_str()) {
        return Ok(base);
    }
    let taken: HashSet<String> = Agency::slugs_with_prefix(&mut *conn, &base)
        .await?
        .into_iter()
        .filter(|s| Some(s.as_str()) != current)
        .collect();
    Ok(unique_slug(&base, |candidate| taken.contains(candidate)))
}

fn report_unknown(field: &str, kind: &str, unknown: &[String], errors: &mut FieldErrors) {
    for value in unknown {
        errors.add(field, format!("unknown {kind}: {value}"));
    }
}

fn split_list(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use db::{
        DBService,
        models::{
            agency::CompanySize,
            profile::{Profile, UserRole},
        },
    };

    use super::*;

    async fn admin(pool: &SqlitePool) -> Profile {
        Profile::create(pool, Uuid::new_v4(), "admin@directory.test", None, UserRole::Admin)
            .await
            .unwrap()
    }

    fn input(name: &str) -> CreateAgency {
        CreateAgency {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn params() -> AgencySearchParams {
        AgencySearchParams::default()
    }

    #[tokio::test]
    async fn created_agency_is_retrievable_by_generated_slug() {
        let db = DBService::new_in_memory().await.unwrap();
        let created = AgencyService::create(
            &db.pool,
            &CreateAgency {
                website: Some("acmelabor.com".into()),
                company_size: Some("Medium".into()),
                trades: vec!["Electrical".into(), "plumbing".into()],
                regions: vec!["houston".into()],
                ..input("Acme Labor & Staffing")
            },
        )
        .await
        .unwrap();

        assert_eq!(created.slug, "acme-labor-staffing");
        assert_eq!(created.website.as_deref(), Some("https://acmelabor.com/"));
        assert_eq!(created.company_size, Some(CompanySize::Medium));
        // name, website, company_size, trades, regions
        assert_eq!(created.profile_completion_percentage, 41);

        let fetched = AgencyService::get_active_by_slug(&db.pool, &created.slug)
            .await
            .unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.trades.len(), 2);
        assert_eq!(fetched.regions[0].slug, "houston");
    }

    #[tokio::test]
    async fn slug_collisions_get_numeric_suffixes() {
        let db = DBService::new_in_memory().await.unwrap();
        let first = AgencyService::create(&db.pool, &input("Pro Crew")).await.unwrap();
        let second = AgencyService::create(&db.pool, &input("Pro-Crew!")).await.unwrap();
        let third = AgencyService::create(&db.pool, &input("Pro  Crew.")).await;

        assert_eq!(first.slug, "pro-crew");
        assert_eq!(second.slug, "pro-crew-2");
        // "Pro  Crew." collapses to "Pro Crew." which is a different name.
        assert_eq!(third.unwrap().slug, "pro-crew-3");
    }

    #[tokio::test]
    async fn duplicate_names_conflict() {
        let db = DBService::new_in_memory().await.unwrap();
        AgencyService::create(&db.pool, &input("Lone Star Labor")).await.unwrap();
        let err = AgencyService::create(&db.pool, &input("lone star labor"))
            .await
            .unwrap_err();
        assert!(matches!(err, AgencyError::Conflict(_)));
    }

    #[tokio::test]
    async fn invalid_fields_are_reported_together() {
        let db = DBService::new_in_memory().await.unwrap();
        let err = AgencyService::create(
            &db.pool,
            &CreateAgency {
                phone: Some("555".into()),
                founded_year: Some(1700),
                trades: vec!["Basket Weaving".into()],
                ..input("X")
            },
        )
        .await
        .unwrap_err();

        let AgencyError::Validation(errors) = err else {
            panic!("expected validation error, got {err:?}");
        };
        for field in ["name", "phone", "founded_year", "trades"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
    }

    #[tokio::test]
    async fn unknown_trade_filter_returns_nothing() {
        let db = DBService::new_in_memory().await.unwrap();
        AgencyService::create(
            &db.pool,
            &CreateAgency {
                trades: vec!["welding".into()],
                ..input("Arc Masters")
            },
        )
        .await
        .unwrap();

        let filter = AgencyService::filter_from_params(
            &AgencySearchParams {
                trades: vec!["basket-weaving".into()],
                ..params()
            },
            false,
        )
        .unwrap();
        let page = AgencyService::search(&db.pool, &filter).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(page.agencies.is_empty());
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn trade_filters_match_any_and_paginate() {
        let db = DBService::new_in_memory().await.unwrap();
        for (name, trade) in [
            ("Bright Wire", "electrical"),
            ("Clear Pipes", "plumbing"),
            ("Dry Walls Inc", "drywall"),
        ] {
            AgencyService::create(
                &db.pool,
                &CreateAgency {
                    trades: vec![trade.into()],
                    ..input(name)
                },
            )
            .await
            .unwrap();
        }

        let filter = AgencyService::filter_from_params(
            &AgencySearchParams {
                trades: vec!["electrical,plumbing".into()],
                limit: Some(1),
                ..params()
            },
            false,
        )
        .unwrap();
        let page = AgencyService::search(&db.pool, &filter).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.agencies.len(), 1);
        assert_eq!(page.agencies[0].name, "Bright Wire");
        assert!(page.has_more);
    }

    #[test]
    fn search_params_are_validated() {
        let errors = AgencyService::filter_from_params(
            &AgencySearchParams {
                limit: Some(500),
                offset: Some(-1),
                sort: Some("popularity".into()),
                company_size: Some("huge".into()),
                ..params()
            },
            false,
        )
        .unwrap_err();
        for field in ["limit", "offset", "sort", "company_size"] {
            assert!(errors.contains(field), "missing error for {field}");
        }

        let filter = AgencyService::filter_from_params(
            &AgencySearchParams {
                include_inactive: true,
                states: vec!["tx".into()],
                sort: Some("Newest".into()),
                ..params()
            },
            false,
        )
        .unwrap();
        assert!(!filter.include_inactive);
        assert_eq!(filter.state_codes, vec!["TX".to_string()]);
        assert_eq!(filter.sort, AgencySort::Newest);
        assert_eq!(filter.limit, DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn admin_update_stamps_verification_and_reslugs() {
        let db = DBService::new_in_memory().await.unwrap();
        let admin = admin(&db.pool).await;
        let created = AgencyService::create(&db.pool, &input("Old Name Staffing")).await.unwrap();

        let update = AgencyService::update(
            &db.pool,
            created.id,
            &UpdateAgency {
                name: Some("New Name Staffing".into()),
                is_verified: Some(true),
                description: Some("Commercial crews".into()),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();

        assert_eq!(update.after.slug, "new-name-staffing");
        assert!(update.after.is_verified);
        assert!(update.after.verified_at.is_some());
        let changes = update.changes();
        assert_eq!(changes["name"]["old"], "Old Name Staffing");
        assert_eq!(changes["slug"]["new"], "new-name-staffing");
        assert!(changes.get("updated_at").is_none());

        let unverified = AgencyService::update(
            &db.pool,
            created.id,
            &UpdateAgency {
                is_verified: Some(false),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
        assert!(unverified.after.verified_at.is_none());
    }

    #[tokio::test]
    async fn owners_cannot_touch_admin_flags_or_other_agencies() {
        let db = DBService::new_in_memory().await.unwrap();
        let owner = Profile::create(
            &db.pool,
            Uuid::new_v4(),
            "owner@acme.com",
            None,
            UserRole::AgencyOwner,
        )
        .await
        .unwrap();
        let mine = AgencyService::create(&db.pool, &input("Mine Staffing")).await.unwrap();
        let theirs = AgencyService::create(&db.pool, &input("Theirs Staffing")).await.unwrap();
        Agency::mark_claimed(&db.pool, mine.id, owner.id).await.unwrap();

        let edited = AgencyService::update(
            &db.pool,
            mine.id,
            &UpdateAgency {
                phone: Some("(555) 123-4567".into()),
                ..Default::default()
            },
            &owner,
        )
        .await
        .unwrap();
        assert_eq!(edited.after.phone.as_deref(), Some("(555) 123-4567"));

        let flag = AgencyService::update(
            &db.pool,
            mine.id,
            &UpdateAgency {
                is_verified: Some(true),
                ..Default::default()
            },
            &owner,
        )
        .await;
        assert!(matches!(flag, Err(AgencyError::Forbidden(_))));

        let other = AgencyService::update(&db.pool, theirs.id, &UpdateAgency::default(), &owner).await;
        assert!(matches!(other, Err(AgencyError::Forbidden(_))));
    }

    #[tokio::test]
    async fn admin_can_release_a_claim() {
        let db = DBService::new_in_memory().await.unwrap();
        let admin = admin(&db.pool).await;
        let agency = AgencyService::create(&db.pool, &input("Claimed Co")).await.unwrap();
        Agency::mark_claimed(&db.pool, agency.id, admin.id).await.unwrap();

        let update = AgencyService::update(
            &db.pool,
            agency.id,
            &UpdateAgency {
                is_claimed: Some(false),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
        assert!(update.before.is_claimed);
        assert!(!update.after.is_claimed);
        assert!(update.after.claimed_by.is_none());
    }

    #[tokio::test]
    async fn missing_agency_is_not_found() {
        let db = DBService::new_in_memory().await.unwrap();
        let admin = admin(&db.pool).await;
        let err = AgencyService::update(&db.pool, Uuid::new_v4(), &UpdateAgency::default(), &admin)
            .await
            .unwrap_err();
        assert!(matches!(err, AgencyError::NotFound));
    }
}
