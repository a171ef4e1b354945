use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteExecutor, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

/// Lifecycle of an ownership claim. `Approved` and `Rejected` are terminal.
#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "claim_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ClaimStatus {
    #[default]
    Pending,
    UnderReview,
    Approved,
    Rejected,
}

impl ClaimStatus {
    /// Open claims block another claim by the same user on the same agency.
    pub fn is_active(self) -> bool {
        matches!(self, ClaimStatus::Pending | ClaimStatus::UnderReview)
    }

    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (UnderReview, Approved)
                | (UnderReview, Rejected)
        )
    }
}

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display,
)]
#[sqlx(type_name = "verification_method", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VerificationMethod {
    Email,
    Phone,
    Document,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ClaimRequest {
    pub id: Uuid,
    pub agency_id: Uuid,
    pub user_id: Uuid,
    pub status: ClaimStatus,
    pub business_email: String,
    pub phone_number: String,
    pub position_title: String,
    pub verification_method: VerificationMethod,
    pub additional_notes: Option<String>,
    pub email_domain_verified: bool,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Claim joined with the agency it targets, for admin queues and "my
/// claims" views.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct ClaimRequestWithAgency {
    #[sqlx(flatten)]
    #[serde(flatten)]
    #[ts(flatten)]
    pub claim: ClaimRequest,
    pub agency_name: String,
    pub agency_slug: String,
}

#[derive(Debug, Clone)]
pub struct NewClaimRequest {
    pub agency_id: Uuid,
    pub user_id: Uuid,
    pub business_email: String,
    pub phone_number: String,
    pub position_title: String,
    pub verification_method: VerificationMethod,
    pub additional_notes: Option<String>,
    pub email_domain_verified: bool,
}

const CLAIM_COLUMNS: &str = r#"c.id, c.agency_id, c.user_id, c.status, c.business_email,
    c.phone_number, c.position_title, c.verification_method, c.additional_notes,
    c.email_domain_verified, c.rejection_reason, c.reviewed_by, c.reviewed_at,
    c.created_at, c.updated_at"#;

impl ClaimRequest {
    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        data: &NewClaimRequest,
    ) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ClaimRequest>(
            r#"INSERT INTO agency_claim_requests (id, agency_id, user_id, status, business_email,
                   phone_number, position_title, verification_method, additional_notes,
                   email_domain_verified)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
               RETURNING id, agency_id, user_id, status, business_email, phone_number,
                   position_title, verification_method, additional_notes, email_domain_verified,
                   rejection_reason, reviewed_by, reviewed_at, created_at, updated_at"#,
        )
        .bind(id)
        .bind(data.agency_id)
        .bind(data.user_id)
        .bind(ClaimStatus::Pending)
        .bind(&data.business_email)
        .bind(&data.phone_number)
        .bind(&data.position_title)
        .bind(data.verification_method)
        .bind(&data.additional_notes)
        .bind(data.email_domain_verified)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ClaimRequest>(&format!(
            "SELECT {CLAIM_COLUMNS} FROM agency_claim_requests c WHERE c.id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// The user's open claim on the agency, if any.
    pub async fn find_active<'e, E>(
        executor: E,
        agency_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ClaimRequest>(&format!(
            r#"SELECT {CLAIM_COLUMNS} FROM agency_claim_requests c
               WHERE c.agency_id = $1 AND c.user_id = $2
                 AND c.status IN ('pending', 'under_review')
               LIMIT 1"#
        ))
        .bind(agency_id)
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_user<'e, E>(
        executor: E,
        user_id: Uuid,
    ) -> Result<Vec<ClaimRequestWithAgency>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ClaimRequestWithAgency>(&format!(
            r#"SELECT {CLAIM_COLUMNS}, a.name AS agency_name, a.slug AS agency_slug
               FROM agency_claim_requests c
               JOIN agencies a ON a.id = c.agency_id
               WHERE c.user_id = $1
               ORDER BY c.created_at DESC"#
        ))
        .bind(user_id)
        .fetch_all(executor)
        .await
    }

    pub async fn list<'e, E>(
        executor: E,
        status: Option<ClaimStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ClaimRequestWithAgency>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            r#"SELECT {CLAIM_COLUMNS}, a.name AS agency_name, a.slug AS agency_slug
               FROM agency_claim_requests c
               JOIN agencies a ON a.id = c.agency_id"#
        ));
        if let Some(status) = status {
            qb.push(" WHERE c.status = ").push_bind(status);
        }
        qb.push(" ORDER BY c.created_at ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        qb.build_query_as::<ClaimRequestWithAgency>()
            .fetch_all(executor)
            .await
    }

    pub async fn count<'e, E>(executor: E, status: Option<ClaimStatus>) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM agency_claim_requests c");
        if let Some(status) = status {
            qb.push(" WHERE c.status = ").push_bind(status);
        }
        qb.build_query_scalar::<i64>().fetch_one(executor).await
    }

    /// Moves the claim from `from` to `to`. Returns `None` when the claim is
    /// missing or no longer in `from`, so concurrent reviewers cannot both
    /// win.
    pub async fn transition<'e, E>(
        executor: E,
        id: Uuid,
        from: ClaimStatus,
        to: ClaimStatus,
        reviewer_id: Uuid,
        rejection_reason: Option<&str>,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, ClaimRequest>(
            r#"UPDATE agency_claim_requests
               SET status = $3,
                   reviewed_by = $4,
                   reviewed_at = datetime('now', 'subsec'),
                   rejection_reason = COALESCE($5, rejection_reason),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND status = $2
               RETURNING id, agency_id, user_id, status, business_email, phone_number,
                   position_title, verification_method, additional_notes, email_domain_verified,
                   rejection_reason, reviewed_by, reviewed_at, created_at, updated_at"#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(reviewer_id)
        .bind(rejection_reason)
        .fetch_optional(executor)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        DBService,
        models::{
            agency::{Agency, AgencyFields},
            profile::Profile,
        },
    };

    #[test]
    fn transitions_follow_the_review_flow() {
        use ClaimStatus::*;
        assert!(Pending.can_transition_to(UnderReview));
        assert!(UnderReview.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(!UnderReview.can_transition_to(Pending));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(Approved));
    }

    async fn seed(db: &DBService) -> (Agency, Profile) {
        let agency = Agency::create(
            &db.pool,
            Uuid::new_v4(),
            &AgencyFields {
                name: "Keystone Trades".into(),
                slug: "keystone-trades".into(),
                description: None,
                logo_url: None,
                website: Some("https://keystone.example.com/".into()),
                phone: None,
                email: None,
                headquarters: None,
                founded_year: None,
                employee_count: None,
                company_size: None,
                is_active: true,
                is_union: false,
                offers_per_diem: false,
                is_verified: false,
                verified_at: None,
                profile_completion_percentage: 0,
            },
        )
        .await
        .unwrap();
        let user = Profile::find_or_create(&db.pool, Uuid::new_v4(), "sam@keystone.example.com")
            .await
            .unwrap();
        (agency, user)
    }

    fn new_claim(agency: &Agency, user: &Profile) -> NewClaimRequest {
        NewClaimRequest {
            agency_id: agency.id,
            user_id: user.id,
            business_email: user.email.clone(),
            phone_number: "555-010-2000".into(),
            position_title: "Owner".into(),
            verification_method: VerificationMethod::Email,
            additional_notes: None,
            email_domain_verified: true,
        }
    }

    #[tokio::test]
    async fn database_rejects_second_open_claim() {
        let db = DBService::new_in_memory().await.unwrap();
        let (agency, user) = seed(&db).await;

        ClaimRequest::create(&db.pool, Uuid::new_v4(), &new_claim(&agency, &user))
            .await
            .unwrap();
        let err = ClaimRequest::create(&db.pool, Uuid::new_v4(), &new_claim(&agency, &user))
            .await
            .unwrap_err();
        assert!(crate::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn rejected_claim_frees_the_slot() {
        let db = DBService::new_in_memory().await.unwrap();
        let (agency, user) = seed(&db).await;
        let admin = Profile::find_or_create(&db.pool, Uuid::new_v4(), "admin@example.com")
            .await
            .unwrap();

        let first = ClaimRequest::create(&db.pool, Uuid::new_v4(), &new_claim(&agency, &user))
            .await
            .unwrap();
        let rejected = ClaimRequest::transition(
            &db.pool,
            first.id,
            ClaimStatus::Pending,
            ClaimStatus::Rejected,
            admin.id,
            Some("Could not verify employment"),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(rejected.status, ClaimStatus::Rejected);
        assert_eq!(rejected.reviewed_by, Some(admin.id));

        assert!(
            ClaimRequest::find_active(&db.pool, agency.id, user.id)
                .await
                .unwrap()
                .is_none()
        );
        ClaimRequest::create(&db.pool, Uuid::new_v4(), &new_claim(&agency, &user))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stale_transition_is_a_no_op() {
        let db = DBService::new_in_memory().await.unwrap();
        let (agency, user) = seed(&db).await;
        let claim = ClaimRequest::create(&db.pool, Uuid::new_v4(), &new_claim(&agency, &user))
            .await
            .unwrap();

        let moved = ClaimRequest::transition(
            &db.pool,
            claim.id,
            ClaimStatus::UnderReview,
            ClaimStatus::Approved,
            user.id,
            None,
        )
        .await
        .unwrap();
        assert!(moved.is_none());

        let listed = ClaimRequest::list(&db.pool, Some(ClaimStatus::Pending), 10, 0)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].agency_slug, "keystone-trades");
    }
}
