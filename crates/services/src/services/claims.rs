//! Ownership claims: submission by users and review by admins.

use std::str::FromStr;

use db::{
    is_unique_violation,
    models::{
        agency::Agency,
        claim_request::{
            ClaimRequest, ClaimRequestWithAgency, ClaimStatus, NewClaimRequest, VerificationMethod,
        },
        profile::Profile,
    },
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::validation::{FieldErrors, email_matches_website, non_empty};
use uuid::Uuid;

use super::{
    agencies::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    agency_validation::{validate_email, validate_phone},
};

const POSITION_TITLE_MIN: usize = 2;
const POSITION_TITLE_MAX: usize = 100;
const NOTES_MAX: usize = 2000;
pub const REJECTION_REASON_MIN: usize = 10;
pub const REJECTION_REASON_MAX: usize = 1000;

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("claim request not found")]
    NotFound,
    #[error("agency not found")]
    AgencyNotFound,
    #[error("agency has already been claimed")]
    AlreadyClaimed,
    #[error("you already have an open claim for this agency")]
    DuplicateRequest,
    #[error("cannot move a claim from {from} to {to}")]
    InvalidTransition { from: ClaimStatus, to: ClaimStatus },
    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for ClaimError {
    fn from(e: sqlx::Error) -> Self {
        // The partial unique index on open claims.
        if is_unique_violation(&e) {
            ClaimError::DuplicateRequest
        } else {
            ClaimError::Database(e)
        }
    }
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct SubmitClaim {
    pub agency_id: Uuid,
    pub business_email: String,
    pub phone_number: String,
    pub position_title: String,
    pub verification_method: String,
    pub additional_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct RejectClaim {
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct ClaimListParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct ClaimListResponse {
    pub claims: Vec<ClaimRequestWithAgency>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

/// A claim together with the parties the follow-up emails go to.
#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    pub claim: ClaimRequest,
    pub agency: Agency,
    pub claimant: Profile,
}

pub struct ClaimService;

impl ClaimService {
    pub async fn submit(
        pool: &SqlitePool,
        claimant: &Profile,
        input: &SubmitClaim,
    ) -> Result<ClaimOutcome, ClaimError> {
        let mut errors = FieldErrors::new();
        let business_email =
            validate_email("business_email", Some(&input.business_email), &mut errors);
        if business_email.is_none() && !errors.contains("business_email") {
            errors.add("business_email", "is required");
        }
        let phone_number = validate_phone("phone_number", Some(&input.phone_number), &mut errors);
        if phone_number.is_none() && !errors.contains("phone_number") {
            errors.add("phone_number", "is required");
        }
        let position_title = input.position_title.trim().to_string();
        let title_len = position_title.chars().count();
        if !(POSITION_TITLE_MIN..=POSITION_TITLE_MAX).contains(&title_len) {
            errors.add(
                "position_title",
                format!("must be {POSITION_TITLE_MIN} to {POSITION_TITLE_MAX} characters"),
            );
        }
        let verification_method =
            VerificationMethod::from_str(input.verification_method.trim()).ok();
        if verification_method.is_none() {
            errors.add(
                "verification_method",
                "must be one of email, phone, document",
            );
        }
        let additional_notes = non_empty(input.additional_notes.as_deref());
        if additional_notes
            .as_ref()
            .is_some_and(|n| n.chars().count() > NOTES_MAX)
        {
            errors.add(
                "additional_notes",
                format!("must be at most {NOTES_MAX} characters"),
            );
        }
        // Every `None` above has already recorded its field error.
        let (Some(business_email), Some(phone_number), Some(verification_method), true) = (
            business_email,
            phone_number,
            verification_method,
            errors.is_empty(),
        ) else {
            return Err(ClaimError::Validation(errors));
        };

        let agency = Agency::find_by_id(pool, input.agency_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(ClaimError::AgencyNotFound)?;
        if agency.is_claimed {
            return Err(ClaimError::AlreadyClaimed);
        }
        if ClaimRequest::find_active(pool, agency.id, claimant.id)
            .await?
            .is_some()
        {
            return Err(ClaimError::DuplicateRequest);
        }

        let email_domain_verified = agency
            .website
            .as_deref()
            .is_some_and(|site| email_matches_website(&business_email, site));

        let claim = ClaimRequest::create(
            pool,
            Uuid::new_v4(),
            &NewClaimRequest {
                agency_id: agency.id,
                user_id: claimant.id,
                business_email,
                phone_number,
                position_title,
                verification_method,
                additional_notes,
                email_domain_verified,
            },
        )
        .await?;

        info!(
            claim_id = %claim.id,
            agency_id = %agency.id,
            user_id = %claimant.id,
            email_domain_verified,
            "claim submitted"
        );
        Ok(ClaimOutcome {
            claim,
            agency,
            claimant: claimant.clone(),
        })
    }

    pub async fn mine(
        pool: &SqlitePool,
        user_id: Uuid,
    ) -> Result<Vec<ClaimRequestWithAgency>, ClaimError> {
        Ok(ClaimRequest::find_by_user(pool, user_id).await?)
    }

    pub async fn list(
        pool: &SqlitePool,
        params: &ClaimListParams,
    ) -> Result<ClaimListResponse, ClaimError> {
        let mut errors = FieldErrors::new();
        let status = match non_empty(params.status.as_deref()) {
            Some(raw) => match ClaimStatus::from_str(&raw) {
                Ok(status) => Some(status),
                Err(_) => {
                    errors.add(
                        "status",
                        "must be one of pending, under_review, approved, rejected",
                    );
                    None
                }
            },
            None => None,
        };
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            errors.add("limit", format!("must be between 1 and {MAX_PAGE_SIZE}"));
        }
        let offset = params.offset.unwrap_or(0);
        if offset < 0 {
            errors.add("offset", "must not be negative");
        }
        errors.into_result().map_err(ClaimError::Validation)?;

        let claims = ClaimRequest::list(pool, status, limit, offset).await?;
        let total = ClaimRequest::count(pool, status).await?;
        Ok(ClaimListResponse {
            has_more: offset + (claims.len() as i64) < total,
            claims,
            total,
            limit,
            offset,
        })
    }

    /// `pending → under_review`.
    pub async fn start_review(
        pool: &SqlitePool,
        id: Uuid,
        reviewer: &Profile,
    ) -> Result<ClaimRequest, ClaimError> {
        let claim = ClaimRequest::find_by_id(pool, id)
            .await?
            .ok_or(ClaimError::NotFound)?;
        let to = ClaimStatus::UnderReview;
        ensure_transition(claim.status, to)?;
        let claim = ClaimRequest::transition(pool, id, claim.status, to, reviewer.id, None)
            .await?
            .ok_or(ClaimError::InvalidTransition {
                from: claim.status,
                to,
            })?;
        info!(claim_id = %id, reviewer_id = %reviewer.id, "claim under review");
        Ok(claim)
    }

    /// Approves the claim, transfers ownership of the agency and promotes
    /// the claimant, all in one transaction.
    pub async fn approve(
        pool: &SqlitePool,
        id: Uuid,
        reviewer: &Profile,
    ) -> Result<ClaimOutcome, ClaimError> {
        let mut tx = pool.begin().await?;
        let current = ClaimRequest::find_by_id(&mut *tx, id)
            .await?
            .ok_or(ClaimError::NotFound)?;
        let to = ClaimStatus::Approved;
        ensure_transition(current.status, to)?;

        let claim = ClaimRequest::transition(&mut *tx, id, current.status, to, reviewer.id, None)
            .await?
            .ok_or(ClaimError::InvalidTransition {
                from: current.status,
                to,
            })?;
        if !Agency::mark_claimed(&mut *tx, claim.agency_id, claim.user_id).await? {
            return Err(ClaimError::AlreadyClaimed);
        }
        Profile::promote_to_owner(&mut *tx, claim.user_id).await?;

        let agency = Agency::find_by_id(&mut *tx, claim.agency_id)
            .await?
            .ok_or(ClaimError::AgencyNotFound)?;
        let claimant = Profile::find_by_id(&mut *tx, claim.user_id)
            .await?
            .ok_or(ClaimError::NotFound)?;
        tx.commit().await?;

        info!(
            claim_id = %id,
            agency_id = %agency.id,
            owner_id = %claimant.id,
            reviewer_id = %reviewer.id,
            "claim approved"
        );
        Ok(ClaimOutcome {
            claim,
            agency,
            claimant,
        })
    }

    pub async fn reject(
        pool: &SqlitePool,
        id: Uuid,
        reviewer: &Profile,
        input: &RejectClaim,
    ) -> Result<ClaimOutcome, ClaimError> {
        let reason = input.reason.trim();
        let len = reason.chars().count();
        if !(REJECTION_REASON_MIN..=REJECTION_REASON_MAX).contains(&len) {
            let mut errors = FieldErrors::new();
            errors.add(
                "reason",
                format!(
                    "must be {REJECTION_REASON_MIN} to {REJECTION_REASON_MAX} characters"
                ),
            );
            return Err(ClaimError::Validation(errors));
        }

        let mut tx = pool.begin().await?;
        let current = ClaimRequest::find_by_id(&mut *tx, id)
            .await?
            .ok_or(ClaimError::NotFound)?;
        let to = ClaimStatus::Rejected;
        ensure_transition(current.status, to)?;
        let claim =
            ClaimRequest::transition(&mut *tx, id, current.status, to, reviewer.id, Some(reason))
                .await?
                .ok_or(ClaimError::InvalidTransition {
                    from: current.status,
                    to,
                })?;
        let agency = Agency::find_by_id(&mut *tx, claim.agency_id)
            .await?
            .ok_or(ClaimError::AgencyNotFound)?;
        let claimant = Profile::find_by_id(&mut *tx, claim.user_id)
            .await?
            .ok_or(ClaimError::NotFound)?;
        tx.commit().await?;

        info!(claim_id = %id, reviewer_id = %reviewer.id, "claim rejected");
        Ok(ClaimOutcome {
            claim,
            agency,
            claimant,
        })
    }
}

fn ensure_transition(from: ClaimStatus, to: ClaimStatus) -> Result<(), ClaimError> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(ClaimError::InvalidTransition { from, to })
    }
}
