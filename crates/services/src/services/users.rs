//! Admin management of user profiles.

use std::str::FromStr;

use db::models::profile::{Profile, ProfileFilter, UpdateProfile, UserRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use ts_rs::TS;
use utils::validation::{FieldErrors, non_empty};
use uuid::Uuid;

use super::{
    agencies::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    audit::diff,
};

const FULL_NAME_MAX: usize = 200;

#[derive(Debug, Error)]
pub enum UserAdminError {
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("user not found")]
    NotFound,
    #[error("{0}")]
    SelfModification(&'static str),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
pub struct UserListParams {
    pub search: Option<String>,
    pub role: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, TS)]
pub struct UserListResponse {
    pub users: Vec<Profile>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub before: Profile,
    pub after: Profile,
}

impl ProfileUpdate {
    pub fn changes(&self) -> Value {
        diff(&self.before, &self.after)
    }
}

pub struct UserAdminService;

impl UserAdminService {
    pub async fn list(
        pool: &SqlitePool,
        params: &UserListParams,
    ) -> Result<UserListResponse, UserAdminError> {
        let mut errors = FieldErrors::new();
        let role = match non_empty(params.role.as_deref()) {
            Some(raw) => UserRole::from_str(&raw).map(Some).unwrap_or_else(|_| {
                errors.add("role", "must be one of user, agency_owner, admin");
                None
            }),
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
        errors.into_result().map_err(UserAdminError::Validation)?;

        let filter = ProfileFilter {
            search: non_empty(params.search.as_deref()),
            role,
            limit,
            offset,
        };
        let users = Profile::list(pool, &filter).await?;
        let total = Profile::count(pool, &filter).await?;
        Ok(UserListResponse {
            has_more: offset + (users.len() as i64) < total,
            users,
            total,
            limit,
            offset,
        })
    }

    /// Admins cannot change their own role or disable their own account, so
    /// the last admin can never lock everyone out.
    pub async fn update(
        pool: &SqlitePool,
        id: Uuid,
        patch: &UpdateProfile,
        admin: &Profile,
    ) -> Result<ProfileUpdate, UserAdminError> {
        if id == admin.id {
            if patch.role.is_some_and(|role| role != admin.role) {
                return Err(UserAdminError::SelfModification(
                    "you cannot change your own role",
                ));
            }
            if patch.is_active == Some(false) {
                return Err(UserAdminError::SelfModification(
                    "you cannot deactivate your own account",
                ));
            }
        }

        let mut errors = FieldErrors::new();
        let full_name = match patch.full_name.as_deref() {
            Some(raw) => {
                let name = raw.trim();
                if name.is_empty() {
                    errors.add("full_name", "must not be empty");
                } else if name.chars().count() > FULL_NAME_MAX {
                    errors.add(
                        "full_name",
                        format!("must be at most {FULL_NAME_MAX} characters"),
                    );
                }
                Some(name.to_string())
            }
            None => None,
        };
        errors.into_result().map_err(UserAdminError::Validation)?;

        let mut tx = pool.begin().await?;
        let before = Profile::find_by_id(&mut *tx, id)
            .await?
            .ok_or(UserAdminError::NotFound)?;
        let after = Profile::update(
            &mut *tx,
            id,
            &UpdateProfile {
                full_name,
                role: patch.role,
                is_active: patch.is_active,
            },
        )
        .await?
        .ok_or(UserAdminError::NotFound)?;
        tx.commit().await?;

        info!(user_id = %id, admin_id = %admin.id, role = %after.role, "profile updated");
        Ok(ProfileUpdate { before, after })
    }
}

#[cfg(test)]
mod tests {
    use db::DBService;

    use super::*;

    async fn seed(db: &DBService) -> (Profile, Profile) {
        let admin = Profile::create(
            &db.pool,
            Uuid::new_v4(),
            "root@directory.test",
            Some("Root"),
            UserRole::Admin,
        )
        .await
        .unwrap();
        let user = Profile::find_or_create(&db.pool, Uuid::new_v4(), "pat@crews.com")
            .await
            .unwrap();
        (admin, user)
    }

    #[tokio::test]
    async fn admins_cannot_demote_or_disable_themselves() {
        let db = DBService::new_in_memory().await.unwrap();
        let (admin, _) = seed(&db).await;

        let demote = UserAdminService::update(
            &db.pool,
            admin.id,
            &UpdateProfile {
                role: Some(UserRole::User),
                ..Default::default()
            },
            &admin,
        )
        .await;
        assert!(matches!(demote, Err(UserAdminError::SelfModification(_))));

        let disable = UserAdminService::update(
            &db.pool,
            admin.id,
            &UpdateProfile {
                is_active: Some(false),
                ..Default::default()
            },
            &admin,
        )
        .await;
        assert!(matches!(disable, Err(UserAdminError::SelfModification(_))));

        let rename = UserAdminService::update(
            &db.pool,
            admin.id,
            &UpdateProfile {
                full_name: Some(" Root Admin ".into()),
                role: Some(UserRole::Admin),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
        assert_eq!(rename.after.full_name.as_deref(), Some("Root Admin"));
    }

    #[tokio::test]
    async fn role_changes_are_diffed() {
        let db = DBService::new_in_memory().await.unwrap();
        let (admin, user) = seed(&db).await;

        let update = UserAdminService::update(
            &db.pool,
            user.id,
            &UpdateProfile {
                role: Some(UserRole::AgencyOwner),
                is_active: Some(false),
                ..Default::default()
            },
            &admin,
        )
        .await
        .unwrap();
        let changes = update.changes();
        assert_eq!(changes["role"]["old"], "user");
        assert_eq!(changes["role"]["new"], "agency_owner");
        assert_eq!(changes["is_active"]["new"], false);

        let missing = UserAdminService::update(
            &db.pool,
            Uuid::new_v4(),
            &UpdateProfile::default(),
            &admin,
        )
        .await;
        assert!(matches!(missing, Err(UserAdminError::NotFound)));
    }

    #[tokio::test]
    async fn list_filters_by_role_and_search() {
        let db = DBService::new_in_memory().await.unwrap();
        seed(&db).await;

        let admins = UserAdminService::list(
            &db.pool,
            &UserListParams {
                role: Some("admin".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(admins.total, 1);
        assert_eq!(admins.users[0].email, "root@directory.test");

        let by_email = UserAdminService::list(
            &db.pool,
            &UserListParams {
                search: Some("crews".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(by_email.total, 1);

        let bad = UserAdminService::list(
            &db.pool,
            &UserListParams {
                role: Some("superuser".into()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad, Err(UserAdminError::Validation(_))));
    }
}
