use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteExecutor, Type};
use strum_macros::{Display, EnumString};
use ts_rs::TS;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, TS, EnumString, Display, Default,
)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    #[default]
    User,
    AgencyOwner,
    Admin,
}

impl UserRole {
    pub fn is_admin(self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

/// Account record mirroring an auth-provider user.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, TS)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct UpdateProfile {
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileFilter {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub limit: i64,
    pub offset: i64,
}

const PROFILE_COLUMNS: &str = "id, email, full_name, role, is_active, created_at, updated_at";

impl Profile {
    pub async fn find_by_id<'e, E>(executor: E, id: Uuid) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Profile>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    /// Returns the profile for an authenticated user, creating it with the
    /// default role on first sight.
    pub async fn find_or_create<'e, E>(
        executor: E,
        id: Uuid,
        email: &str,
    ) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Profile>(&format!(
            r#"INSERT INTO profiles (id, email, role)
               VALUES ($1, $2, $3)
               ON CONFLICT(id) DO UPDATE SET email = profiles.email
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(id)
        .bind(email)
        .bind(UserRole::default())
        .fetch_one(executor)
        .await
    }

    pub async fn create<'e, E>(
        executor: E,
        id: Uuid,
        email: &str,
        full_name: Option<&str>,
        role: UserRole,
    ) -> Result<Self, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Profile>(&format!(
            r#"INSERT INTO profiles (id, email, full_name, role)
               VALUES ($1, $2, $3, $4)
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(id)
        .bind(email)
        .bind(full_name)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    pub async fn list<'e, E>(
        executor: E,
        filter: &ProfileFilter,
    ) -> Result<Vec<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {PROFILE_COLUMNS} FROM profiles"));
        push_profile_filters(&mut qb, filter);
        qb.push(" ORDER BY created_at DESC, email ASC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);
        qb.build_query_as::<Profile>().fetch_all(executor).await
    }

    pub async fn count<'e, E>(executor: E, filter: &ProfileFilter) -> Result<i64, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM profiles");
        push_profile_filters(&mut qb, filter);
        qb.build_query_scalar::<i64>().fetch_one(executor).await
    }

    pub async fn update<'e, E>(
        executor: E,
        id: Uuid,
        data: &UpdateProfile,
    ) -> Result<Option<Self>, sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query_as::<_, Profile>(&format!(
            r#"UPDATE profiles
               SET full_name = COALESCE($2, full_name),
                   role = COALESCE($3, role),
                   is_active = COALESCE($4, is_active),
                   updated_at = datetime('now', 'subsec')
               WHERE id = $1
               RETURNING {PROFILE_COLUMNS}"#
        ))
        .bind(id)
        .bind(data.full_name.as_deref())
        .bind(data.role)
        .bind(data.is_active)
        .fetch_optional(executor)
        .await
    }

    /// Promotes a plain user to agency owner; other roles are left alone.
    pub async fn promote_to_owner<'e, E>(executor: E, id: Uuid) -> Result<(), sqlx::Error>
    where
        E: SqliteExecutor<'e>,
    {
        sqlx::query(
            r#"UPDATE profiles
               SET role = $2, updated_at = datetime('now', 'subsec')
               WHERE id = $1 AND role = $3"#,
        )
        .bind(id)
        .bind(UserRole::AgencyOwner)
        .bind(UserRole::User)
        .execute(executor)
        .await?;
        Ok(())
    }
}

fn push_profile_filters(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ProfileFilter) {
    qb.push(" WHERE 1 = 1");
    if let Some(search) = filter.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = format!("%{}%", search.trim());
        qb.push(" AND (email LIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_name LIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DBService;

    #[tokio::test]
    async fn find_or_create_is_idempotent() {
        let db = DBService::new_in_memory().await.unwrap();
        let id = Uuid::new_v4();
        let first = Profile::find_or_create(&db.pool, id, "pat@example.com")
            .await
            .unwrap();
        assert_eq!(first.role, UserRole::User);

        Profile::update(
            &db.pool,
            id,
            &UpdateProfile {
                role: Some(UserRole::Admin),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let again = Profile::find_or_create(&db.pool, id, "pat@example.com")
            .await
            .unwrap();
        assert_eq!(again.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn promote_only_touches_plain_users() {
        let db = DBService::new_in_memory().await.unwrap();
        let user = Profile::create(&db.pool, Uuid::new_v4(), "u@example.com", None, UserRole::User)
            .await
            .unwrap();
        let admin =
            Profile::create(&db.pool, Uuid::new_v4(), "a@example.com", None, UserRole::Admin)
                .await
                .unwrap();

        Profile::promote_to_owner(&db.pool, user.id).await.unwrap();
        Profile::promote_to_owner(&db.pool, admin.id).await.unwrap();

        let user = Profile::find_by_id(&db.pool, user.id).await.unwrap().unwrap();
        let admin = Profile::find_by_id(&db.pool, admin.id).await.unwrap().unwrap();
        assert_eq!(user.role, UserRole::AgencyOwner);
        assert_eq!(admin.role, UserRole::Admin);
    }

    #[tokio::test]
    async fn list_filters_by_role_and_search() {
        let db = DBService::new_in_memory().await.unwrap();
        Profile::create(&db.pool, Uuid::new_v4(), "dana@acme.com", Some("Dana Reyes"), UserRole::User)
            .await
            .unwrap();
        Profile::create(&db.pool, Uuid::new_v4(), "lee@builders.com", None, UserRole::Admin)
            .await
            .unwrap();

        let filter = ProfileFilter {
            search: Some("reyes".into()),
            limit: 10,
            ..Default::default()
        };
        let found = Profile::list(&db.pool, &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].email, "dana@acme.com");

        let admins = ProfileFilter {
            role: Some(UserRole::Admin),
            limit: 10,
            ..Default::default()
        };
        assert_eq!(Profile::count(&db.pool, &admins).await.unwrap(), 1);
    }
}
