//! PostgreSQL Repository Implementations

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::entity::{
    profile::Profile,
    token::{Token, TokenScope},
    user::User,
    user_event::UserEvent,
    verify_email::{NewVerifyEmail, VerifyEmail},
};
use crate::domain::hook::RegistrationHook;
use crate::domain::repository::{
    ProfileRepository, StatRepository, TokenRepository, UserRepository, VerifyEmailRepository,
};
use crate::domain::value_object::{
    email::Email,
    ids::{UserId, VerifyEmailId},
    user_name::UserName,
    user_password::UserPassword,
    user_role::UserRole,
};
use crate::error::{AuthError, AuthResult};

const USER_COLUMNS: &str = r#"
    users.user_id,
    users.email,
    users.name,
    users.password_hash,
    users.role,
    users.avatar,
    users.is_email_verified,
    users.created_at,
    users.updated_at
"#;

/// PostgreSQL-backed auth repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique violations on `users` are duplicate registrations
fn map_user_insert_error(err: sqlx::Error) -> AuthError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            AuthError::UserExists
        }
        _ => AuthError::database("create_user")(err),
    }
}

// ============================================================================
// User Repository Implementation
// ============================================================================

impl UserRepository for PgAuthRepository {
    async fn create_with_hook<H>(&self, user: &User, hook: &H) -> AuthResult<()>
    where
        H: RegistrationHook + Sync,
    {
        let mut tx = self.pool.begin().await.map_err(AuthError::database("create_user"))?;

        sqlx::query(
            r#"
            INSERT INTO users (
                user_id,
                email,
                name,
                name_canonical,
                password_hash,
                role,
                avatar,
                is_email_verified,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(user.user_id.as_uuid())
        .bind(user.email.as_str())
        .bind(user.name.display())
        .bind(user.name.canonical())
        .bind(user.password.as_phc_string())
        .bind(user.role.id())
        .bind(&user.avatar)
        .bind(user.is_email_verified)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_user_insert_error)?;

        // Dropping `tx` on any error below rolls the insert back
        let mut batch = jobs::OutboxBatch::new();
        hook.after_create(user, &mut batch)
            .await
            .map_err(|e| match e {
                AuthError::RegistrationHook(_) => e,
                other => AuthError::RegistrationHook(other.to_string()),
            })?;

        jobs::insert_outbox(&mut *tx, &batch)
            .await
            .map_err(|e| AuthError::RegistrationHook(e.to_string()))?;

        tx.commit().await.map_err(AuthError::database("create_user"))?;

        tracing::debug!(
            user_id = %user.user_id,
            outbox_rows = batch.len(),
            "Registration transaction committed"
        );
        Ok(())
    }

    async fn find_by_id(&self, user_id: &UserId) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = $1"
        ))
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::database("find_user_by_id"))?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn find_by_email(&self, email: &Email) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::database("find_user_by_email"))?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn find_by_name(&self, name: &UserName) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE name_canonical = $1"
        ))
        .bind(name.canonical())
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::database("find_user_by_name"))?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn exists_by_email_or_name(&self, email: &Email, name: &UserName) -> AuthResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users WHERE email = $1 OR name_canonical = $2
            )
            "#,
        )
        .bind(email.as_str())
        .bind(name.canonical())
        .fetch_one(&self.pool)
        .await
        .map_err(AuthError::database("user_exists"))?;

        Ok(exists)
    }

    async fn delete(&self, user_id: &UserId) -> AuthResult<bool> {
        // Profiles, tokens and codes cascade
        let deleted = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(AuthError::database("delete_user"))?
            .rows_affected();

        Ok(deleted > 0)
    }
}

// ============================================================================
// Profile Repository Implementation
// ============================================================================

impl ProfileRepository for PgAuthRepository {
    async fn create(&self, profile: &Profile) -> AuthResult<()> {
        let friends: Vec<Uuid> = profile.friends.iter().map(|id| *id.as_uuid()).collect();

        sqlx::query(
            r#"
            INSERT INTO profiles (
                user_id,
                wallet,
                status,
                avatar,
                about,
                friends,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(profile.user_id.as_uuid())
        .bind(profile.wallet)
        .bind(&profile.status)
        .bind(&profile.avatar)
        .bind(&profile.about)
        .bind(&friends)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AuthError::database("create_profile"))?;

        Ok(())
    }

    async fn find_by_user_id(&self, user_id: &UserId) -> AuthResult<Option<Profile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT
                user_id,
                wallet,
                status,
                avatar,
                about,
                friends,
                created_at,
                updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::database("find_profile"))?;

        Ok(row.map(ProfileRow::into_profile))
    }

    async fn create_default_if_missing(&self, user_id: &UserId) -> AuthResult<bool> {
        let profile = Profile::default_for(*user_id);

        let inserted = sqlx::query(
            r#"
            INSERT INTO profiles (
                user_id,
                wallet,
                status,
                avatar,
                about,
                friends,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, '{}', $6, $7)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(profile.user_id.as_uuid())
        .bind(profile.wallet)
        .bind(&profile.status)
        .bind(&profile.avatar)
        .bind(&profile.about)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(AuthError::database("repair_profile"))?
        .rows_affected();

        Ok(inserted > 0)
    }
}

// ============================================================================
// Token Repository Implementation
// ============================================================================

impl TokenRepository for PgAuthRepository {
    async fn replace_for_user(&self, token: &Token) -> AuthResult<()> {
        let mut tx = self.pool.begin().await.map_err(AuthError::database("replace_token"))?;

        // Serializes concurrent logins of the same user
        let locked: Option<Uuid> =
            sqlx::query_scalar("SELECT user_id FROM users WHERE user_id = $1 FOR UPDATE")
                .bind(token.user_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(AuthError::database("replace_token"))?;
        if locked.is_none() {
            return Err(AuthError::UserNotFound);
        }

        sqlx::query("DELETE FROM tokens WHERE user_id = $1")
            .bind(token.user_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(AuthError::database("replace_token"))?;

        sqlx::query(
            r#"
            INSERT INTO tokens (hash, user_id, expiry, scope)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&token.hash[..])
        .bind(token.user_id.as_uuid())
        .bind(token.expiry)
        .bind(token.scope.as_str())
        .execute(&mut *tx)
        .await
        .map_err(AuthError::database("replace_token"))?;

        tx.commit().await.map_err(AuthError::database("replace_token"))?;
        Ok(())
    }

    async fn find_user_by_token(
        &self,
        hash: &[u8; 32],
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            INNER JOIN tokens ON tokens.user_id = users.user_id
            WHERE tokens.hash = $1
              AND tokens.scope = $2
              AND tokens.expiry > $3
            "#
        ))
        .bind(&hash[..])
        .bind(scope.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(AuthError::database("find_user_by_token"))?;

        row.map(|r| r.into_user()).transpose()
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let deleted = sqlx::query("DELETE FROM tokens WHERE expiry <= $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(AuthError::database("delete_expired_tokens"))?
            .rows_affected();

        tracing::info!(tokens_deleted = deleted, "Cleaned up expired tokens");

        Ok(deleted)
    }
}

// ============================================================================
// Verify Email Repository Implementation
// ============================================================================

impl VerifyEmailRepository for PgAuthRepository {
    async fn create(&self, code: NewVerifyEmail) -> AuthResult<VerifyEmail> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO verify_emails (
                user_id,
                email,
                secret_code,
                is_used,
                created_at,
                expired_at
            ) VALUES ($1, $2, $3, FALSE, $4, $5)
            RETURNING id
            "#,
        )
        .bind(code.user_id.as_uuid())
        .bind(code.email.as_str())
        .bind(&code.secret_code)
        .bind(code.created_at)
        .bind(code.expired_at)
        .fetch_one(&self.pool)
        .await
        .map_err(AuthError::database("create_verify_email"))?;

        Ok(code.with_id(VerifyEmailId(id)))
    }

    async fn confirm(
        &self,
        id: VerifyEmailId,
        secret_code: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<User> {
        let mut tx = self.pool.begin().await.map_err(AuthError::database("confirm_verify_email"))?;

        // Conditional update: of two concurrent confirmations only one
        // matches `is_used = FALSE`
        let owner: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE verify_emails
            SET is_used = TRUE
            WHERE id = $1
              AND secret_code = $2
              AND is_used = FALSE
              AND expired_at > $3
            RETURNING user_id
            "#,
        )
        .bind(id.get())
        .bind(secret_code)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AuthError::database("confirm_verify_email"))?;

        let Some(owner) = owner else {
            return Err(AuthError::VerificationNotFound);
        };

        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
            SET is_email_verified = TRUE, updated_at = $2
            WHERE user_id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(owner)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AuthError::database("confirm_verify_email"))?
        .ok_or(AuthError::UserNotFound)?;

        let user = row.into_user()?;
        tx.commit().await.map_err(AuthError::database("confirm_verify_email"))?;

        Ok(user)
    }
}

// ============================================================================
// Stat Repository Implementation
// ============================================================================

impl StatRepository for PgAuthRepository {
    async fn record(&self, event: &UserEvent) -> AuthResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_stat (user_id, event, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(event.user_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.at)
        .execute(&self.pool)
        .await
        .map_err(AuthError::database("record_user_event"))?;

        Ok(())
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: Uuid,
    email: String,
    name: String,
    password_hash: String,
    role: i16,
    avatar: String,
    is_email_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> AuthResult<User> {
        let role = UserRole::from_id(self.role)
            .ok_or_else(|| AuthError::Internal(format!("Invalid role id: {}", self.role)))?;

        Ok(User {
            user_id: UserId::from_uuid(self.user_id),
            email: Email::from_db(self.email),
            password: UserPassword::from_db(self.password_hash)?,
            name: UserName::from_db(self.name),
            role,
            avatar: self.avatar,
            is_email_verified: self.is_email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    wallet: i64,
    status: String,
    avatar: String,
    about: String,
    friends: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ProfileRow {
    fn into_profile(self) -> Profile {
        Profile {
            user_id: UserId::from_uuid(self.user_id),
            wallet: self.wallet,
            status: self.status,
            avatar: self.avatar,
            about: self.about,
            friends: self.friends.into_iter().map(UserId::from_uuid).collect(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
