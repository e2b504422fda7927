use crate::auth;
use crate::errors::{LoyaltyEngineError, Result};
use crate::models::{
    CreateUserRequest, LoginResponse, PasswordResetToken, UpdateUserRequest, User, UserProfile,
};
use crate::notify::NotificationClient;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

const RESET_TOKEN_LEN: usize = 48;

/// Minimum password rules shared by registration and password reset:
/// at least 8 characters with an upper-case letter, a lower-case letter
/// and a digit.
pub fn validate_password_strength(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(LoyaltyEngineError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(LoyaltyEngineError::Validation(
            "Password must contain an upper-case letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(LoyaltyEngineError::Validation(
            "Password must contain a lower-case letter".to_string(),
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(LoyaltyEngineError::Validation(
            "Password must contain a digit".to_string(),
        ));
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LoyaltyEngineError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| LoyaltyEngineError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn generate_reset_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Account lifecycle: registration, authentication, profile management and
/// password recovery. Users are soft-deleted: every lookup filters on
/// `is_active`.
pub struct UserService {
    pool: Arc<PgPool>,
    notifier: Arc<NotificationClient>,
    jwt_secret: String,
    token_expiry_hours: i64,
    reset_token_ttl_hours: i64,
    reset_link_base: String,
}

impl UserService {
    pub fn new(
        pool: Arc<PgPool>,
        notifier: Arc<NotificationClient>,
        jwt_secret: String,
        token_expiry_hours: i64,
        reset_token_ttl_hours: i64,
        reset_link_base: String,
    ) -> Self {
        UserService {
            pool,
            notifier,
            jwt_secret,
            token_expiry_hours,
            reset_token_ttl_hours,
            reset_link_base,
        }
    }

    /// Register a new user. Defaults to the `customer` role; customers get a
    /// welcome email, and a failed send never fails the registration.
    pub async fn create_user(&self, request: CreateUserRequest) -> Result<UserProfile> {
        validator::Validate::validate(&request)
            .map_err(|e| LoyaltyEngineError::Validation(e.to_string()))?;
        validate_password_strength(&request.password)?;

        let role = request.role.as_deref().unwrap_or("customer");
        let password_hash = hash_password(&request.password)?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (full_name, email, password_hash, role, phone, cpf, date_of_birth, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE, $8)
            RETURNING id, full_name, email, password_hash, role, phone, cpf, date_of_birth, is_active, created_at
            "#,
        )
        .bind(&request.full_name)
        .bind(&request.email)
        .bind(&password_hash)
        .bind(role)
        .bind(&request.phone)
        .bind(&request.cpf)
        .bind(request.date_of_birth)
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                LoyaltyEngineError::EmailTaken(request.email.clone())
            }
            _ => LoyaltyEngineError::Database(e),
        })?;

        info!("Created {} account {} ({})", user.role, user.id, user.email);

        if user.role == "customer" {
            if let Err(e) = self.notifier.send_welcome(&user.email, &user.full_name).await {
                error!("Failed to send welcome email to {}: {}", user.email, e);
            }
        }

        Ok(user.into())
    }

    /// Verify credentials and issue an access token. Works for any role.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, full_name, email, password_hash, role, phone, cpf, date_of_birth, is_active, created_at
            FROM users
            WHERE email = $1 AND is_active = TRUE
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(LoyaltyEngineError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash)? {
            return Err(LoyaltyEngineError::InvalidCredentials);
        }

        let access_token =
            auth::issue_token(user.id, &user.role, &self.jwt_secret, self.token_expiry_hours)?;

        Ok(LoginResponse {
            access_token,
            token_type: "Bearer".to_string(),
        })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<UserProfile> {
        let user = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, full_name, email, role, phone, cpf
            FROM users
            WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(LoyaltyEngineError::UserNotFound(user_id))?;

        Ok(user)
    }

    pub async fn list_by_role(&self, role: &str) -> Result<Vec<UserProfile>> {
        let users = sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, full_name, email, role, phone, cpf
            FROM users
            WHERE role = $1 AND is_active = TRUE
            ORDER BY full_name
            "#,
        )
        .bind(role)
        .fetch_all(&*self.pool)
        .await?;

        Ok(users)
    }

    /// Update the whitelisted profile fields; anything absent is left alone.
    pub async fn update_user(&self, user_id: i64, request: UpdateUserRequest) -> Result<UserProfile> {
        validator::Validate::validate(&request)
            .map_err(|e| LoyaltyEngineError::Validation(e.to_string()))?;

        let result = sqlx::query(
            r#"
            UPDATE users
            SET full_name = COALESCE($1, full_name),
                phone = COALESCE($2, phone),
                cpf = COALESCE($3, cpf),
                date_of_birth = COALESCE($4, date_of_birth)
            WHERE id = $5 AND is_active = TRUE
            "#,
        )
        .bind(&request.full_name)
        .bind(&request.phone)
        .bind(&request.cpf)
        .bind(request.date_of_birth)
        .bind(user_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LoyaltyEngineError::UserNotFound(user_id));
        }

        self.get_user(user_id).await
    }

    /// Soft delete. The row stays for ledger history and auditing.
    pub async fn deactivate_user(&self, user_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE users SET is_active = FALSE WHERE id = $1 AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LoyaltyEngineError::UserNotFound(user_id));
        }

        info!("Deactivated user {}", user_id);
        Ok(())
    }

    /// Start password recovery. Always succeeds from the caller's point of
    /// view so the endpoint cannot be used to probe for registered emails.
    pub async fn initiate_password_reset(&self, email: &str) -> Result<()> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, full_name, email, password_hash, role, phone, cpf, date_of_birth, is_active, created_at
            FROM users
            WHERE email = $1 AND is_active = TRUE
            "#,
        )
        .bind(email)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(user) = user else {
            info!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::hours(self.reset_token_ttl_hours);

        sqlx::query(
            r#"
            INSERT INTO password_reset_tokens (user_id, token, expires_at, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user.id)
        .bind(&token)
        .bind(expires_at)
        .bind(Utc::now())
        .execute(&*self.pool)
        .await?;

        let reset_link = format!("{}/reset-password?token={}", self.reset_link_base, token);
        if let Err(e) = self
            .notifier
            .send_password_reset(&user.email, &user.full_name, &reset_link)
            .await
        {
            error!("Failed to send password reset email to {}: {}", user.email, e);
        }

        Ok(())
    }

    /// Complete password recovery: the token must exist, be unused and
    /// unexpired. Password update and token invalidation commit together.
    pub async fn finalize_password_reset(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password_strength(new_password)?;

        let mut tx = self.pool.begin().await?;

        let record = sqlx::query_as::<_, PasswordResetToken>(
            r#"
            SELECT id, user_id, token, expires_at, used_at, created_at
            FROM password_reset_tokens
            WHERE token = $1
            FOR UPDATE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(record) = record else {
            return Err(LoyaltyEngineError::ResetTokenInvalid);
        };

        if record.used_at.is_some() {
            return Err(LoyaltyEngineError::ResetTokenUsed);
        }

        if Utc::now() > record.expires_at {
            return Err(LoyaltyEngineError::ResetTokenExpired);
        }

        let user_id = record.user_id;

        let password_hash = hash_password(new_password)?;

        sqlx::query(
            r#"
            UPDATE users SET password_hash = $1 WHERE id = $2
            "#,
        )
        .bind(&password_hash)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE password_reset_tokens SET used_at = $1 WHERE token = $2
            "#,
        )
        .bind(Utc::now())
        .bind(token)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Password reset completed for user {}", user_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength_accepts_good_password() {
        assert!(validate_password_strength("Burger123").is_ok());
    }

    #[test]
    fn test_password_strength_rejects_short() {
        assert!(validate_password_strength("Ab1").is_err());
    }

    #[test]
    fn test_password_strength_rejects_missing_classes() {
        assert!(validate_password_strength("alllowercase1").is_err());
        assert!(validate_password_strength("ALLUPPERCASE1").is_err());
        assert!(validate_password_strength("NoDigitsHere").is_err());
    }

    #[test]
    fn test_hash_and_verify_round_trip() {
        let hash = hash_password("Burger123").unwrap();
        assert!(verify_password("Burger123", &hash).unwrap());
        assert!(!verify_password("Burger124", &hash).unwrap());
    }

    #[test]
    fn test_reset_tokens_are_random() {
        let a = generate_reset_token();
        let b = generate_reset_token();
        assert_eq!(a.len(), RESET_TOKEN_LEN);
        assert_ne!(a, b);
    }
}
