use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Loyalty account row, one per user.
///
/// `accumulated_points` and `spent_points` only ever grow; the spendable
/// balance is the difference and stays non-negative.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoyaltyAccount {
    pub user_id: i64,
    pub accumulated_points: i64,
    pub spent_points: i64,
}

impl LoyaltyAccount {
    pub fn current_balance(&self) -> i64 {
        self.accumulated_points - self.spent_points
    }
}

/// Append-only loyalty movement. Positive points = earned, negative = redeemed.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoyaltyHistoryEntry {
    pub id: i64,
    pub user_id: i64,
    pub points: i64,
    pub reason: String,
    pub earned_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Balance projection returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub accumulated_points: i64,
    pub spent_points: i64,
    pub current_balance: i64,
}

/// History projection; `date` is a pre-formatted timestamp.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntryResponse {
    pub points: i64,
    pub reason: String,
    pub date: String,
}

/// Accrual request (order-completion entry point)
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct AccrueRequest {
    pub user_id: i64,
    pub order_id: i64,
    pub order_total: Option<Decimal>,
}

/// Redemption request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct RedeemRequest {
    pub user_id: i64,
    pub points_to_redeem: i64,
    pub order_id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RedeemResponse {
    pub user_id: i64,
    pub order_id: i64,
    pub points_redeemed: i64,
    pub discount_amount: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccrueResponse {
    pub user_id: i64,
    pub order_id: i64,
    pub points_added: i64,
}

/// User row. `password_hash` never leaves the service.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub cpf: Option<String>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        UserProfile {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role,
            phone: user.phone,
            cpf: user.cpf,
        }
    }
}

/// Registration request
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

/// Profile update; only whitelisted fields are accepted.
#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 120))]
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub cpf: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct PasswordResetRequest {
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// Delivery address row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Address {
    pub id: i64,
    pub user_id: i64,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub neighborhood: String,
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct CreateAddressRequest {
    #[validate(length(min = 1, max = 200))]
    pub street: String,
    #[validate(length(min = 1, max = 20))]
    pub number: String,
    pub complement: Option<String>,
    #[validate(length(min = 1, max = 120))]
    pub neighborhood: String,
    #[validate(length(min = 1, max = 120))]
    pub city: String,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub is_default: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct UpdateAddressRequest {
    pub street: Option<String>,
    pub number: Option<String>,
    pub complement: Option<String>,
    pub neighborhood: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub is_default: Option<bool>,
}

/// Password reset token row
#[derive(Debug, Clone, FromRow)]
pub struct PasswordResetToken {
    pub id: i64,
    pub user_id: i64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
