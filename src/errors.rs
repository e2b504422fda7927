use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoyaltyEngineError>;

#[derive(Error, Debug)]
pub enum LoyaltyEngineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient points: requested {requested}, available {available}")]
    InsufficientPoints { requested: i64, available: i64 },

    #[error("Invalid loyalty configuration: {0}")]
    InvalidConfiguration(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Address not found: {0}")]
    AddressNotFound(i64),

    #[error("Email already registered: {0}")]
    EmailTaken(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Access not authorized")]
    Forbidden,

    #[error("Password reset token is invalid")]
    ResetTokenInvalid,

    #[error("Password reset token has already been used")]
    ResetTokenUsed,

    #[error("Password reset token has expired")]
    ResetTokenExpired,

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for LoyaltyEngineError {
    fn from(err: serde_json::Error) -> Self {
        LoyaltyEngineError::Internal(format!("JSON serialization error: {}", err))
    }
}

impl ResponseError for LoyaltyEngineError {
    fn error_response(&self) -> HttpResponse {
        let status_code = self.status_code();
        let error_message = self.to_string();

        HttpResponse::build(status_code).json(json!({
            "error": {
                "code": status_code.as_u16(),
                "message": error_message,
                "type": self.error_type()
            }
        }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            LoyaltyEngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LoyaltyEngineError::Validation(_) => StatusCode::BAD_REQUEST,
            LoyaltyEngineError::InsufficientPoints { .. } => StatusCode::BAD_REQUEST,
            LoyaltyEngineError::InvalidConfiguration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LoyaltyEngineError::UserNotFound(_) => StatusCode::NOT_FOUND,
            LoyaltyEngineError::AddressNotFound(_) => StatusCode::NOT_FOUND,
            LoyaltyEngineError::EmailTaken(_) => StatusCode::CONFLICT,
            LoyaltyEngineError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            LoyaltyEngineError::Forbidden => StatusCode::FORBIDDEN,
            LoyaltyEngineError::ResetTokenInvalid => StatusCode::BAD_REQUEST,
            LoyaltyEngineError::ResetTokenUsed => StatusCode::BAD_REQUEST,
            LoyaltyEngineError::ResetTokenExpired => StatusCode::BAD_REQUEST,
            LoyaltyEngineError::PasswordHash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LoyaltyEngineError::Notification(_) => StatusCode::BAD_GATEWAY,
            LoyaltyEngineError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            LoyaltyEngineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl LoyaltyEngineError {
    fn error_type(&self) -> &str {
        match self {
            LoyaltyEngineError::Database(_) => "database_error",
            LoyaltyEngineError::Validation(_) => "validation_error",
            LoyaltyEngineError::InsufficientPoints { .. } => "insufficient_points",
            LoyaltyEngineError::InvalidConfiguration(_) => "invalid_configuration",
            LoyaltyEngineError::UserNotFound(_) => "not_found",
            LoyaltyEngineError::AddressNotFound(_) => "not_found",
            LoyaltyEngineError::EmailTaken(_) => "duplicate_error",
            LoyaltyEngineError::InvalidCredentials => "invalid_credentials",
            LoyaltyEngineError::Forbidden => "forbidden",
            LoyaltyEngineError::ResetTokenInvalid => "reset_token_invalid",
            LoyaltyEngineError::ResetTokenUsed => "reset_token_used",
            LoyaltyEngineError::ResetTokenExpired => "reset_token_expired",
            LoyaltyEngineError::PasswordHash(_) => "password_hash_error",
            LoyaltyEngineError::Notification(_) => "notification_error",
            LoyaltyEngineError::ConfigError(_) => "configuration_error",
            LoyaltyEngineError::Internal(_) => "internal_error",
        }
    }
}
