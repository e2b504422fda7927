use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use chrono::{Duration, Utc};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::rc::Rc;

use crate::errors::{LoyaltyEngineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

impl Claims {
    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn is_staff(&self) -> bool {
        matches!(self.role.as_str(), "admin" | "manager")
    }

    /// Self-or-admin rule used by the per-user routes.
    pub fn can_access_user(&self, user_id: i64) -> bool {
        self.is_admin() || self.user_id() == Some(user_id)
    }
}

/// Issue an HS256 access token for an authenticated user.
pub fn issue_token(user_id: i64, role: &str, secret: &str, expiry_hours: i64) -> Result<String> {
    let expiration = Utc::now() + Duration::hours(expiry_hours);

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| LoyaltyEngineError::Internal(format!("Failed to issue token: {}", e)))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|_| LoyaltyEngineError::InvalidCredentials)
}

/// Middleware guarding the protected route scope. Valid bearer tokens get
/// their claims inserted into request extensions for handlers to read via
/// `ReqData<Claims>`.
pub struct JwtAuth {
    secret: String,
}

impl JwtAuth {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct JwtAuthMiddleware<S> {
    service: Rc<S>,
    secret: String,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Skip auth for the public endpoints: login, password recovery and
        // customer registration
        let public = req.path().starts_with("/api/v1/auth/")
            || (req.path() == "/api/v1/customers"
                && req.method() == actix_web::http::Method::POST);
        if public {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        // Extract token from Authorization header
        let auth_header = req.headers().get("Authorization");

        let token = match auth_header {
            Some(value) => {
                let auth_str = value.to_str().unwrap_or("");
                if let Some(bearer) = auth_str.strip_prefix("Bearer ") {
                    bearer.to_string()
                } else {
                    return Box::pin(async {
                        Err(actix_web::error::ErrorUnauthorized("Invalid auth header format"))
                    });
                }
            }
            None => {
                return Box::pin(async {
                    Err(actix_web::error::ErrorUnauthorized("Missing Authorization header"))
                });
            }
        };

        match verify_token(&token, &self.secret) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);

                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(_) => {
                tracing::warn!("JWT validation failed for {}", req.path());
                Box::pin(async {
                    Err(actix_web::error::ErrorUnauthorized("Invalid or expired token"))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let token = issue_token(42, "customer", "test-secret", 1).unwrap();
        let claims = verify_token(&token, "test-secret").unwrap();

        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.role, "customer");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token(42, "customer", "test-secret", 1).unwrap();
        assert!(verify_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_access_rules() {
        let customer = Claims {
            sub: "7".to_string(),
            role: "customer".to_string(),
            exp: 0,
        };
        assert!(customer.can_access_user(7));
        assert!(!customer.can_access_user(8));
        assert!(!customer.is_staff());

        let admin = Claims {
            sub: "1".to_string(),
            role: "admin".to_string(),
            exp: 0,
        };
        assert!(admin.can_access_user(999));
        assert!(admin.is_staff());
    }
}
