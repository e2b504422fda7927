use crate::addresses::AddressService;
use crate::auth::{Claims, JwtAuth};
use crate::database::Database;
use crate::errors::LoyaltyEngineError;
use crate::loyalty::LoyaltyService;
use crate::metrics;
use crate::models::{
    AccrueRequest, AccrueResponse, CreateAddressRequest, CreateUserRequest, LoginRequest,
    PasswordResetConfirmRequest, PasswordResetRequest, RedeemRequest, RedeemResponse,
    UpdateAddressRequest, UpdateUserRequest,
};
use crate::users::UserService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "loyalty-engine",
        "version": "1.0.0"
    }))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

// --- Auth ---

pub async fn login(
    users: web::Data<Arc<UserService>>,
    request: web::Json<LoginRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let request = request.into_inner();
    let response = users.authenticate(&request.email, &request.password).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub async fn password_reset(
    users: web::Data<Arc<UserService>>,
    request: web::Json<PasswordResetRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    users.initiate_password_reset(&request.email).await?;
    // Same answer whether or not the email exists
    Ok(HttpResponse::Ok().json(json!({
        "msg": "If the email is registered, a recovery link has been sent"
    })))
}

pub async fn password_reset_confirm(
    users: web::Data<Arc<UserService>>,
    request: web::Json<PasswordResetConfirmRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let request = request.into_inner();
    users
        .finalize_password_reset(&request.token, &request.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "msg": "Password updated successfully" })))
}

// --- Customers ---

/// Public registration. The role field is ignored here: accounts created
/// through the public API are always customers.
pub async fn create_customer(
    users: web::Data<Arc<UserService>>,
    request: web::Json<CreateUserRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let mut request = request.into_inner();
    request.role = Some("customer".to_string());
    let profile = users.create_user(request).await?;
    Ok(HttpResponse::Created().json(profile))
}

pub async fn get_all_customers(
    users: web::Data<Arc<UserService>>,
    claims: web::ReqData<Claims>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    if !claims.is_staff() {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let customers = users.list_by_role("customer").await?;
    Ok(HttpResponse::Ok().json(customers))
}

pub async fn get_customer(
    users: web::Data<Arc<UserService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if !claims.can_access_user(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let profile = users.get_user(user_id).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn update_customer(
    users: web::Data<Arc<UserService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
    request: web::Json<UpdateUserRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    // Customers may only edit themselves
    if claims.user_id() != Some(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let profile = users.update_user(user_id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(profile))
}

pub async fn delete_customer(
    users: web::Data<Arc<UserService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if !claims.can_access_user(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    users.deactivate_user(user_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "msg": "Account deactivated" })))
}

// --- Addresses ---

pub async fn add_address(
    addresses: web::Data<Arc<AddressService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
    request: web::Json<CreateAddressRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if claims.user_id() != Some(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let address = addresses.create(user_id, request.into_inner()).await?;
    Ok(HttpResponse::Created().json(address))
}

pub async fn list_addresses(
    addresses: web::Data<Arc<AddressService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if claims.user_id() != Some(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let list = addresses.list_for_user(user_id).await?;
    Ok(HttpResponse::Ok().json(list))
}

pub async fn update_address(
    addresses: web::Data<Arc<AddressService>>,
    claims: web::ReqData<Claims>,
    address_id: web::Path<i64>,
    request: web::Json<UpdateAddressRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let address_id = address_id.into_inner();
    let address = addresses.get(address_id).await?;
    if claims.user_id() != Some(address.user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let updated = addresses.update(address_id, request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete_address(
    addresses: web::Data<Arc<AddressService>>,
    claims: web::ReqData<Claims>,
    address_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let address_id = address_id.into_inner();
    let address = addresses.get(address_id).await?;
    if claims.user_id() != Some(address.user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    addresses.delete(address_id).await?;
    Ok(HttpResponse::Ok().json(json!({ "msg": "Address deleted" })))
}

// --- Loyalty ---

pub async fn loyalty_balance(
    loyalty: web::Data<Arc<LoyaltyService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if !claims.can_access_user(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let balance = loyalty.get_balance(user_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

pub async fn loyalty_history(
    loyalty: web::Data<Arc<LoyaltyService>>,
    claims: web::ReqData<Claims>,
    user_id: web::Path<i64>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let user_id = user_id.into_inner();
    if !claims.can_access_user(user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let history = loyalty.get_history(user_id).await;
    Ok(HttpResponse::Ok().json(history))
}

/// Redeem points against an order. The handler owns the transaction: the
/// debit and the history entry commit together or not at all.
pub async fn redeem(
    db: web::Data<Arc<Database>>,
    loyalty: web::Data<Arc<LoyaltyService>>,
    claims: web::ReqData<Claims>,
    request: web::Json<RedeemRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    let request = request.into_inner();
    if !claims.is_staff() && claims.user_id() != Some(request.user_id) {
        return Err(LoyaltyEngineError::Forbidden);
    }

    let mut tx = db.begin().await?;
    let discount_amount = loyalty
        .redeem(&mut tx, request.user_id, request.points_to_redeem, request.order_id)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(RedeemResponse {
        user_id: request.user_id,
        order_id: request.order_id,
        points_redeemed: request.points_to_redeem.max(0),
        discount_amount,
    }))
}

/// Order-completion entry point used by the order subsystem. Staff-scoped;
/// customers never call this directly.
pub async fn accrue(
    db: web::Data<Arc<Database>>,
    loyalty: web::Data<Arc<LoyaltyService>>,
    claims: web::ReqData<Claims>,
    request: web::Json<AccrueRequest>,
) -> Result<HttpResponse, LoyaltyEngineError> {
    if !claims.is_staff() {
        return Err(LoyaltyEngineError::Forbidden);
    }
    let request = request.into_inner();

    let mut tx = db.begin().await?;
    let points_added = loyalty
        .accrue(&mut tx, request.user_id, request.order_id, request.order_total)
        .await?;
    tx.commit().await?;

    Ok(HttpResponse::Ok().json(AccrueResponse {
        user_id: request.user_id,
        order_id: request.order_id,
        points_added,
    }))
}

/// Configure routes. The whole /api/v1 scope sits behind the JWT middleware;
/// the middleware itself waves through the public auth and registration
/// endpoints.
pub fn configure_routes(cfg: &mut web::ServiceConfig, jwt_secret: &str) {
    cfg.service(
        web::scope("/api/v1")
            .wrap(JwtAuth::new(jwt_secret.to_string()))
            .service(
                web::scope("/auth")
                    .route("/login", web::post().to(login))
                    .route("/password-reset", web::post().to(password_reset))
                    .route("/password-reset/confirm", web::post().to(password_reset_confirm)),
            )
            .route("/customers", web::post().to(create_customer))
            .route("/customers", web::get().to(get_all_customers))
            .route("/customers/{user_id}", web::get().to(get_customer))
            .route("/customers/{user_id}", web::put().to(update_customer))
            .route("/customers/{user_id}", web::delete().to(delete_customer))
            .route("/customers/{user_id}/addresses", web::post().to(add_address))
            .route("/customers/{user_id}/addresses", web::get().to(list_addresses))
            .route("/addresses/{address_id}", web::put().to(update_address))
            .route("/addresses/{address_id}", web::delete().to(delete_address))
            .route(
                "/customers/{user_id}/loyalty/balance",
                web::get().to(loyalty_balance),
            )
            .route(
                "/customers/{user_id}/loyalty/history",
                web::get().to(loyalty_history),
            )
            .route("/loyalty/redeem", web::post().to(redeem))
            .route("/loyalty/accrue", web::post().to(accrue)),
    )
    .route("/health", web::get().to(health_check))
    .route("/metrics", web::get().to(metrics_endpoint));
}
