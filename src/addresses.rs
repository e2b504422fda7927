use crate::errors::{LoyaltyEngineError, Result};
use crate::models::{Address, CreateAddressRequest, UpdateAddressRequest};
use chrono::Utc;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Delivery-address CRUD. Ownership checks (address belongs to the
/// authenticated user) happen in the handlers.
pub struct AddressService {
    pool: Arc<PgPool>,
}

impl AddressService {
    pub fn new(pool: Arc<PgPool>) -> Self {
        AddressService { pool }
    }

    pub async fn create(&self, user_id: i64, request: CreateAddressRequest) -> Result<Address> {
        validator::Validate::validate(&request)
            .map_err(|e| LoyaltyEngineError::Validation(e.to_string()))?;

        let address = sqlx::query_as::<_, Address>(
            r#"
            INSERT INTO addresses (user_id, street, number, complement, neighborhood, city, state, zip_code, is_default, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, user_id, street, number, complement, neighborhood, city, state, zip_code, is_default, created_at
            "#,
        )
        .bind(user_id)
        .bind(&request.street)
        .bind(&request.number)
        .bind(&request.complement)
        .bind(&request.neighborhood)
        .bind(&request.city)
        .bind(&request.state)
        .bind(&request.zip_code)
        .bind(request.is_default.unwrap_or(false))
        .bind(Utc::now())
        .fetch_one(&*self.pool)
        .await?;

        info!("Created address {} for user {}", address.id, user_id);

        Ok(address)
    }

    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<Address>> {
        let addresses = sqlx::query_as::<_, Address>(
            r#"
            SELECT id, user_id, street, number, complement, neighborhood, city, state, zip_code, is_default, created_at
            FROM addresses
            WHERE user_id = $1
            ORDER BY is_default DESC, created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(addresses)
    }

    pub async fn get(&self, address_id: i64) -> Result<Address> {
        let address = sqlx::query_as::<_, Address>(
            r#"
            SELECT id, user_id, street, number, complement, neighborhood, city, state, zip_code, is_default, created_at
            FROM addresses
            WHERE id = $1
            "#,
        )
        .bind(address_id)
        .fetch_optional(&*self.pool)
        .await?
        .ok_or(LoyaltyEngineError::AddressNotFound(address_id))?;

        Ok(address)
    }

    pub async fn update(&self, address_id: i64, request: UpdateAddressRequest) -> Result<Address> {
        let result = sqlx::query(
            r#"
            UPDATE addresses
            SET street = COALESCE($1, street),
                number = COALESCE($2, number),
                complement = COALESCE($3, complement),
                neighborhood = COALESCE($4, neighborhood),
                city = COALESCE($5, city),
                state = COALESCE($6, state),
                zip_code = COALESCE($7, zip_code),
                is_default = COALESCE($8, is_default)
            WHERE id = $9
            "#,
        )
        .bind(&request.street)
        .bind(&request.number)
        .bind(&request.complement)
        .bind(&request.neighborhood)
        .bind(&request.city)
        .bind(&request.state)
        .bind(&request.zip_code)
        .bind(request.is_default)
        .bind(address_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LoyaltyEngineError::AddressNotFound(address_id));
        }

        self.get(address_id).await
    }

    pub async fn delete(&self, address_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM addresses WHERE id = $1
            "#,
        )
        .bind(address_id)
        .execute(&*self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(LoyaltyEngineError::AddressNotFound(address_id));
        }

        info!("Deleted address {}", address_id);
        Ok(())
    }
}
