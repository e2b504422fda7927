use crate::database::PgTransaction;
use crate::errors::Result;
use crate::models::{LoyaltyAccount, LoyaltyHistoryEntry};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::sync::Arc;

/// Transactional accessor over the loyalty balance row and the append-only
/// history log.
///
/// Every mutating operation takes the caller's open transaction and never
/// commits or rolls back itself; accrual and redemption land atomically with
/// whatever order work the caller has in flight.
pub struct LedgerStore {
    pool: Arc<PgPool>,
}

impl LedgerStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        LedgerStore { pool }
    }

    /// Insert-if-absent for the account row. Existing balances are never
    /// touched, so the call is idempotent.
    pub async fn ensure_account(&self, tx: &mut PgTransaction<'_>, user_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_accounts (user_id, accumulated_points, spent_points)
            VALUES ($1, 0, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Atomic increment of `accumulated_points`.
    pub async fn credit(&self, tx: &mut PgTransaction<'_>, user_id: i64, points: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET accumulated_points = accumulated_points + $1
            WHERE user_id = $2
            "#,
        )
        .bind(points)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Conditional debit: increments `spent_points` only while the spendable
    /// balance covers it. The check and the write are a single statement, so
    /// two competing redemptions serialize on the row and at most one can
    /// overdraw. Returns false when the balance did not cover the debit.
    pub async fn debit_checked(
        &self,
        tx: &mut PgTransaction<'_>,
        user_id: i64,
        points: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE loyalty_accounts
            SET spent_points = spent_points + $1
            WHERE user_id = $2 AND accumulated_points - spent_points >= $1
            "#,
        )
        .bind(points)
        .bind(user_id)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Append one immutable history entry. `expires_at` is set only for
    /// earning entries; redemptions never expire.
    pub async fn append_history(
        &self,
        tx: &mut PgTransaction<'_>,
        user_id: i64,
        points: i64,
        reason: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO loyalty_history (user_id, points, reason, earned_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user_id)
        .bind(points)
        .bind(reason)
        .bind(Utc::now())
        .bind(expires_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Sum of `quantity * unit_price` over an order's line items, read inside
    /// the caller's transaction. Orders without items total zero.
    pub async fn order_total(&self, tx: &mut PgTransaction<'_>, order_id: i64) -> Result<Decimal> {
        let row: (Option<Decimal>,) = sqlx::query_as(
            r#"
            SELECT SUM(quantity * unit_price) FROM order_items WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.0.unwrap_or(Decimal::ZERO))
    }

    /// Point-in-time spendable balance inside the caller's transaction.
    /// A user with no account row has a balance of zero.
    pub async fn balance_in_tx(&self, tx: &mut PgTransaction<'_>, user_id: i64) -> Result<i64> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT accumulated_points - spent_points
            FROM loyalty_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|(balance,)| balance).unwrap_or(0))
    }

    pub async fn account(&self, user_id: i64) -> Result<Option<LoyaltyAccount>> {
        let account = sqlx::query_as::<_, LoyaltyAccount>(
            r#"
            SELECT user_id, accumulated_points, spent_points
            FROM loyalty_accounts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(account)
    }

    /// Full movement log for a user, most recent first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<LoyaltyHistoryEntry>> {
        let entries = sqlx::query_as::<_, LoyaltyHistoryEntry>(
            r#"
            SELECT id, user_id, points, reason, earned_at, expires_at
            FROM loyalty_history
            WHERE user_id = $1
            ORDER BY earned_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(entries)
    }
}
