use crate::database::PgTransaction;
use crate::errors::{LoyaltyEngineError, Result};
use crate::ledger::LedgerStore;
use crate::metrics;
use crate::models::{BalanceResponse, HistoryEntryResponse};
use crate::settings::{SettingsStore, LOYALTY_POINTS_TO_REAL_RATIO};
use chrono::{Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{error, info};

/// Whole points earned for an order total at the given ratio (points per
/// currency unit). Fractional points are dropped.
pub fn points_for_total(order_total: Decimal, ratio: i64) -> i64 {
    (order_total / Decimal::from(ratio))
        .floor()
        .to_i64()
        .unwrap_or(0)
}

/// Currency discount granted for redeemed points, rounded to the currency's
/// minor unit (2 decimal places, banker's rounding).
pub fn discount_for_points(points: i64, ratio: i64) -> Decimal {
    (Decimal::from(points) / Decimal::from(ratio)).round_dp(2)
}

pub struct LoyaltyService {
    ledger: Arc<LedgerStore>,
    settings: Arc<SettingsStore>,
    default_ratio: i64,
    points_expiry_days: i64,
}

impl LoyaltyService {
    pub fn new(
        ledger: Arc<LedgerStore>,
        settings: Arc<SettingsStore>,
        default_ratio: i64,
        points_expiry_days: i64,
    ) -> Self {
        LoyaltyService {
            ledger,
            settings,
            default_ratio,
            points_expiry_days,
        }
    }

    async fn conversion_ratio(&self) -> Result<i64> {
        let ratio = self
            .settings
            .get_i64(LOYALTY_POINTS_TO_REAL_RATIO, self.default_ratio)
            .await?;

        if ratio <= 0 {
            return Err(LoyaltyEngineError::InvalidConfiguration(format!(
                "{} must be positive, got {}",
                LOYALTY_POINTS_TO_REAL_RATIO, ratio
            )));
        }

        Ok(ratio)
    }

    /// Credit points for a completed order inside the caller's transaction.
    ///
    /// Creates the loyalty account on first use. When `order_total` is not
    /// supplied it is computed from the order's line items. A total too small
    /// to earn a whole point is a successful no-op. Any storage error
    /// propagates so the caller can roll back the entire order transaction.
    pub async fn accrue(
        &self,
        tx: &mut PgTransaction<'_>,
        user_id: i64,
        order_id: i64,
        order_total: Option<Decimal>,
    ) -> Result<i64> {
        let ratio = self.conversion_ratio().await?;

        self.ledger.ensure_account(tx, user_id).await?;

        let order_total = match order_total {
            Some(total) => total,
            None => self.ledger.order_total(tx, order_id).await?,
        };

        let points_to_add = points_for_total(order_total, ratio);
        if points_to_add <= 0 {
            return Ok(0);
        }

        let expires_at = Utc::now() + Duration::days(self.points_expiry_days);

        self.ledger.credit(tx, user_id, points_to_add).await?;
        self.ledger
            .append_history(
                tx,
                user_id,
                points_to_add,
                &format!("Order #{}", order_id),
                Some(expires_at),
            )
            .await?;

        metrics::POINTS_ACCRUED_TOTAL.inc_by(points_to_add as u64);

        info!(
            "Accrued {} points for user {} on order {} (total {})",
            points_to_add, user_id, order_id, order_total
        );

        Ok(points_to_add)
    }

    /// Redeem points against an order inside the caller's transaction and
    /// return the currency discount earned.
    ///
    /// A non-positive request is "no redemption requested" and yields a zero
    /// discount without touching the ledger. The debit itself is conditional
    /// on the balance, so a concurrent redemption that drains the account
    /// between our read and our write still fails cleanly.
    pub async fn redeem(
        &self,
        tx: &mut PgTransaction<'_>,
        user_id: i64,
        points_to_redeem: i64,
        order_id: i64,
    ) -> Result<Decimal> {
        if points_to_redeem <= 0 {
            return Ok(Decimal::ZERO);
        }

        let current_balance = self.ledger.balance_in_tx(tx, user_id).await?;
        if points_to_redeem > current_balance {
            metrics::REDEMPTIONS_REJECTED_TOTAL.inc();
            return Err(LoyaltyEngineError::InsufficientPoints {
                requested: points_to_redeem,
                available: current_balance,
            });
        }

        let ratio = self.conversion_ratio().await?;

        let debited = self.ledger.debit_checked(tx, user_id, points_to_redeem).await?;
        if !debited {
            // Lost a race against a concurrent redemption on the same account.
            metrics::REDEMPTIONS_REJECTED_TOTAL.inc();
            return Err(LoyaltyEngineError::InsufficientPoints {
                requested: points_to_redeem,
                available: self.ledger.balance_in_tx(tx, user_id).await?,
            });
        }

        self.ledger
            .append_history(
                tx,
                user_id,
                -points_to_redeem,
                &format!("Redemption on order #{}", order_id),
                None,
            )
            .await?;

        let discount_amount = discount_for_points(points_to_redeem, ratio);

        metrics::POINTS_REDEEMED_TOTAL.inc_by(points_to_redeem as u64);

        info!(
            "Redeemed {} points for user {} on order {} (discount {})",
            points_to_redeem, user_id, order_id, discount_amount
        );

        Ok(discount_amount)
    }

    /// Current balance projection. Users who never earned points get zeros,
    /// not an error.
    pub async fn get_balance(&self, user_id: i64) -> Result<BalanceResponse> {
        let account = self.ledger.account(user_id).await?;

        Ok(match account {
            Some(account) => BalanceResponse {
                accumulated_points: account.accumulated_points,
                spent_points: account.spent_points,
                current_balance: account.current_balance(),
            },
            None => BalanceResponse {
                accumulated_points: 0,
                spent_points: 0,
                current_balance: 0,
            },
        })
    }

    /// Movement history, most recent first. A storage failure here degrades
    /// to an empty list so a broken history panel never takes the customer
    /// page down with it; the failure is still logged. Mutating paths never
    /// get this treatment.
    pub async fn get_history(&self, user_id: i64) -> Vec<HistoryEntryResponse> {
        match self.ledger.history(user_id).await {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| HistoryEntryResponse {
                    points: entry.points,
                    reason: entry.reason,
                    date: entry.earned_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                })
                .collect(),
            Err(e) => {
                error!("Failed to fetch loyalty history for user {}: {}", user_id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_points_floor_division() {
        assert_eq!(points_for_total(dec!(250), 100), 2);
        assert_eq!(points_for_total(dec!(99.99), 100), 0);
        assert_eq!(points_for_total(dec!(100), 100), 1);
        assert_eq!(points_for_total(dec!(0), 100), 0);
    }

    #[test]
    fn test_points_ratio_one() {
        assert_eq!(points_for_total(dec!(37.50), 1), 37);
    }

    #[test]
    fn test_points_never_negative_on_zero_total() {
        assert_eq!(points_for_total(Decimal::ZERO, 50), 0);
    }

    #[test]
    fn test_discount_exact() {
        assert_eq!(discount_for_points(100, 100), dec!(1.00));
        assert_eq!(discount_for_points(250, 100), dec!(2.50));
    }

    #[test]
    fn test_discount_rounds_to_minor_unit() {
        // 100 / 3 = 33.333... -> 33.33
        assert_eq!(discount_for_points(100, 3), dec!(33.33));
        // 50 / 7 = 7.142857... -> 7.14
        assert_eq!(discount_for_points(50, 7), dec!(7.14));
    }

    #[test]
    fn test_discount_zero_points() {
        assert_eq!(discount_for_points(0, 100), Decimal::ZERO);
    }
}
