//! Prometheus metrics for the loyalty ledger.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, Encoder, IntCounter, TextEncoder,
};

lazy_static! {
    /// Total points credited through accrual.
    pub static ref POINTS_ACCRUED_TOTAL: IntCounter = register_int_counter!(
        "loyalty_points_accrued_total",
        "Total loyalty points credited through accrual"
    )
    .expect("metric registration");

    /// Total points debited through redemption.
    pub static ref POINTS_REDEEMED_TOTAL: IntCounter = register_int_counter!(
        "loyalty_points_redeemed_total",
        "Total loyalty points debited through redemption"
    )
    .expect("metric registration");

    /// Redemptions rejected for insufficient balance.
    pub static ref REDEMPTIONS_REJECTED_TOTAL: IntCounter = register_int_counter!(
        "loyalty_redemptions_rejected_total",
        "Redemption attempts rejected for insufficient balance"
    )
    .expect("metric registration");
}

/// Render all registered metrics in Prometheus text format.
pub fn metrics_handler() -> prometheus::Result<String> {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = POINTS_ACCRUED_TOTAL.get();
        POINTS_ACCRUED_TOTAL.inc_by(5);
        assert_eq!(POINTS_ACCRUED_TOTAL.get(), before + 5);
    }

    #[test]
    fn test_metrics_render() {
        REDEMPTIONS_REJECTED_TOTAL.inc();
        let body = metrics_handler().unwrap();
        assert!(body.contains("loyalty_redemptions_rejected_total"));
    }
}
