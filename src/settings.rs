use crate::errors::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

/// Conversion ratio between loyalty points and currency units.
pub const LOYALTY_POINTS_TO_REAL_RATIO: &str = "LOYALTY_POINTS_TO_REAL_RATIO";

/// Read-only accessor over the `settings` key/value table.
///
/// Reads go through the pool on their own connection, so lookups are safe
/// while the caller holds an open transaction elsewhere.
pub struct SettingsStore {
    pool: Arc<PgPool>,
}

impl SettingsStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        SettingsStore { pool }
    }

    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT value FROM settings WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Typed lookup with a caller-supplied default. An unparseable stored
    /// value falls back to the default as well.
    pub async fn get_i64(&self, key: &str, default: i64) -> Result<i64> {
        match self.get_raw(key).await? {
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(value) => Ok(value),
                Err(_) => {
                    warn!("Setting {} holds non-numeric value {:?}, using default {}", key, raw, default);
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }
}
