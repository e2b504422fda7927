use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub loyalty: LoyaltyConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_expiry_hours: i64,
    pub reset_token_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoyaltyConfig {
    pub points_to_real_ratio_default: i64, // fallback when the setting row is absent
    pub points_expiry_days: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotificationConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub sender_name: String,
    pub reset_link_base: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8084)?
            .set_default("server.workers", 4)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.token_expiry_hours", 24)?
            .set_default("auth.reset_token_ttl_hours", 1)?
            .set_default("loyalty.points_to_real_ratio_default", 100)?
            .set_default("loyalty.points_expiry_days", 90)?
            .set_default("notification.base_url", "http://localhost:8090")?
            .set_default("notification.timeout_secs", 10)?
            .set_default("notification.sender_name", "Royal Burger")?
            .set_default("notification.reset_link_base", "http://localhost:5173")?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("LOYALTY_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(jwt_secret) = env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", jwt_secret)?;
        }

        if let Ok(notification_url) = env::var("NOTIFICATION_SERVICE_URL") {
            builder = builder.set_override("notification.base_url", notification_url)?;
        }

        if let Ok(port) = env::var("LOYALTY_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret is required".to_string());
        }

        if self.loyalty.points_to_real_ratio_default <= 0 {
            return Err("Default points-to-real ratio must be positive".to_string());
        }

        if self.loyalty.points_expiry_days <= 0 {
            return Err("Points expiry must be at least one day".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8084,
                workers: 4,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/loyalty".to_string(),
                max_connections: 10,
                min_connections: 2,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                token_expiry_hours: 24,
                reset_token_ttl_hours: 1,
            },
            loyalty: LoyaltyConfig {
                points_to_real_ratio_default: 100,
                points_expiry_days: 90,
            },
            notification: NotificationConfig {
                base_url: "http://localhost:8090".to_string(),
                timeout_secs: 10,
                sender_name: "Royal Burger".to_string(),
                reset_link_base: "http://localhost:5173".to_string(),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let mut config = base_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut config = base_config();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nonpositive_ratio_default_rejected() {
        let mut config = base_config();
        config.loyalty.points_to_real_ratio_default = 0;
        assert!(config.validate().is_err());
    }
}
