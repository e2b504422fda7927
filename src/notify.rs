use crate::errors::{LoyaltyEngineError, Result};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct EmailRequest {
    to: String,
    subject: String,
    template: String,
    context: serde_json::Value,
}

/// Client for the platform's notification service. Call sites treat sends as
/// fire-and-forget: a registration or password reset never fails because the
/// mail could not go out.
pub struct NotificationClient {
    base_url: String,
    sender_name: String,
    client: Client,
}

impl NotificationClient {
    pub fn new(base_url: String, timeout_secs: u64, sender_name: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");

        NotificationClient {
            base_url,
            sender_name,
            client,
        }
    }

    async fn send_email(&self, request: EmailRequest) -> Result<()> {
        let url = format!("{}/api/v1/notifications/email", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach notification service: {}", e);
                LoyaltyEngineError::Notification(format!("Email request failed: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(LoyaltyEngineError::Notification(format!(
                "Email send failed with status {}: {}",
                status, error_text
            )));
        }

        Ok(())
    }

    pub async fn send_welcome(&self, to: &str, full_name: &str) -> Result<()> {
        self.send_email(EmailRequest {
            to: to.to_string(),
            subject: format!("Welcome to {}!", self.sender_name),
            template: "welcome".to_string(),
            context: serde_json::json!({ "full_name": full_name }),
        })
        .await?;

        info!("Sent welcome email to {}", to);
        Ok(())
    }

    pub async fn send_password_reset(&self, to: &str, full_name: &str, reset_link: &str) -> Result<()> {
        self.send_email(EmailRequest {
            to: to.to_string(),
            subject: format!("Password recovery - {}", self.sender_name),
            template: "password_reset".to_string(),
            context: serde_json::json!({
                "full_name": full_name,
                "reset_link": reset_link,
            }),
        })
        .await?;

        info!("Sent password reset email to {}", to);
        Ok(())
    }
}
