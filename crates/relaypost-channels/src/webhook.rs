//! Generic HTTP webhook sender: POST with JSON body, one request per destination.

use std::time::Duration;

use async_trait::async_trait;
use relaypost_core::config::WebhookConfig;
use relaypost_core::error::{RelayError, Result};
use relaypost_core::traits::Sender;
use relaypost_core::types::SendOutcome;

pub struct WebhookSender {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(config: WebhookConfig, timeout: Duration) -> Result<Self> {
        if config.url.is_empty() {
            return Err(RelayError::Config("Webhook url not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Channel(format!("Webhook client init failed: {e}")))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl Sender for WebhookSender {
    fn name(&self) -> &str { "webhook" }

    async fn send_text(&self, destination: &str, message: &str) -> Result<SendOutcome> {
        let mut req = self.client.post(&self.config.url).json(&serde_json::json!({
            "destination": destination,
            "message": message,
        }));
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Webhook send failed: {e}")))?;

        if resp.status().is_success() {
            tracing::debug!("Webhook delivered to {} for {}", self.config.url, destination);
            Ok(SendOutcome::delivered())
        } else {
            Ok(SendOutcome::rejected(format!("Webhook error {}", resp.status())))
        }
    }
}
