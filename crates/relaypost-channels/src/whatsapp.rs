//! WhatsApp Business Cloud API sender.
//!
//! Uses the official WhatsApp Business Platform (Cloud API) for messaging.
//! Requires: Access Token + Phone Number ID from Meta Business Suite.

use std::time::Duration;

use async_trait::async_trait;
use relaypost_core::config::WhatsAppConfig;
use relaypost_core::error::{RelayError, Result};
use relaypost_core::traits::Sender;
use relaypost_core::types::SendOutcome;

/// Sends text messages through the Graph API `/messages` endpoint.
pub struct WhatsAppSender {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppSender {
    pub fn new(config: WhatsAppConfig, timeout: Duration) -> Result<Self> {
        if config.access_token.is_empty() {
            return Err(RelayError::Config(
                "WhatsApp access_token not configured".into(),
            ));
        }
        if config.phone_number_id.is_empty() {
            return Err(RelayError::Config(
                "WhatsApp phone_number_id not configured".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Channel(format!("WhatsApp client init failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.phone_number_id
        )
    }
}

#[async_trait]
impl Sender for WhatsAppSender {
    fn name(&self) -> &str { "whatsapp" }

    async fn send_text(&self, destination: &str, message: &str) -> Result<SendOutcome> {
        let body = serde_json::json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": destination,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": message
            }
        });

        let response = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("WhatsApp API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Ok(SendOutcome::rejected(format!(
                "WhatsApp API error {status}: {error_text}"
            )));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::Channel(format!("Invalid WhatsApp response: {e}")))?;
        let msg_id = result["messages"][0]["id"].as_str().unwrap_or("unknown");

        tracing::debug!("WhatsApp message sent: {} → {}", msg_id, destination);
        Ok(SendOutcome::delivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> WhatsAppConfig {
        WhatsAppConfig {
            access_token: "token-1".into(),
            phone_number_id: "555".into(),
            api_base: server.uri(),
        }
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/555/messages"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"messages": [{"id": "wamid.1"}]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let sender = WhatsAppSender::new(config_for(&server), Duration::from_secs(5)).unwrap();
        let outcome = sender.send_text("grp-a", "hello").await.unwrap();
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn test_api_error_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad recipient"))
            .mount(&server)
            .await;

        let sender = WhatsAppSender::new(config_for(&server), Duration::from_secs(5)).unwrap();
        let outcome = sender.send_text("grp-x", "hello").await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("bad recipient"));
    }

    #[test]
    fn test_missing_phone_number_id() {
        let config = WhatsAppConfig {
            access_token: "t".into(),
            ..WhatsAppConfig::default()
        };
        assert!(WhatsAppSender::new(config, Duration::from_secs(1)).is_err());
    }
}
