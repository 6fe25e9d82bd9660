//! Telegram Bot API sender: `sendMessage` to a chat id.

use std::time::Duration;

use async_trait::async_trait;
use relaypost_core::config::TelegramConfig;
use relaypost_core::error::{RelayError, Result};
use relaypost_core::traits::Sender;
use relaypost_core::types::SendOutcome;

pub struct TelegramSender {
    config: TelegramConfig,
    client: reqwest::Client,
}

impl TelegramSender {
    pub fn new(config: TelegramConfig, timeout: Duration) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(RelayError::Config("Telegram bot_token not configured".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Channel(format!("Telegram client init failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }
}

#[async_trait]
impl Sender for TelegramSender {
    fn name(&self) -> &str { "telegram" }

    async fn send_text(&self, destination: &str, message: &str) -> Result<SendOutcome> {
        let response = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&serde_json::json!({
                "chat_id": destination,
                "text": message,
            }))
            .send()
            .await
            .map_err(|e| RelayError::Channel(format!("Telegram sendMessage failed: {e}")))?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or_default();
        if status.is_success() && body["ok"].as_bool().unwrap_or(false) {
            tracing::debug!("Telegram message sent → {}", destination);
            Ok(SendOutcome::delivered())
        } else {
            let description = body["description"].as_str().unwrap_or("no description");
            Ok(SendOutcome::rejected(format!(
                "Telegram API error {status}: {description}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sender_for(server: &MockServer) -> TelegramSender {
        let config = TelegramConfig {
            bot_token: "42:xyz".into(),
            api_base: server.uri(),
        };
        TelegramSender::new(config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot42:xyz/sendMessage"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})),
            )
            .mount(&server)
            .await;

        let outcome = sender_for(&server).send_text("-1001", "hi").await.unwrap();
        assert_eq!(outcome, SendOutcome::delivered());
    }

    #[tokio::test]
    async fn test_chat_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                serde_json::json!({"ok": false, "description": "Bad Request: chat not found"}),
            ))
            .mount(&server)
            .await;

        let outcome = sender_for(&server).send_text("-1", "hi").await.unwrap();
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("chat not found"));
    }
}
