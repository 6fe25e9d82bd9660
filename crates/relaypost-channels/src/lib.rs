//! # RelayPost Channels
//! Outbound senders for broadcast posts.
//!
//! The transport is picked once, at startup, from [`SenderConfig`]; call
//! sites only ever see `Arc<dyn Sender>`.

pub mod simulate;
pub mod telegram;
pub mod webhook;
pub mod whatsapp;

use std::sync::Arc;
use std::time::Duration;

use relaypost_core::config::{SenderChannel, SenderConfig};
use relaypost_core::error::Result;
use relaypost_core::traits::Sender;

pub use simulate::SimulatedSender;
pub use telegram::TelegramSender;
pub use webhook::WebhookSender;
pub use whatsapp::WhatsAppSender;

/// Build the configured sender. `simulate = true` always wins.
pub fn sender_from_config(config: &SenderConfig) -> Result<Arc<dyn Sender>> {
    if config.simulate {
        tracing::info!("Sender: simulate mode, no messages will be delivered");
        return Ok(Arc::new(SimulatedSender::new()));
    }

    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    let sender: Arc<dyn Sender> = match config.channel {
        SenderChannel::WhatsApp => Arc::new(WhatsAppSender::new(config.whatsapp.clone(), timeout)?),
        SenderChannel::Telegram => Arc::new(TelegramSender::new(config.telegram.clone(), timeout)?),
        SenderChannel::Webhook => Arc::new(WebhookSender::new(config.webhook.clone(), timeout)?),
    };
    tracing::info!("Sender: {}", sender.name());
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaypost_core::RelayError;

    #[test]
    fn test_simulate_overrides_channel() {
        let config = SenderConfig {
            simulate: true,
            ..SenderConfig::default()
        };
        let sender = sender_from_config(&config).unwrap();
        assert_eq!(sender.name(), "simulated");
    }

    #[test]
    fn test_unconfigured_whatsapp_is_rejected() {
        let err = sender_from_config(&SenderConfig::default()).err().unwrap();
        assert!(matches!(err, RelayError::Config(_)));
    }

    #[test]
    fn test_telegram_selected() {
        let mut config = SenderConfig {
            channel: SenderChannel::Telegram,
            ..SenderConfig::default()
        };
        config.telegram.bot_token = "123:abc".into();
        let sender = sender_from_config(&config).unwrap();
        assert_eq!(sender.name(), "telegram");
    }
}
