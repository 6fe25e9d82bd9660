//! RelayPost configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sender: SenderConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl RelayConfig {
    /// Load config from the default path (~/.relaypost/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelayError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the given path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the RelayPost home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relaypost")
    }

    /// Secrets may come from the environment instead of the file.
    pub fn apply_env_overrides(&mut self) {
        if let Some(token) = env_nonempty("RELAYPOST_WHATSAPP_TOKEN") {
            self.sender.whatsapp.access_token = token;
        }
        if let Some(token) = env_nonempty("RELAYPOST_TELEGRAM_BOT_TOKEN") {
            self.sender.telegram.bot_token = token;
        }
        if let Some(code) = env_nonempty("RELAYPOST_PAIRING_CODE") {
            self.gateway.pairing_code = Some(code);
        }
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn bool_true() -> bool { true }

/// Dispatch scheduler configuration.
///
/// Values are taken as written; the scheduler applies its own floors and
/// ceilings when it derives runtime settings from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
    /// Destinations used when an item carries no targets of its own.
    #[serde(default)]
    pub default_targets: Vec<String>,
    /// Dry-run flag applied to scheduled (timer) cycles.
    #[serde(default)]
    pub dry_run: bool,
    /// Run cycles on a dedicated worker instead of the caller's task.
    #[serde(default)]
    pub queued_dispatch: bool,
}

fn default_interval_secs() -> u64 { 15 * 60 }
fn default_batch_size() -> usize { 10 }
fn default_lease_secs() -> u64 { 10 * 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            default_targets: vec![],
            dry_run: false,
            queued_dispatch: false,
        }
    }
}

/// Which persistence engine backs the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

/// Queue store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.relaypost/queue.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// Outbound transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderChannel {
    #[default]
    WhatsApp,
    Telegram,
    Webhook,
}

/// Outbound sender configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    #[serde(default)]
    pub channel: SenderChannel,
    /// Never deliver; every send reports success.
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_send_timeout() -> u64 { 15 }

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            channel: SenderChannel::default(),
            simulate: false,
            timeout_secs: default_send_timeout(),
            whatsapp: WhatsAppConfig::default(),
            telegram: TelegramConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

/// WhatsApp Business Cloud API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub phone_number_id: String,
    #[serde(default = "default_graph_api_base")]
    pub api_base: String,
}

fn default_graph_api_base() -> String { "https://graph.facebook.com/v21.0".into() }

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            phone_number_id: String::new(),
            api_base: default_graph_api_base(),
        }
    }
}

/// Telegram Bot API credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

fn default_telegram_api_base() -> String { "https://api.telegram.org".into() }

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
        }
    }
}

/// Generic HTTP webhook: one JSON POST per destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// Operator API server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    /// When set, `/api/v1/*` requires this code.
    #[serde(default)]
    pub pairing_code: Option<String>,
}

fn default_port() -> u16 { 3579 }
fn default_host() -> String { "127.0.0.1".into() }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            pairing_code: None,
        }
    }
}
