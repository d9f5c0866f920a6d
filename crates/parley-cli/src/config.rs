//! `parley.toml` loading.
//!
//! Every section is optional; missing keys take the defaults below. The
//! bot token may come from the environment instead of the file.

use parley_core::{ParleyError, ParleyResult, DEFAULT_DELIMITER};
use parley_gateway::DEFAULT_REVERT_COMMANDS;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable consulted when `[telegram].token` is absent.
pub const TOKEN_ENV: &str = "PARLEY_TELEGRAM_TOKEN";

#[derive(Debug, Deserialize)]
pub struct ParleyConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub mode: TransportMode,
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            mode: TransportMode::default(),
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// How updates reach the bot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Long-poll `getUpdates`.
    #[default]
    Polling,
    /// Receive pushes on `POST /telegram/webhook`.
    Webhook,
}

#[derive(Debug, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_revert_commands")]
    pub revert_commands: Vec<String>,
    #[serde(default = "default_delimiter")]
    pub callback_delimiter: char,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            revert_commands: default_revert_commands(),
            callback_delimiter: default_delimiter(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Where conversation state lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON file per session under `data_dir/sessions`.
    #[default]
    File,
    /// Process memory; lost on restart.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value.
    #[serde(default)]
    pub secret: Option<String>,
    /// Public URL registered with `setWebhook` at startup, if set.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret: None,
            webhook_url: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_poll_timeout() -> u64 {
    30
}
fn default_timeout() -> u64 {
    30
}
fn default_revert_commands() -> Vec<String> {
    DEFAULT_REVERT_COMMANDS.into_iter().map(String::from).collect()
}
fn default_delimiter() -> char {
    DEFAULT_DELIMITER
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8443
}

impl ParleyConfig {
    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> ParleyResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ParleyError::Config(format!(
                "Failed to read config '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content).map_err(|e| {
            ParleyError::Config(format!("Failed to parse config '{}': {}", path.display(), e))
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.dispatch.timeout_secs == 0 {
            return Err("dispatch.timeout_secs must be positive".into());
        }
        if config.dispatch.callback_delimiter.is_alphanumeric() {
            return Err("dispatch.callback_delimiter must not be a letter or digit".into());
        }
        Ok(config)
    }

    /// Bot token from the file, else from [`TOKEN_ENV`].
    pub fn telegram_token(&self) -> ParleyResult<String> {
        self.telegram
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(TOKEN_ENV).ok().filter(|t| !t.is_empty()))
            .ok_or_else(|| {
                ParleyError::Config(format!(
                    "no Telegram token: set [telegram].token or {TOKEN_ENV}"
                ))
            })
    }
}
