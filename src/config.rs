use std::path::PathBuf;

use ::config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::batch::CorruptStatePolicy;

/// Typed view over `appsettings.toml` plus `INVENTORY__*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub batch: BatchSettings,
    pub vision: VisionSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound for JSON request bodies; photos arrive base64-encoded inline.
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    pub upload_dir: PathBuf,
    pub batch_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchSettings {
    pub on_corrupt: CorruptStatePolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionSettings {
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
    /// Falls back to `OPENAI_API_KEY` when unset.
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    pub enabled: bool,
    pub admin_username: String,
    pub admin_password: Option<String>,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("appsettings").required(false))
            .add_source(Environment::with_prefix("INVENTORY").separator("__"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<::config::ConfigBuilder<::config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 5000)?
            .set_default("server.max_payload_bytes", 50 * 1024 * 1024)?
            .set_default("database.url", "inventory.db")?
            .set_default("database.pool_size", 8)?
            .set_default("database.timeout_seconds", 30)?
            .set_default("storage.upload_dir", "uploads")?
            .set_default("storage.batch_file", "batch_config.json")?
            .set_default("batch.on_corrupt", "use_default")?
            .set_default("vision.endpoint", "https://api.openai.com/v1/chat/completions")?
            .set_default("vision.model", "gpt-4o")?
            .set_default("vision.max_tokens", 512)?
            .set_default("auth.enabled", true)?
            .set_default("auth.admin_username", "admin")
    }

    /// Built-in defaults only; no file or environment lookups.
    pub fn defaults() -> Result<Self, ConfigError> {
        Self::builder()?.build()?.try_deserialize()
    }

    pub fn vision_api_key(&self) -> Option<String> {
        self.vision
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
