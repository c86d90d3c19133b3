//! Bootstrap configuration loading
//!
//! Settings that must be known before the database opens live in a TOML
//! file. Resolution priority for each value:
//! 1. Command-line argument (applied by the binary)
//! 2. Environment variable (`MTDJ_*`)
//! 3. TOML config file
//! 4. Compiled default

use crate::crypto::TokenCipher;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT: u16 = 8470;
pub const CONFIG_FILE_ENV: &str = "MTDJ_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of background worker tasks
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Directory where converted playlist cover images wait for export
    #[serde(default = "default_image_upload_path")]
    pub image_upload_path: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub provider: ProviderConfig,

    #[serde(default)]
    pub encryption: EncryptionConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Music provider (Spotify) application credentials and endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_max_top_artists")]
    pub max_top_artists: usize,
    #[serde(default = "default_auth_state_length")]
    pub auth_state_length: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            api_url: default_api_url(),
            accounts_url: default_accounts_url(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_top_artists: default_max_top_artists(),
            auth_state_length: default_auth_state_length(),
        }
    }
}

/// Token encryption key (base64 of 32 bytes)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    #[serde(default)]
    pub key: Option<String>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            port: default_port(),
            worker_count: default_worker_count(),
            image_upload_path: default_image_upload_path(),
            logging: LoggingConfig::default(),
            provider: ProviderConfig::default(),
            encryption: EncryptionConfig::default(),
        }
    }
}

fn default_database_path() -> PathBuf {
    default_data_folder().join("moodytunes.db")
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_worker_count() -> usize {
    4
}

fn default_image_upload_path() -> PathBuf {
    std::env::temp_dir()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redirect_uri() -> String {
    "http://127.0.0.1:8470/spotify/callback".to_string()
}

fn default_api_url() -> String {
    "https://api.spotify.com/v1".to_string()
}

fn default_accounts_url() -> String {
    "https://accounts.spotify.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_top_artists() -> usize {
    50
}

fn default_auth_state_length() -> usize {
    48
}

impl TomlConfig {
    /// Load configuration: explicit path, then `MTDJ_CONFIG`, then the
    /// platform config file. A missing file yields compiled defaults.
    /// Environment overrides are applied last.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from))
            .or_else(|| default_config_file().filter(|p| p.exists()));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Parse a TOML file; the file must exist
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Overlay `MTDJ_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(value) = env_value("MTDJ_DATABASE_PATH") {
            self.database_path = PathBuf::from(value);
        }
        if let Some(value) = env_value("MTDJ_BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let Some(value) = env_value("MTDJ_PORT") {
            self.port = value
                .parse()
                .map_err(|_| Error::Config(format!("MTDJ_PORT is not a port: {}", value)))?;
        }
        if let Some(value) = env_value("MTDJ_WORKER_COUNT") {
            self.worker_count = value.parse().map_err(|_| {
                Error::Config(format!("MTDJ_WORKER_COUNT is not a number: {}", value))
            })?;
        }
        if let Some(value) = env_value("MTDJ_IMAGE_FILE_UPLOAD_PATH") {
            self.image_upload_path = PathBuf::from(value);
        }
        if let Some(value) = env_value("MTDJ_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = env_value("MTDJ_SPOTIFY_CLIENT_ID") {
            self.provider.client_id = value;
        }
        if let Some(value) = env_value("MTDJ_SPOTIFY_SECRET_KEY") {
            self.provider.client_secret = value;
        }
        if let Some(value) = env_value("MTDJ_SPOTIFY_REDIRECT_URI") {
            self.provider.redirect_uri = value;
        }
        if let Some(value) = env_value("MTDJ_SPOTIFY_API_URL") {
            self.provider.api_url = value;
        }
        if let Some(value) = env_value("MTDJ_SPOTIFY_ACCOUNTS_URL") {
            self.provider.accounts_url = value;
        }
        if let Some(value) = env_value("MTDJ_ENCRYPTION_KEY") {
            self.encryption.key = Some(value);
        }
        Ok(())
    }

    /// Build the token cipher; the key is required
    pub fn token_cipher(&self) -> Result<TokenCipher> {
        let key = self.encryption.key.as_deref().ok_or_else(|| {
            Error::Config(
                "Encryption key not configured. Set MTDJ_ENCRYPTION_KEY or [encryption] key \
                 to the base64 encoding of 32 random bytes"
                    .to_string(),
            )
        })?;
        TokenCipher::from_base64(key)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Platform config file location (`~/.config/moodytunes/config.toml` on Linux)
fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("moodytunes").join("config.toml"))
}

/// OS-dependent default data folder
fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("moodytunes"))
        .unwrap_or_else(|| PathBuf::from("./moodytunes_data"))
}
