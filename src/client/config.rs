use crate::shared::config::{ConfigError, SyncConfig};
use std::path::{Path, PathBuf};

/// Default remote store URL
const DEFAULT_REMOTE_URL: &str = "http://127.0.0.1:3000/api";

/// File name of the queue database inside the data directory
const QUEUE_DB_FILE: &str = "offline_queue.db";

pub const REMOTE_URL_VAR: &str = "BOOKING_SYNC_REMOTE_URL";
pub const DB_PATH_VAR: &str = "BOOKING_SYNC_DB_PATH";
pub const CONFIG_FILE_VAR: &str = "BOOKING_SYNC_CONFIG";
pub const TOKEN_VAR: &str = "BOOKING_SYNC_TOKEN";

/// Process-level configuration of one context.
#[derive(Debug, Clone)]
pub struct Config {
    remote_url: String,
    db_path: PathBuf,
    token: Option<String>,
    sync: SyncConfig,
}

impl Config {
    pub fn new(remote_url: impl Into<String>, db_path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let remote_url = remote_url.into();
        validate_url(&remote_url)?;
        Ok(Self {
            remote_url,
            db_path: db_path.into(),
            token: None,
            sync: SyncConfig::default(),
        })
    }

    /// Read the configuration from the environment
    ///
    /// `BOOKING_SYNC_CONFIG` may name a TOML file with synchronization
    /// tunables; unset variables fall back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let remote_url =
            std::env::var(REMOTE_URL_VAR).unwrap_or_else(|_| DEFAULT_REMOTE_URL.to_string());
        let db_path = match std::env::var(DB_PATH_VAR) {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_db_path()?,
        };

        let mut config = Self::new(remote_url, db_path)?;
        config.token = std::env::var(TOKEN_VAR).ok().filter(|t| !t.is_empty());

        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            config.sync = load_sync_config(Path::new(&path))?;
        }
        Ok(config)
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }
}

/// `<platform data dir>/booking-sync/offline_queue.db`
pub fn default_db_path() -> Result<PathBuf, ConfigError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("booking-sync").join(QUEUE_DB_FILE))
        .ok_or(ConfigError::MissingValue("platform data directory"))
}

fn load_sync_config(path: &Path) -> Result<SyncConfig, ConfigError> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    SyncConfig::from_toml_str(&source)
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidUrl(url.to_string())),
    }
}
