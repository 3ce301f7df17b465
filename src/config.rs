//! Configuration loader and validator for the cross-post daemon.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::model::Frequency;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub wpcom: Wpcom,
    pub sync: Sync,
    pub schedule: Schedule,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    pub poll_interval_ms: u64,
    pub sync_lock_stale_secs: u64,
}

/// Remote API endpoints and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Wpcom {
    pub api_base: String,
    pub token_url: String,
    /// Redirect URI registered with the remote app; sent verbatim in the
    /// token exchange.
    pub redirect_uri: String,
    pub user_agent: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

/// Sync engine settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sync {
    /// Email of the local user cross-posts are attributed to.
    pub author_email: String,
    /// When false (the default), a run stops at the first post examined,
    /// created or duplicate. When true the whole batch is processed.
    pub process_full_batch: bool,
}

/// Recurring-trigger settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub enabled: bool,
    pub frequency: String,
    pub initial_delay_secs: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// Parsed schedule frequency. Validation guarantees this succeeds for a
    /// loaded config.
    pub fn frequency(&self) -> Frequency {
        Frequency::parse(&self.schedule.frequency).unwrap_or(Frequency::Daily)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.poll_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.poll_interval_ms must be > 0"));
    }
    if cfg.app.sync_lock_stale_secs == 0 {
        return Err(ConfigError::Invalid("app.sync_lock_stale_secs must be > 0"));
    }

    if cfg.wpcom.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("wpcom.api_base must be non-empty"));
    }
    if cfg.wpcom.token_url.trim().is_empty() {
        return Err(ConfigError::Invalid("wpcom.token_url must be non-empty"));
    }
    if cfg.wpcom.redirect_uri.trim().is_empty() {
        return Err(ConfigError::Invalid("wpcom.redirect_uri must be non-empty"));
    }
    if cfg.wpcom.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("wpcom.user_agent must be non-empty"));
    }

    if cfg.sync.author_email.trim().is_empty() {
        return Err(ConfigError::Invalid("sync.author_email must be non-empty"));
    }

    if Frequency::parse(&cfg.schedule.frequency).is_none() {
        return Err(ConfigError::Invalid(
            "schedule.frequency must be one of: hourly, twicedaily, daily",
        ));
    }

    Ok(())
}

/// Example YAML document, also used by config tests.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  poll_interval_ms: 30000
  sync_lock_stale_secs: 3600

wpcom:
  api_base: "https://public-api.wordpress.com/rest/v1.1/"
  token_url: "https://public-api.wordpress.com/oauth2/token"
  redirect_uri: "https://blog.example.org/settings/crosspost"
  user_agent: "crosspostd/0.1"
  connect_timeout_ms: 10000
  request_timeout_ms: 30000

sync:
  author_email: "admin@blog.example.org"
  process_full_batch: false

schedule:
  enabled: true
  frequency: "daily"
  initial_delay_secs: 3600
"#
}
