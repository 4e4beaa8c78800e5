use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides `api.base_url`.
pub const API_URL_ENV: &str = "WF_API_URL";

/// Top-level configuration loaded from `~/.wayfinder/config.toml`.
///
/// Every section is optional in the file; missing keys fall back to the
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logs: LogsConfig,
}

impl Config {
    /// Load config from `~/.wayfinder/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::read(&path)?
        } else {
            Config::default()
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let mut cfg = Self::read(&path)?;
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn read(path: &PathBuf) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api.validate()?;
        self.sync.validate()?;
        if self.logs.max_per_step == 0 {
            return Err(ConfigError::Validation(
                "logs.max_per_step must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".wayfinder")
            .join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `human` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Derived from `base_url` (http -> ws) when unset.
    #[serde(default)]
    pub ws_base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            ws_base_url: None,
            request_timeout_secs: default_request_timeout_secs(),
            user_id: None,
        }
    }
}

impl ApiConfig {
    /// Base URL for the event channel.
    pub fn ws_base(&self) -> String {
        if let Some(ws) = &self.ws_base_url {
            return ws.trim_end_matches('/').to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "api.base_url is not a valid URL: {}",
                self.base_url
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "api.request_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8000".into()
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// Timing knobs of the reconciliation loop and the status poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_poll_initial_secs")]
    pub poll_initial_secs: u64,
    #[serde(default = "default_poll_max_secs")]
    pub poll_max_secs: u64,
    #[serde(default = "default_poll_backoff_factor")]
    pub poll_backoff_factor: u32,
    #[serde(default = "default_silence_threshold_secs")]
    pub silence_threshold_secs: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
    /// A `failed` task updated this recently may be mid-retry.
    #[serde(default = "default_retry_window_secs")]
    pub retry_window_secs: u64,
    #[serde(default = "default_cancel_refresh_delay_ms")]
    pub cancel_refresh_delay_ms: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
    #[serde(default = "default_log_fetch_limit")]
    pub log_fetch_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_initial_secs: default_poll_initial_secs(),
            poll_max_secs: default_poll_max_secs(),
            poll_backoff_factor: default_poll_backoff_factor(),
            silence_threshold_secs: default_silence_threshold_secs(),
            health_check_interval_secs: default_health_check_interval_secs(),
            retry_window_secs: default_retry_window_secs(),
            cancel_refresh_delay_ms: default_cancel_refresh_delay_ms(),
            reconnect_max_secs: default_reconnect_max_secs(),
            log_fetch_limit: default_log_fetch_limit(),
        }
    }
}

impl SyncConfig {
    pub fn poll_initial(&self) -> Duration {
        Duration::from_secs(self.poll_initial_secs)
    }
    pub fn poll_max(&self) -> Duration {
        Duration::from_secs(self.poll_max_secs)
    }
    pub fn silence_threshold(&self) -> Duration {
        Duration::from_secs(self.silence_threshold_secs)
    }
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }
    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }
    pub fn cancel_refresh_delay(&self) -> Duration {
        Duration::from_millis(self.cancel_refresh_delay_ms)
    }
    pub fn reconnect_max(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("sync.poll_initial_secs", self.poll_initial_secs),
            ("sync.poll_max_secs", self.poll_max_secs),
            ("sync.silence_threshold_secs", self.silence_threshold_secs),
            ("sync.health_check_interval_secs", self.health_check_interval_secs),
            ("sync.reconnect_max_secs", self.reconnect_max_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{name} must be greater than 0"
                )));
            }
        }
        if self.poll_initial_secs > self.poll_max_secs {
            return Err(ConfigError::Validation(format!(
                "sync.poll_initial_secs ({}) exceeds sync.poll_max_secs ({})",
                self.poll_initial_secs, self.poll_max_secs
            )));
        }
        if self.poll_backoff_factor < 1 {
            return Err(ConfigError::Validation(
                "sync.poll_backoff_factor must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_poll_initial_secs() -> u64 {
    30
}
fn default_poll_max_secs() -> u64 {
    120
}
fn default_poll_backoff_factor() -> u32 {
    2
}
fn default_silence_threshold_secs() -> u64 {
    180
}
fn default_health_check_interval_secs() -> u64 {
    30
}
fn default_retry_window_secs() -> u64 {
    10
}
fn default_cancel_refresh_delay_ms() -> u64 {
    1_000
}
fn default_reconnect_max_secs() -> u64 {
    16
}
fn default_log_fetch_limit() -> u32 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_max_per_step")]
    pub max_per_step: usize,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            max_per_step: default_max_per_step(),
        }
    }
}

fn default_max_per_step() -> usize {
    100
}
