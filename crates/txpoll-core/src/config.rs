use crate::error::{Result, TxpollError};
use crate::transaction::DEFAULT_MAX_ID_LEN;
use crate::verdict::VerdictRule;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Attempt budgets above this are allowed but flagged by [`Config::validate`].
pub const MAX_REASONABLE_ATTEMPTS: u32 = 100;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PollConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default)]
    pub endpoint_url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_id_len")]
    pub max_id_len: usize,
    /// Write a pending marker to the endpoint before polling starts.
    #[serde(default)]
    pub pending_record: bool,
}

fn default_interval_ms() -> u64 {
    3000
}

fn default_max_attempts() -> u32 {
    40
}

fn default_max_id_len() -> usize {
    DEFAULT_MAX_ID_LEN
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            endpoint_url: String::new(),
            interval_ms: default_interval_ms(),
            max_attempts: default_max_attempts(),
            max_id_len: default_max_id_len(),
            pending_record: false,
        }
    }
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

// ---------------------------------------------------------------------------
// NotifyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Text for the `update-text` message; `null` disables it.
    #[serde(default = "default_update_text")]
    pub update_text: Option<String>,
    /// Spin count for the `payment-success` cue; omitted means not sent.
    #[serde(default)]
    pub spin: Option<u32>,
    #[serde(default = "default_close_delay_ms")]
    pub close_delay_ms: u64,
    /// Recipient origins allowed to receive notifications. Empty means any.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

fn default_update_text() -> Option<String> {
    Some("Payment successful!".to_string())
}

fn default_close_delay_ms() -> u64 {
    2000
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            update_text: default_update_text(),
            spin: None,
            close_delay_ms: default_close_delay_ms(),
            allowed_origins: Vec::new(),
        }
    }
}

impl NotifyConfig {
    pub fn close_delay(&self) -> Duration {
        Duration::from_millis(self.close_delay_ms)
    }
}

// ---------------------------------------------------------------------------
// MessagesConfig
// ---------------------------------------------------------------------------

/// User-facing text for terminal errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_invalid_id")]
    pub invalid_id: String,
    #[serde(default = "default_timeout")]
    pub timeout: String,
    #[serde(default = "default_failure")]
    pub failure: String,
}

fn default_invalid_id() -> String {
    "Invalid transaction ID".to_string()
}

fn default_timeout() -> String {
    "Verification timeout - please try again".to_string()
}

fn default_failure() -> String {
    "Failed to verify payment".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            invalid_id: default_invalid_id(),
            timeout: default_timeout(),
            failure: default_failure(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub verdict: VerdictRule,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            poll: PollConfig::default(),
            verdict: VerdictRule::default(),
            notify: NotifyConfig::default(),
            messages: MessagesConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(TxpollError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(TxpollError::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let mut push = |level: WarnLevel, message: String| {
            warnings.push(ConfigWarning { level, message })
        };

        // 1. Endpoint must be an http(s) URL
        let endpoint = self.poll.endpoint_url.trim();
        if endpoint.is_empty() {
            push(WarnLevel::Error, "poll.endpoint_url is not set".to_string());
        } else {
            match reqwest::Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => push(
                    WarnLevel::Error,
                    format!("poll.endpoint_url uses unsupported scheme '{}'", url.scheme()),
                ),
                Err(e) => push(
                    WarnLevel::Error,
                    format!("poll.endpoint_url '{endpoint}' is not a valid URL: {e}"),
                ),
            }
        }

        // 2. Budget and interval
        if self.poll.max_attempts == 0 {
            push(
                WarnLevel::Error,
                "poll.max_attempts is 0: every poll would time out immediately".to_string(),
            );
        } else if self.poll.max_attempts > MAX_REASONABLE_ATTEMPTS {
            push(
                WarnLevel::Warning,
                format!(
                    "poll.max_attempts={} (>{MAX_REASONABLE_ATTEMPTS} is unusual)",
                    self.poll.max_attempts
                ),
            );
        }
        if self.poll.interval_ms == 0 {
            push(
                WarnLevel::Warning,
                "poll.interval_ms is 0: the endpoint will be polled back-to-back".to_string(),
            );
        }
        if self.poll.max_id_len == 0 {
            push(
                WarnLevel::Error,
                "poll.max_id_len is 0: no transaction id can pass validation".to_string(),
            );
        }

        // 3. Notifications
        if self.notify.update_text.is_none() && self.notify.spin.is_none() {
            push(
                WarnLevel::Warning,
                "notify has neither update_text nor spin: success sends no message".to_string(),
            );
        }
        if self.notify.allowed_origins.is_empty() {
            push(
                WarnLevel::Warning,
                "notify.allowed_origins is empty: notifications are posted to any origin ('*')"
                    .to_string(),
            );
        }
        for origin in &self.notify.allowed_origins {
            if !is_bare_origin(origin) {
                push(
                    WarnLevel::Error,
                    format!("notify.allowed_origins entry '{origin}' is not a scheme://host[:port] origin"),
                );
            }
        }

        warnings
    }

    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error)
    }
}

fn is_bare_origin(origin: &str) -> bool {
    match reqwest::Url::parse(origin) {
        Ok(url) => url.origin().ascii_serialization() == origin.trim_end_matches('/'),
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
