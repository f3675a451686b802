use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{trace, warn};

/// Errors raised while overlaying configuration from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Storage backend configuration
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./monitor.db")
}

/// SMTP settings used by the email channel
#[derive(Clone, PartialEq, serde::Deserialize)]
pub struct MailConfig {
    pub server: Option<String>,
    #[serde(default = "default_mail_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub use_tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub default_sender: Option<String>,
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_mail_port(),
            use_tls: true,
            username: None,
            password: None,
            default_sender: None,
            timeout_secs: default_send_timeout(),
        }
    }
}

/// Twilio credentials used by the SMS channel
#[derive(Clone, PartialEq, serde::Deserialize)]
pub struct TwilioConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default = "default_twilio_api_base")]
    pub api_base: String,
    #[serde(default = "default_send_timeout")]
    pub timeout_secs: u64,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: None,
            auth_token: None,
            phone_number: None,
            api_base: default_twilio_api_base(),
            timeout_secs: default_send_timeout(),
        }
    }
}

impl MailConfig {
    /// Sender address: the configured default sender, else the SMTP username
    pub fn sender(&self) -> Option<String> {
        self.default_sender
            .clone()
            .or_else(|| self.username.clone())
    }
}

#[derive(Clone, Default, PartialEq, serde::Deserialize)]
pub struct SlackConfig {
    pub webhook_url: Option<String>,
}

const REDACTED: &str = "<redacted>";

fn redact(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| REDACTED)
}

impl fmt::Debug for MailConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("use_tls", &self.use_tls)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("default_sender", &self.default_sender)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &redact(&self.auth_token))
            .field("phone_number", &self.phone_number)
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// the webhook URL embeds its token
impl fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackConfig")
            .field("webhook_url", &redact(&self.webhook_url))
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Config {
    /// Seconds between two collection ticks
    #[serde(default = "default_interval")]
    pub metric_collection_interval: u64,

    /// Seconds between two alert evaluation passes
    #[serde(default = "default_interval")]
    pub alert_check_interval: u64,

    /// Seconds between two health check passes; each service additionally
    /// honours its own `check_interval`
    #[serde(default = "default_interval")]
    pub health_check_interval: u64,

    /// Maximum number of health probes in flight at once
    #[serde(default = "default_health_check_concurrency")]
    pub health_check_concurrency: usize,

    #[serde(default = "default_data_retention_days")]
    pub data_retention_days: u32,

    #[serde(default = "default_alert_retention_days")]
    pub alert_retention_days: u32,

    /// Temperature sensors in priority order; the first one present wins
    #[serde(default = "default_temperature_sensors")]
    pub temperature_sensors: Vec<String>,

    /// Number of processes (by CPU) stored per tick, 0 disables snapshots
    #[serde(default = "default_process_snapshot_limit")]
    pub process_snapshot_limit: usize,

    /// Timeout of remote agent fetches in seconds
    #[serde(default = "default_remote_timeout")]
    pub remote_fetch_timeout: u64,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub mail: MailConfig,

    #[serde(default)]
    pub twilio: TwilioConfig,

    #[serde(default)]
    pub slack: SlackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metric_collection_interval: default_interval(),
            alert_check_interval: default_interval(),
            health_check_interval: default_interval(),
            health_check_concurrency: default_health_check_concurrency(),
            data_retention_days: default_data_retention_days(),
            alert_retention_days: default_alert_retention_days(),
            temperature_sensors: default_temperature_sensors(),
            process_snapshot_limit: default_process_snapshot_limit(),
            remote_fetch_timeout: default_remote_timeout(),
            storage: StorageConfig::default(),
            mail: MailConfig::default(),
            twilio: TwilioConfig::default(),
            slack: SlackConfig::default(),
        }
    }
}

fn default_interval() -> u64 {
    60
}

fn default_health_check_concurrency() -> usize {
    8
}

fn default_data_retention_days() -> u32 {
    30
}

fn default_alert_retention_days() -> u32 {
    90
}

fn default_temperature_sensors() -> Vec<String> {
    ["coretemp", "cpu_thermal", "k10temp"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_process_snapshot_limit() -> usize {
    10
}

fn default_remote_timeout() -> u64 {
    5
}

fn default_mail_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

fn default_send_timeout() -> u64 {
    10
}

fn default_twilio_api_base() -> String {
    "https://api.twilio.com".to_string()
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn parse_bool(name: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv { name, value }),
    }
}

impl Config {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.metric_collection_interval.max(1))
    }

    pub fn alert_interval(&self) -> Duration {
        Duration::from_secs(self.alert_check_interval.max(1))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval.max(1))
    }

    /// Overlay values from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary lookup; empty values count as unset
    pub fn apply_env_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("METRIC_COLLECTION_INTERVAL") {
            self.metric_collection_interval = parse_env("METRIC_COLLECTION_INTERVAL", v)?;
        }
        if let Some(v) = get("ALERT_CHECK_INTERVAL") {
            self.alert_check_interval = parse_env("ALERT_CHECK_INTERVAL", v)?;
        }
        if let Some(v) = get("DATA_RETENTION_DAYS") {
            self.data_retention_days = parse_env("DATA_RETENTION_DAYS", v)?;
        }
        if let Some(v) = get("DATABASE_PATH") {
            if matches!(self.storage, StorageConfig::None) {
                warn!("DATABASE_PATH is set but storage backend is 'none', switching to sqlite");
            }
            self.storage = StorageConfig::Sqlite {
                path: PathBuf::from(v),
            };
        }

        if let Some(v) = get("MAIL_SERVER") {
            self.mail.server = Some(v);
        }
        if let Some(v) = get("MAIL_PORT") {
            self.mail.port = parse_env("MAIL_PORT", v)?;
        }
        if let Some(v) = get("MAIL_USE_TLS") {
            self.mail.use_tls = parse_bool("MAIL_USE_TLS", v)?;
        }
        if let Some(v) = get("MAIL_USERNAME") {
            self.mail.username = Some(v);
        }
        if let Some(v) = get("MAIL_PASSWORD") {
            self.mail.password = Some(v);
        }
        if let Some(v) = get("MAIL_DEFAULT_SENDER") {
            self.mail.default_sender = Some(v);
        }

        if let Some(v) = get("TWILIO_ACCOUNT_SID") {
            self.twilio.account_sid = Some(v);
        }
        if let Some(v) = get("TWILIO_AUTH_TOKEN") {
            self.twilio.auth_token = Some(v);
        }
        if let Some(v) = get("TWILIO_PHONE_NUMBER") {
            self.twilio.phone_number = Some(v);
        }

        if let Some(v) = get("SLACK_WEBHOOK_URL") {
            self.slack.webhook_url = Some(v);
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
