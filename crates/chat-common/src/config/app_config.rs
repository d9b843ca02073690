//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app: AppSettings,
    pub api: ApiConfig,
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub sync: SyncSettings,
    pub reconnect: ReconnectConfig,
}

/// General application settings
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub name: String,
    pub env: Environment,
    pub log_format: LogFormat,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Request/response API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `https://chat.example.com/api/v1`
    pub base_url: String,
    pub timeout: Duration,
}

/// Live connection configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// WebSocket URL, e.g. `wss://chat.example.com/gateway`
    pub url: String,
}

/// Credential configuration
#[derive(Clone, Default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Synchronization engine tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    /// Messages requested per history page
    pub page_size: usize,
    /// Deleted ids remembered to absorb late events
    pub tombstone_capacity: usize,
    /// How long a typing indicator lives without a refresh
    pub typing_ttl: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            tombstone_capacity: default_tombstone_capacity(),
            typing_ttl: Duration::from_secs(default_typing_ttl_secs()),
        }
    }
}

/// Reconnect policy of the live connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(default_reconnect_initial_delay_ms()),
            max_delay: Duration::from_millis(default_reconnect_max_delay_ms()),
            max_attempts: default_reconnect_max_attempts(),
        }
    }
}

/// Upper bound of `SYNC_PAGE_SIZE`
pub const MAX_PAGE_SIZE: usize = 100;

// Default value functions
fn default_app_name() -> String {
    "chat-client".to_string()
}

fn default_api_timeout_secs() -> u64 {
    10
}

fn default_page_size() -> usize {
    50
}

fn default_tombstone_capacity() -> usize {
    1024
}

fn default_typing_ttl_secs() -> u64 {
    10
}

fn default_reconnect_initial_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

fn default_reconnect_max_attempts() -> u32 {
    5
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("API_BASE_URL").ok_or(ConfigError::MissingVar("API_BASE_URL"))?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue("API_BASE_URL", base_url));
        }

        let gateway_url = lookup("GATEWAY_URL").ok_or(ConfigError::MissingVar("GATEWAY_URL"))?;
        if !(gateway_url.starts_with("ws://") || gateway_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidValue("GATEWAY_URL", gateway_url));
        }

        let env = match lookup("APP_ENV") {
            None => Environment::default(),
            Some(s) => match s.to_lowercase().as_str() {
                "production" => Environment::Production,
                "staging" => Environment::Staging,
                "development" => Environment::Development,
                _ => return Err(ConfigError::InvalidValue("APP_ENV", s)),
            },
        };

        let log_format = match lookup("LOG_FORMAT") {
            None => {
                if env.is_production() {
                    LogFormat::Json
                } else {
                    LogFormat::Pretty
                }
            }
            Some(s) => match s.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                _ => return Err(ConfigError::InvalidValue("LOG_FORMAT", s)),
            },
        };

        let page_size: usize = parse_var(&lookup, "SYNC_PAGE_SIZE", default_page_size)?;

        Ok(Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env,
                log_format,
            },
            api: ApiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                timeout: Duration::from_secs(parse_var(
                    &lookup,
                    "API_TIMEOUT_SECS",
                    default_api_timeout_secs,
                )?),
            },
            gateway: GatewayConfig { url: gateway_url },
            auth: AuthConfig {
                token: lookup("AUTH_TOKEN").filter(|t| !t.is_empty()),
            },
            sync: SyncSettings {
                page_size: page_size.clamp(1, MAX_PAGE_SIZE),
                tombstone_capacity: parse_var(
                    &lookup,
                    "SYNC_TOMBSTONE_CAPACITY",
                    default_tombstone_capacity,
                )?,
                typing_ttl: Duration::from_secs(parse_var(
                    &lookup,
                    "SYNC_TYPING_TTL_SECS",
                    default_typing_ttl_secs,
                )?),
            },
            reconnect: ReconnectConfig {
                initial_delay: Duration::from_millis(parse_var(
                    &lookup,
                    "RECONNECT_INITIAL_DELAY_MS",
                    default_reconnect_initial_delay_ms,
                )?),
                max_delay: Duration::from_millis(parse_var(
                    &lookup,
                    "RECONNECT_MAX_DELAY_MS",
                    default_reconnect_max_delay_ms,
                )?),
                max_attempts: parse_var(
                    &lookup,
                    "RECONNECT_MAX_ATTEMPTS",
                    default_reconnect_max_attempts,
                )?,
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &'static str, default: fn() -> T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default()),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
