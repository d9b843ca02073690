//! # chat-common
//!
//! Shared utilities including configuration, error handling, authentication, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::TokenAuth;
pub use config::{
    ApiConfig, AppConfig, AppSettings, AuthConfig, ConfigError, Environment, GatewayConfig,
    LogFormat, ReconnectConfig, SyncSettings,
};
pub use error::{AppError, AppResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
