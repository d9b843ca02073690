//! Configuration structs

mod app_config;

pub use app_config::{
    ApiConfig, AppConfig, AppSettings, AuthConfig, ConfigError, Environment, GatewayConfig,
    LogFormat, ReconnectConfig, SyncSettings,
};
