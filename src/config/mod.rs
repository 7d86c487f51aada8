//! Application configuration and configuration-root discovery

mod app_config;
mod discovery;

pub use app_config::{
    AppConfig, EngineConfig, LogFormat, LoggingConfig, McpServerConfig, ProviderConfig, ENV_PREFIX,
};
pub use discovery::{discover_root, resolve_root, ROOT_DIR_NAME};
