use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{SubstitutionPolicy, ToolDefinition};
use crate::infrastructure::flow::FlowEngineConfig;

/// Environment variable prefix; `PMP_FLOW__ENGINE__DEFAULT_MODEL` sets `engine.default_model`
pub const ENV_PREFIX: &str = "PMP_FLOW";

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
    pub provider: ProviderConfig,
    #[serde(alias = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(alias = "defaultTimeoutMs")]
    pub default_timeout_ms: u64,
    #[serde(alias = "defaultModel")]
    pub default_model: Option<String>,
    pub substitution: SubstitutionPolicy,
}

/// OpenAI-compatible completion endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    #[serde(alias = "baseUrl")]
    pub base_url: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(alias = "apiKeyEnv")]
    pub api_key_env: String,
    #[serde(alias = "requestTimeoutMs")]
    pub request_timeout_ms: Option<u64>,
}

/// Tools a named tool server exposes
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct McpServerConfig {
    pub tools: Vec<ToolDefinition>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        let engine = FlowEngineConfig::default();
        Self {
            default_timeout_ms: engine.default_timeout_ms,
            default_model: engine.default_model,
            substitution: engine.substitution,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            request_timeout_ms: None,
        }
    }
}

impl From<&EngineConfig> for FlowEngineConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_timeout_ms: config.default_timeout_ms,
            default_model: config.default_model.clone(),
            substitution: config.substitution,
        }
    }
}

impl AppConfig {
    /// Load `<root>/config.{toml,yaml,json}` layered under `PMP_FLOW__*` variables
    pub fn load(root: &Path) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(root.join("config")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
