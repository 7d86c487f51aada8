use std::sync::Arc;
use std::time::Duration;

use super::http_client::HttpClient;
use super::OpenAiProvider;
use crate::config::ProviderConfig;
use crate::domain::{DomainError, LlmProvider};

/// Factory for creating LLM providers
#[derive(Debug)]
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Create the configured provider, reading the API key from `apiKeyEnv`
    pub fn create(config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            DomainError::configuration(format!(
                "Environment variable {} is not set; it must hold the provider API key",
                config.api_key_env
            ))
        })?;

        Self::create_with_api_key(config, api_key)
    }

    /// Create the configured provider with an explicit API key
    pub fn create_with_api_key(
        config: &ProviderConfig,
        api_key: impl Into<String>,
    ) -> Result<Arc<dyn LlmProvider>, DomainError> {
        let http_client = match config.request_timeout_ms {
            Some(ms) => HttpClient::with_timeout(Duration::from_millis(ms))?,
            None => HttpClient::new(),
        };

        let provider = match config.base_url {
            Some(ref base_url) => OpenAiProvider::with_base_url(http_client, api_key, base_url),
            None => OpenAiProvider::new(http_client, api_key),
        };

        Ok(Arc::new(provider))
    }

    /// Create an OpenAI provider directly
    pub fn create_openai(api_key: impl Into<String>) -> Arc<dyn LlmProvider> {
        Arc::new(OpenAiProvider::new(HttpClient::new(), api_key))
    }
}
