use async_trait::async_trait;
use std::time::Duration;

use serde_json::Value;

use crate::domain::DomainError;

/// Longest slice of an error body carried into a provider error
const MAX_ERROR_BODY: usize = 512;

/// JSON-over-HTTP transport used by completion providers
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &Value,
    ) -> Result<Value, DomainError>;
}

/// reqwest-backed transport
#[derive(Debug, Clone, Default)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, DomainError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map(|client| Self { client })
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &Value,
    ) -> Result<Value, DomainError> {
        let request = headers
            .into_iter()
            .fold(self.client.post(url), |request, (key, value)| request.header(key, value));

        let response = request
            .json(body)
            .send()
            .await
            .map_err(|e| {
                DomainError::provider("http", format!("Request to {} failed: {}", url, e))
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DomainError::provider("http", format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(DomainError::provider(
                "http",
                format!("HTTP {} from {}: {}", status, url, truncate(&text)),
            ));
        }

        serde_json::from_str(&text).map_err(|e| {
            DomainError::provider(
                "http",
                format!("Failed to parse response: {} (body: {})", e, truncate(&text)),
            )
        })
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(MAX_ERROR_BODY) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
