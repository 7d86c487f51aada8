use thiserror::Error;

/// Errors raised by collaborators (providers, tool servers, configuration)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Provider error: {provider} - {message}")]
    Provider { provider: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Transport-level failures that may succeed when retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = DomainError::not_found("Tool server 'web' not found");
        assert_eq!(error.to_string(), "Not found: Tool server 'web' not found");
    }

    #[test]
    fn test_provider_error() {
        let error = DomainError::provider("openai", "HTTP 500");
        assert_eq!(error.to_string(), "Provider error: openai - HTTP 500");
    }

    #[test]
    fn test_transient_classification() {
        assert!(DomainError::provider("http", "timeout").is_transient());
        assert!(!DomainError::not_found("tool").is_transient());
        assert!(!DomainError::validation("bad").is_transient());
        assert!(!DomainError::configuration("missing key").is_transient());
    }
}
