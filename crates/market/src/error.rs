use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum MarketError {
    #[error("Invalid symbol '{0}': expected 1-10 letters, digits, '.', '-' or '^'")]
    InvalidSymbol(String),

    #[error("Unsupported range '{0}'")]
    InvalidRange(String),

    #[error("{service} request failed: {message}")]
    Upstream { service: String, message: String },

    #[error("Malformed {service} response: {message}")]
    Malformed { service: String, message: String },

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

impl MarketError {
    pub(crate) fn upstream(service: &str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    pub(crate) fn malformed(service: &str, message: impl Into<String>) -> Self {
        Self::Malformed {
            service: service.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;
