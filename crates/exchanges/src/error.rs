//! Error types for exchange market-data access.

use thiserror::Error;

/// Errors raised by exchange adapters.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// HTTP request failed with a non-success status.
    #[error("API error: {status_code} - {message}")]
    Api {
        /// HTTP status code.
        status_code: u16,
        /// Response body or reason.
        message: String,
    },

    /// Exchange answered 200 but flagged the call as failed in its envelope.
    #[error("exchange rejected request: code {code} - {message}")]
    Rejected {
        /// Exchange-specific return code.
        code: String,
        /// Exchange-specific message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimit {
        /// Seconds to wait before retry.
        retry_after_secs: u64,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("request timeout: {0}")]
    Timeout(String),

    /// Payload did not have the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// Symbol is not in the loaded market catalog.
    #[error("unknown symbol: {symbol}")]
    UnknownSymbol {
        /// Unified symbol that was requested.
        symbol: String,
    },

    /// Ticker requested before the market catalog was loaded.
    #[error("markets not loaded for {exchange}")]
    MarketsNotLoaded {
        /// Exchange id.
        exchange: String,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ExchangeError {
    pub fn api(status_code: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status_code,
            message: message.into(),
        }
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown_symbol(symbol: impl Into<String>) -> Self {
        Self::UnknownSymbol {
            symbol: symbol.into(),
        }
    }

    /// Returns true if repeating the same request later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimit { .. } => true,
            Self::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {err}"))
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ExchangeError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
