//! Error types for the sniper bot

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the sniper bot
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing credential: {0}")]
    MissingCredential(String),

    // Transport errors (transient)
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Rate limited by exchange: {0}")]
    RateLimited(String),

    #[error("Exchange unavailable: {0}")]
    ExchangeUnavailable(String),

    // Exchange business errors
    #[error("Exchange rejected request: {0}")]
    ExchangeRejected(String),

    #[error("Symbol not listed: {0}")]
    SymbolNotListed(String),

    #[error("Insufficient balance: {available} USDT available, {required} USDT required")]
    InsufficientBalance { available: f64, required: f64 },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    // Market data errors
    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    // Capability errors
    #[error("Authenticated gateway required for {0}")]
    AuthRequired(&'static str),

    // Persistence errors
    #[error("State persistence failed: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_)
                | Error::Timeout(_)
                | Error::RateLimited(_)
                | Error::ExchangeUnavailable(_)
        )
    }

    /// Check if this error is a business-rule rejection.
    ///
    /// Business-rule errors are never retried: the machine logs, notifies
    /// once, and re-evaluates on the next tick.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            Error::SymbolNotListed(_)
                | Error::InsufficientBalance { .. }
                | Error::InvalidOrder(_)
                | Error::ExchangeRejected(_)
        )
    }

    /// Check if this error is fatal (fail-fast after notification)
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::MissingCredential(_))
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(0)
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
