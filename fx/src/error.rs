//! Rate engine error types.

use ratemesh_common::{CurrencyCode, ParseError, ProviderId};
use thiserror::Error;

/// Errors that can occur in the rate graph engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// No direct or inferred rate exists for the requested pair.
    #[error("Rate not available for {from}/{to}")]
    RateNotAvailable { from: CurrencyCode, to: CurrencyCode },

    /// A rate was zero, negative or not a finite number.
    #[error("Invalid rate {rate} for {from}/{to}")]
    InvalidRate {
        from: CurrencyCode,
        to: CurrencyCode,
        rate: f64,
    },

    /// Start of a date range falls after its end.
    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: String, to: String },

    /// The persisted rate store failed.
    #[error("Rate store error: {0}")]
    Store(String),

    /// A rate provider or its rate source failed.
    #[error("Rate provider {provider} error: {message}")]
    Provider { provider: ProviderId, message: String },

    /// Malformed quote key or currency code.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for rate engine operations.
pub type FxResult<T> = Result<T, FxError>;
