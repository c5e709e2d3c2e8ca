//! Error types shared across RateMesh crates.

use thiserror::Error;

/// Errors raised while parsing shared value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A currency code was empty or whitespace.
    #[error("Currency code cannot be empty")]
    EmptyCurrencyCode,

    /// A quote key was not of the form `FROM/TO`.
    #[error("Malformed currency pair key: {0}")]
    MalformedPair(String),
}
