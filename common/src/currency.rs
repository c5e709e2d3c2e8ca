//! Currency codes and currency pairs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// Currency code (fiat or crypto), always stored uppercase.
///
/// Codes are not checked against ISO 4217: `USDT`, `BTC` and in-house
/// units of account are all valid graph nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new currency code, normalising to uppercase.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }

    pub fn gbp() -> Self {
        Self::new("GBP")
    }

    pub fn cny() -> Self {
        Self::new("CNY")
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CurrencyCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CurrencyCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl FromStr for CurrencyCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyCurrencyCode);
        }
        Ok(Self::new(trimmed))
    }
}

/// An ordered pair of currencies, `base/quote`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Currency being converted from.
    pub base: CurrencyCode,
    /// Currency being converted into.
    pub quote: CurrencyCode,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: CurrencyCode, quote: CurrencyCode) -> Self {
        Self { base, quote }
    }

    /// Get the inverse pair.
    pub fn inverse(&self) -> Self {
        Self {
            base: self.quote.clone(),
            quote: self.base.clone(),
        }
    }

    /// Parse a quote key of the form `FROM/TO`.
    pub fn parse_key(key: &str) -> Result<Self, ParseError> {
        let mut parts = key.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) => Ok(Self::new(base.parse()?, quote.parse()?)),
            _ => Err(ParseError::MalformedPair(key.to_string())),
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_is_uppercased() {
        assert_eq!(CurrencyCode::new("btc").code(), "BTC");
        assert_eq!(CurrencyCode::from("usdt"), CurrencyCode::new("USDT"));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(matches!(
            "  ".parse::<CurrencyCode>(),
            Err(ParseError::EmptyCurrencyCode)
        ));
        assert_eq!(" eur ".parse::<CurrencyCode>().unwrap(), CurrencyCode::eur());
    }

    #[test]
    fn test_parse_pair_key() {
        let pair = CurrencyPair::parse_key("USD/btc").unwrap();
        assert_eq!(pair.base, CurrencyCode::usd());
        assert_eq!(pair.quote, CurrencyCode::new("BTC"));
        assert_eq!(pair.to_string(), "USD/BTC");
        assert_eq!(pair.inverse().to_string(), "BTC/USD");
    }

    #[test]
    fn test_parse_pair_key_malformed() {
        assert!(CurrencyPair::parse_key("USDBTC").is_err());
        assert!(CurrencyPair::parse_key("USD/BTC/ETH").is_err());
        assert!(CurrencyPair::parse_key("/BTC").is_err());
    }

    #[test]
    fn test_serde_normalises_case() {
        let json = serde_json::to_string(&CurrencyCode::gbp()).unwrap();
        assert_eq!(json, "\"GBP\"");

        let code: CurrencyCode = serde_json::from_str("\"cny\"").unwrap();
        assert_eq!(code, CurrencyCode::cny());
    }
}
