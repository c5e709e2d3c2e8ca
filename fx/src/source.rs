//! Rate sources compiled into the engine.

use async_trait::async_trait;
use ratemesh_common::{CurrencyCode, CurrencyPair};
use serde::{Deserialize, Serialize};

use crate::error::FxResult;
use crate::provider::{QuoteMap, QuoteValue, RateSource};

/// Serves quotes from a fixed table.
///
/// A request for `currencies` against `base` returns every table entry whose
/// key pairs one of the requested currencies with `base`, in either
/// direction. Keys that are not `FROM/TO` never match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StaticRateSource {
    quotes: QuoteMap,
}

impl StaticRateSource {
    pub fn new(quotes: QuoteMap) -> Self {
        Self { quotes }
    }

    /// Add a quote to the table.
    pub fn with_quote(mut self, key: impl Into<String>, value: impl Into<QuoteValue>) -> Self {
        self.quotes.insert(key.into(), value.into());
        self
    }

    /// Load a table from a JSON object of `"FROM/TO": rate` entries.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn matches(key: &str, currencies: &[CurrencyCode], base: &CurrencyCode) -> bool {
        let Ok(pair) = CurrencyPair::parse_key(key) else {
            return false;
        };
        currencies.iter().any(|currency| {
            (&pair.base == currency && &pair.quote == base)
                || (&pair.base == base && &pair.quote == currency)
        })
    }
}

#[async_trait]
impl RateSource for StaticRateSource {
    async fn fetch_rates(
        &self,
        currencies: &[CurrencyCode],
        base: &CurrencyCode,
    ) -> FxResult<QuoteMap> {
        Ok(self
            .quotes
            .iter()
            .filter(|(key, _)| Self::matches(key, currencies, base))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }
}
