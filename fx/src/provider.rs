//! Rate providers, the provider registry and pluggable rate sources.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use ratemesh_common::{CurrencyCode, ProviderId};
use serde::{Deserialize, Serialize};

use crate::error::FxResult;

/// How a provider delivers rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Rates come from a registered [`RateSource`].
    Plugin,
    /// Rates come from a REST endpoint.
    Rest,
}

/// A configured rate provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: ProviderId,
    pub name: String,
    pub kind: ProviderKind,
    pub is_active: bool,
    /// Currencies this provider can quote.
    #[serde(default)]
    pub supported_currencies: Vec<CurrencyCode>,
}

impl ProviderInfo {
    /// Create an active provider with no supported currencies.
    pub fn new(id: ProviderId, name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            is_active: true,
            supported_currencies: Vec::new(),
        }
    }

    /// Set the currencies the provider quotes.
    pub fn with_currencies(mut self, currencies: impl IntoIterator<Item = CurrencyCode>) -> Self {
        self.supported_currencies = currencies.into_iter().collect();
        self
    }

    /// Mark the provider inactive.
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A raw quote value: providers return either numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteValue {
    Number(f64),
    Text(String),
}

impl QuoteValue {
    /// The numeric value, if it parses.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            QuoteValue::Number(n) => Some(*n),
            QuoteValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<f64> for QuoteValue {
    fn from(n: f64) -> Self {
        QuoteValue::Number(n)
    }
}

impl From<&str> for QuoteValue {
    fn from(s: &str) -> Self {
        QuoteValue::Text(s.to_string())
    }
}

/// Quotes keyed by `"FROM/TO"`.
pub type QuoteMap = HashMap<String, QuoteValue>;

/// A pluggable source of live rates.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Fetch quotes for `currencies` against `base`.
    ///
    /// Keys are `"FROM/TO"`; either `BASE/CUR` or `CUR/BASE` is accepted.
    async fn fetch_rates(
        &self,
        currencies: &[CurrencyCode],
        base: &CurrencyCode,
    ) -> FxResult<QuoteMap>;
}

/// Lookup of configured providers.
#[async_trait]
pub trait ProviderRegistry: Send + Sync {
    /// All active providers.
    async fn active(&self) -> FxResult<Vec<ProviderInfo>>;

    /// A provider by id, active or not.
    async fn get(&self, id: &ProviderId) -> FxResult<Option<ProviderInfo>>;

    /// The rate source registered for a provider, if any.
    fn rate_source(&self, id: &ProviderId) -> Option<Arc<dyn RateSource>>;
}

struct RegisteredProvider {
    info: ProviderInfo,
    source: Option<Arc<dyn RateSource>>,
}

/// Provider registry populated at start-up.
#[derive(Default)]
pub struct InMemoryProviderRegistry {
    providers: DashMap<ProviderId, RegisteredProvider>,
}

impl InMemoryProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider without a rate source.
    pub fn register(&self, info: ProviderInfo) {
        self.providers
            .insert(info.id.clone(), RegisteredProvider { info, source: None });
    }

    /// Register a provider together with its rate source.
    pub fn register_with_source(&self, info: ProviderInfo, source: Arc<dyn RateSource>) {
        self.providers.insert(
            info.id.clone(),
            RegisteredProvider {
                info,
                source: Some(source),
            },
        );
    }

    /// Flip a provider's active flag. Returns `false` if it is unknown.
    pub fn set_active(&self, id: &ProviderId, active: bool) -> bool {
        match self.providers.get_mut(id) {
            Some(mut entry) => {
                entry.info.is_active = active;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl ProviderRegistry for InMemoryProviderRegistry {
    async fn active(&self) -> FxResult<Vec<ProviderInfo>> {
        let mut active: Vec<ProviderInfo> = self
            .providers
            .iter()
            .filter(|entry| entry.info.is_active)
            .map(|entry| entry.info.clone())
            .collect();
        // DashMap iteration order is arbitrary; merge order must not be.
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn get(&self, id: &ProviderId) -> FxResult<Option<ProviderInfo>> {
        Ok(self.providers.get(id).map(|entry| entry.info.clone()))
    }

    fn rate_source(&self, id: &ProviderId) -> Option<Arc<dyn RateSource>> {
        self.providers
            .get(id)
            .and_then(|entry| entry.source.clone())
    }
}

/// Rate source that records calls and replays scripted quotes.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    quotes: DashMap<String, QuoteMap>,
    failing_bases: DashMap<String, String>,
    calls: std::sync::atomic::AtomicU64,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    pub fn new() -> Self {
        Self {
            quotes: DashMap::new(),
            failing_bases: DashMap::new(),
            calls: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Quote returned when `currency` is requested against `base`.
    pub fn set_quote(&self, currency: &str, base: &str, key: &str, value: QuoteValue) {
        self.quotes
            .entry(format!("{}:{}", currency.to_uppercase(), base.to_uppercase()))
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Make every request against `base` fail.
    pub fn fail_for_base(&self, base: &str, message: &str) {
        self.failing_bases
            .insert(base.to_uppercase(), message.to_string());
    }

    /// Number of `fetch_rates` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(std::sync::atomic::Ordering::Relaxed)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for MockRateSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    async fn fetch_rates(
        &self,
        currencies: &[CurrencyCode],
        base: &CurrencyCode,
    ) -> FxResult<QuoteMap> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        if let Some(message) = self.failing_bases.get(base.code()) {
            return Err(crate::error::FxError::Provider {
                provider: ProviderId::new("mock"),
                message: message.clone(),
            });
        }

        let mut out = QuoteMap::new();
        for currency in currencies {
            if let Some(quotes) = self.quotes.get(&format!("{}:{}", currency, base)) {
                out.extend(quotes.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_value_parsing() {
        assert_eq!(QuoteValue::from(1.5).as_f64(), Some(1.5));
        assert_eq!(QuoteValue::from(" 0.000016 ").as_f64(), Some(0.000016));
        assert_eq!(QuoteValue::from("n/a").as_f64(), None);
    }

    #[test]
    fn test_quote_value_deserializes_mixed_json() {
        let quotes: QuoteMap =
            serde_json::from_str(r#"{"BTC/USD": 64000.5, "USD/ETH": "0.00031"}"#).unwrap();
        assert_eq!(quotes["BTC/USD"].as_f64(), Some(64000.5));
        assert_eq!(quotes["USD/ETH"].as_f64(), Some(0.00031));
    }

    #[tokio::test]
    async fn test_registry_filters_inactive() {
        let registry = InMemoryProviderRegistry::new();
        registry.register(ProviderInfo::new(ProviderId::new("b"), "B", ProviderKind::Rest));
        registry.register(ProviderInfo::new(ProviderId::new("a"), "A", ProviderKind::Plugin));
        registry.register(
            ProviderInfo::new(ProviderId::new("c"), "C", ProviderKind::Plugin).inactive(),
        );

        let active = registry.active().await.unwrap();
        let ids: Vec<&str> = active.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let inactive = registry.get(&ProviderId::new("c")).await.unwrap().unwrap();
        assert!(!inactive.is_active);

        assert!(registry.set_active(&ProviderId::new("c"), true));
        assert_eq!(registry.active().await.unwrap().len(), 3);
        assert!(!registry.set_active(&ProviderId::new("zzz"), true));
    }

    #[tokio::test]
    async fn test_registry_rate_source() {
        let registry = InMemoryProviderRegistry::new();
        let source = Arc::new(MockRateSource::new());
        source.set_quote("BTC", "USD", "BTC/USD", QuoteValue::from(64000.0));

        registry.register_with_source(
            ProviderInfo::new(ProviderId::new("cg"), "CoinGecko", ProviderKind::Plugin),
            source.clone(),
        );
        registry.register(ProviderInfo::new(ProviderId::new("rest"), "Rest", ProviderKind::Rest));

        let found = registry.rate_source(&ProviderId::new("cg")).unwrap();
        let quotes = found
            .fetch_rates(&[CurrencyCode::new("BTC")], &CurrencyCode::usd())
            .await
            .unwrap();
        assert_eq!(quotes["BTC/USD"].as_f64(), Some(64000.0));
        assert_eq!(source.calls(), 1);

        assert!(registry.rate_source(&ProviderId::new("rest")).is_none());
    }
}
