//! Main rate graph engine implementation.

use std::sync::Arc;

use ratemesh_common::{day_key, day_of, CurrencyCode, ProviderId, SharedClock, SystemClock, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::builder::GraphBuilder;
use crate::cache::{GraphCache, GraphCacheStats};
use crate::config::{ConversionFallback, RateGraphConfig};
use crate::conversion::{apply_rate, Conversion};
use crate::error::{FxError, FxResult};
use crate::graph::RateGraph;
use crate::pathfinder::{find_all_paths, find_best_path, PathResult};
use crate::provider::ProviderRegistry;
use crate::store::RateStore;

/// Source reported for a same-currency lookup.
pub const IDENTITY_SOURCE: &str = "identity";
/// Source reported for a multi-hop rate.
pub const GRAPH_INFERENCE_SOURCE: &str = "graph-inference";
/// Source reported for a stored rate whose provider is not registered.
pub const UNKNOWN_PROVIDER: &str = "unknown";

/// Parameters of a rate lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateQuery {
    /// Evaluation date, now when absent.
    pub date: Option<Timestamp>,
    /// Restrict live rates to this provider.
    pub provider_id: Option<ProviderId>,
}

impl RateQuery {
    /// Query as of now, across all active providers.
    pub fn latest() -> Self {
        Self::default()
    }

    /// Query as of `date`.
    pub fn at(date: Timestamp) -> Self {
        Self {
            date: Some(date),
            provider_id: None,
        }
    }

    /// Only use live rates from `provider_id`.
    pub fn from_provider(mut self, provider_id: ProviderId) -> Self {
        self.provider_id = Some(provider_id);
        self
    }
}

/// A resolved exchange rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateResult {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: f64,
    /// When the rate was observed: the edge's fetch time for a single edge,
    /// the resolution time for inferred rates, and the evaluation date for
    /// identity results.
    pub timestamp: Timestamp,
    /// `identity`, a provider name or `graph-inference`.
    pub source: String,
    pub path: Vec<CurrencyCode>,
    pub hops: usize,
    /// Derived over more than one edge.
    pub is_inferred: bool,
}

impl RateResult {
    fn identity(code: CurrencyCode, date: Timestamp) -> Self {
        Self {
            from: code.clone(),
            to: code.clone(),
            rate: 1.0,
            timestamp: date,
            source: IDENTITY_SOURCE.to_string(),
            path: vec![code],
            hops: 0,
            is_inferred: false,
        }
    }

    fn from_path(from: CurrencyCode, to: CurrencyCode, found: PathResult, now: Timestamp) -> Self {
        // A single edge keeps its own provenance.
        let (source, timestamp) = match found.edges.as_slice() {
            [edge] => (edge.provider_name.clone(), edge.timestamp),
            _ => (GRAPH_INFERENCE_SOURCE.to_string(), now),
        };

        Self {
            from,
            to,
            rate: found.total_rate,
            timestamp,
            source,
            is_inferred: found.hops > 1,
            hops: found.hops,
            path: found.path,
        }
    }
}

/// Alternative conversion paths between two currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailablePaths {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Best rate first.
    pub paths: Vec<PathResult>,
    pub total_paths: usize,
}

/// Cache key for a graph: the evaluation day, suffixed with the provider
/// when the graph is restricted to one.
pub fn cache_key(date: Timestamp, provider_id: Option<&ProviderId>) -> String {
    match provider_id {
        Some(id) => format!("{}@{}", day_key(date), id),
        None => day_key(date),
    }
}

/// The rate graph engine.
///
/// Answers rate lookups from stored rates first, then by searching a graph
/// of stored and live provider rates built per day and cached.
pub struct RateGraphEngine {
    store: Arc<dyn RateStore>,
    providers: Arc<dyn ProviderRegistry>,
    builder: GraphBuilder,
    cache: GraphCache,
    clock: SharedClock,
    config: RateGraphConfig,
}

impl RateGraphEngine {
    /// Create a new engine on the system clock.
    pub fn new(
        store: Arc<dyn RateStore>,
        providers: Arc<dyn ProviderRegistry>,
        config: RateGraphConfig,
    ) -> Self {
        Self::with_clock(store, providers, Arc::new(SystemClock), config)
    }

    /// Create a new engine reading time from `clock`.
    pub fn with_clock(
        store: Arc<dyn RateStore>,
        providers: Arc<dyn ProviderRegistry>,
        clock: SharedClock,
        config: RateGraphConfig,
    ) -> Self {
        let builder = GraphBuilder::new(store.clone(), providers.clone(), clock.clone(), &config);
        let cache = GraphCache::new(clock.clone(), config.cache_ttl);

        info!(
            cache_ttl_secs = config.cache_ttl.num_seconds(),
            anchors = config.anchor_bases.len(),
            max_hops = config.best_path.max_hops,
            "Rate graph engine initialized"
        );

        Self {
            store,
            providers,
            builder,
            cache,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateGraphConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Get the rate between two currencies.
    ///
    /// Returns `None` when no direct or inferred rate exists.
    pub async fn get_rate(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        query: RateQuery,
    ) -> Option<RateResult> {
        self.resolve_rate(from.into(), to.into(), query).await
    }

    /// Get the current rate across all active providers.
    pub async fn latest_rate(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
    ) -> Option<RateResult> {
        self.get_rate(from, to, RateQuery::latest()).await
    }

    /// Get the rate as of `date`.
    pub async fn rate_at(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        date: Timestamp,
    ) -> Option<RateResult> {
        self.get_rate(from, to, RateQuery::at(date)).await
    }

    #[instrument(skip_all, fields(from = %from, to = %to))]
    pub(crate) async fn resolve_rate(
        &self,
        from: CurrencyCode,
        to: CurrencyCode,
        query: RateQuery,
    ) -> Option<RateResult> {
        let date = query.date.unwrap_or_else(|| self.clock.now());

        if from == to {
            return Some(RateResult::identity(from, date));
        }

        let provider_id = query.provider_id.as_ref();
        if let Some(direct) = self.direct_rate(&from, &to, date, provider_id).await {
            debug!(source = %direct.source, "Using stored rate");
            return Some(direct);
        }

        let graph = self.graph_for(date, provider_id).await;
        match find_best_path(&graph, &from, &to, &self.config.best_path) {
            Some(found) => {
                let result = RateResult::from_path(from, to, found, self.clock.now());
                debug!(rate = result.rate, hops = result.hops, "Resolved rate from graph");
                Some(result)
            }
            None => {
                debug!("No conversion path");
                None
            }
        }
    }

    /// Stored rate for exactly this pair and day.
    async fn direct_rate(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: Timestamp,
        provider_id: Option<&ProviderId>,
    ) -> Option<RateResult> {
        let stored = match self.store.find(from, to, day_of(date)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "Stored rate lookup failed");
                return None;
            }
        };

        if provider_id.is_some_and(|id| *id != stored.provider_id) {
            return None;
        }
        if !stored.rate.is_finite() || stored.rate <= 0.0 {
            debug!(rate = stored.rate, "Ignoring invalid stored rate");
            return None;
        }

        let source = match self.providers.get(&stored.provider_id).await {
            Ok(Some(provider)) => provider.name,
            Ok(None) => UNKNOWN_PROVIDER.to_string(),
            Err(e) => {
                warn!(provider = %stored.provider_id, error = %e, "Provider lookup failed");
                UNKNOWN_PROVIDER.to_string()
            }
        };

        Some(RateResult {
            from: from.clone(),
            to: to.clone(),
            rate: stored.rate,
            timestamp: stored.fetched_at,
            source,
            path: vec![from.clone(), to.clone()],
            hops: 1,
            is_inferred: false,
        })
    }

    async fn graph_for(&self, date: Timestamp, provider_id: Option<&ProviderId>) -> Arc<RateGraph> {
        let key = cache_key(date, provider_id);
        self.cache
            .get_or_build(&key, || self.builder.build(date, provider_id))
            .await
    }

    /// Convert an amount between currencies.
    ///
    /// Without a rate this fails with [`FxError::RateNotAvailable`], or
    /// converts 1:1 when the engine is configured with
    /// [`ConversionFallback::Identity`].
    pub async fn convert(
        &self,
        amount: Decimal,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        date: Option<Timestamp>,
    ) -> FxResult<Conversion> {
        self.convert_amount(amount, from.into(), to.into(), date).await
    }

    #[instrument(skip_all, fields(from = %from, to = %to, amount = %amount))]
    async fn convert_amount(
        &self,
        amount: Decimal,
        from: CurrencyCode,
        to: CurrencyCode,
        date: Option<Timestamp>,
    ) -> FxResult<Conversion> {
        let date = date.unwrap_or_else(|| self.clock.now());
        let found = self
            .resolve_rate(from.clone(), to.clone(), RateQuery::at(date))
            .await;

        let conversion = match found {
            Some(rate) => {
                let converted_amount = apply_rate(amount, rate.rate, &from, &to)?;
                Conversion {
                    id: Uuid::now_v7(),
                    amount,
                    from,
                    to,
                    converted_amount,
                    rate: rate.rate,
                    date,
                    path: Some(rate.path),
                    hops: Some(rate.hops),
                    fallback: false,
                    executed_at: self.clock.now(),
                }
            }
            None => match self.config.conversion_fallback {
                ConversionFallback::Strict => {
                    return Err(FxError::RateNotAvailable { from, to });
                }
                ConversionFallback::Identity => {
                    warn!("No rate available, converting 1:1");
                    Conversion {
                        id: Uuid::now_v7(),
                        amount,
                        from,
                        to,
                        converted_amount: amount,
                        rate: 1.0,
                        date,
                        path: None,
                        hops: None,
                        fallback: true,
                        executed_at: self.clock.now(),
                    }
                }
            },
        };

        info!(
            conversion_id = %conversion.id,
            converted_amount = %conversion.converted_amount,
            fallback = conversion.fallback,
            "Conversion completed"
        );

        Ok(conversion)
    }

    /// Enumerate alternative paths between two currencies, best rate first.
    #[instrument(skip(self, from, to), fields(date = ?date))]
    pub async fn get_available_paths(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        date: Option<Timestamp>,
    ) -> AvailablePaths {
        let (from, to) = (from.into(), to.into());
        let date = date.unwrap_or_else(|| self.clock.now());

        let graph = self.graph_for(date, None).await;
        let paths = find_all_paths(&graph, &from, &to, &self.config.all_paths);

        debug!(from = %from, to = %to, found = paths.len(), "Enumerated paths");

        AvailablePaths {
            from,
            to,
            total_paths: paths.len(),
            paths,
        }
    }

    /// Drop every cached graph.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Rate graph cache cleared");
    }

    /// Get cache statistics.
    pub fn cache_stats(&self) -> GraphCacheStats {
        self.cache.stats()
    }
}
