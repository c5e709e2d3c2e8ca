//! Rate graph assembly from stored and live provider rates.

use std::collections::HashSet;
use std::sync::Arc;

use ratemesh_common::{day_key, day_of, CurrencyCode, CurrencyPair, ProviderId, SharedClock, Timestamp};
use tracing::{debug, info, instrument, warn};

use crate::config::RateGraphConfig;
use crate::edge::{confidence_at, Provenance, RateEdge};
use crate::graph::RateGraph;
use crate::provider::{ProviderInfo, ProviderKind, ProviderRegistry, QuoteMap, RateSource};
use crate::store::RateStore;

/// Provider name attached to edges that come from the rate store.
pub const CACHED_PROVIDER_NAME: &str = "cached";

/// Builds the rate graph for an evaluation date.
///
/// Building never fails: a store or provider that errors is logged and
/// simply contributes no edges.
pub struct GraphBuilder {
    store: Arc<dyn RateStore>,
    providers: Arc<dyn ProviderRegistry>,
    clock: SharedClock,
    anchor_bases: Vec<CurrencyCode>,
    live_rate_confidence: f64,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<dyn RateStore>,
        providers: Arc<dyn ProviderRegistry>,
        clock: SharedClock,
        config: &RateGraphConfig,
    ) -> Self {
        Self {
            store,
            providers,
            clock,
            anchor_bases: config.anchor_bases.clone(),
            live_rate_confidence: config.live_rate_confidence,
        }
    }

    /// Build the graph for `date`, optionally from a single provider.
    #[instrument(skip(self), fields(day = %day_key(date)))]
    pub async fn build(&self, date: Timestamp, provider_id: Option<&ProviderId>) -> RateGraph {
        let mut graph = RateGraph::new();

        let providers = self.resolve_providers(provider_id).await;
        let stored = self.add_stored_rates(&mut graph, date).await;

        let mut live = 0;
        for provider in &providers {
            live += self.add_provider_rates(&mut graph, provider).await;
        }

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            stored_edges = stored,
            live_edges = live,
            providers = providers.len(),
            "Built rate graph"
        );

        graph
    }

    async fn resolve_providers(&self, provider_id: Option<&ProviderId>) -> Vec<ProviderInfo> {
        match provider_id {
            Some(id) => match self.providers.get(id).await {
                Ok(Some(provider)) => vec![provider],
                Ok(None) => {
                    warn!(provider = %id, "Requested provider not found");
                    Vec::new()
                }
                Err(e) => {
                    warn!(provider = %id, error = %e, "Failed to look up provider");
                    Vec::new()
                }
            },
            None => self.providers.active().await.unwrap_or_else(|e| {
                warn!(error = %e, "Failed to list active providers");
                Vec::new()
            }),
        }
    }

    /// Add the most recently fetched stored rate per pair. Returns the
    /// number of edges kept.
    async fn add_stored_rates(&self, graph: &mut RateGraph, date: Timestamp) -> usize {
        let rates = match self.store.find_up_to(day_of(date)).await {
            Ok(rates) => rates,
            Err(e) => {
                warn!(error = %e, "Failed to load stored rates");
                return 0;
            }
        };

        let now = self.clock.now();
        let mut seen = HashSet::new();
        let mut kept = 0;

        for rate in rates {
            // Newest first: later rows for the same pair are older fetches.
            if !seen.insert((rate.from.clone(), rate.to.clone())) {
                continue;
            }

            let confidence = confidence_at(rate.fetched_at, now);
            let provenance = Provenance::new(rate.provider_id, CACHED_PROVIDER_NAME, rate.fetched_at);
            match RateEdge::new(rate.from, rate.to, rate.rate, provenance, confidence) {
                Ok(edge) => {
                    if graph.add_edge(edge) {
                        kept += 1;
                    }
                }
                Err(e) => debug!(error = %e, "Skipping stored rate"),
            }
        }

        kept
    }

    /// Merge a provider's live rates. Returns the number of edges kept.
    async fn add_provider_rates(&self, graph: &mut RateGraph, provider: &ProviderInfo) -> usize {
        match provider.kind {
            ProviderKind::Plugin => match self.providers.rate_source(&provider.id) {
                Some(source) => self.add_plugin_rates(graph, provider, source.as_ref()).await,
                None => {
                    warn!(provider = %provider.name, "No rate source registered for plugin provider");
                    0
                }
            },
            ProviderKind::Rest => {
                debug!(provider = %provider.name, "No REST connector configured, skipping");
                0
            }
        }
    }

    async fn add_plugin_rates(
        &self,
        graph: &mut RateGraph,
        provider: &ProviderInfo,
        source: &dyn RateSource,
    ) -> usize {
        let mut kept = 0;

        for currency in &provider.supported_currencies {
            for base in &self.anchor_bases {
                if currency == base {
                    continue;
                }

                match source.fetch_rates(std::slice::from_ref(currency), base).await {
                    Ok(quotes) => kept += self.merge_quotes(graph, provider, currency, base, &quotes),
                    Err(e) => debug!(
                        provider = %provider.name,
                        currency = %currency,
                        base = %base,
                        error = %e,
                        "Rate fetch failed"
                    ),
                }
            }
        }

        kept
    }

    /// Normalise quotes to `currency -> base` edges and merge them.
    ///
    /// `BASE/CUR` quotes are inverted, `CUR/BASE` quotes are used as-is and
    /// any other key is ignored.
    fn merge_quotes(
        &self,
        graph: &mut RateGraph,
        provider: &ProviderInfo,
        currency: &CurrencyCode,
        base: &CurrencyCode,
        quotes: &QuoteMap,
    ) -> usize {
        let now = self.clock.now();
        let mut keys: Vec<&String> = quotes.keys().collect();
        keys.sort();

        let mut kept = 0;
        for key in keys {
            let Ok(pair) = CurrencyPair::parse_key(key) else {
                debug!(provider = %provider.name, key = %key, "Skipping malformed quote key");
                continue;
            };
            let Some(raw) = quotes[key].as_f64() else {
                debug!(provider = %provider.name, key = %key, "Skipping non-numeric quote");
                continue;
            };

            let rate = if &pair.base == base && &pair.quote == currency {
                1.0 / raw
            } else if &pair.base == currency && &pair.quote == base {
                raw
            } else {
                continue;
            };

            let provenance = Provenance::new(provider.id.clone(), provider.name.clone(), now);
            match RateEdge::new(
                currency.clone(),
                base.clone(),
                rate,
                provenance,
                self.live_rate_confidence,
            ) {
                Ok(edge) => {
                    if graph.add_edge(edge) {
                        kept += 1;
                    }
                }
                Err(e) => debug!(provider = %provider.name, error = %e, "Skipping invalid quote"),
            }
        }

        kept
    }
}
