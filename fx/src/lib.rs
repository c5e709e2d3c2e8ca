//! RateMesh FX Engine
//!
//! Currency rate graph engine: resolves exchange rates between any two
//! currencies, directly from stored rates or by inferring them across a
//! graph of stored and live provider rates.
//!
//! # Features
//!
//! - Direct lookups served from the rate store
//! - Multi-hop inference by best-path search over `-ln(rate)` weights
//! - Per-day graph caching with a TTL and single-flight rebuilds
//! - Confidence decay for aged rates
//! - Rate history, averages and trends
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ratemesh_fx::{InMemoryProviderRegistry, InMemoryRateStore, RateGraphConfig, RateGraphEngine};
//! use rust_decimal_macros::dec;
//!
//! let engine = RateGraphEngine::new(
//!     Arc::new(InMemoryRateStore::new()),
//!     Arc::new(InMemoryProviderRegistry::new()),
//!     RateGraphConfig::default(),
//! );
//!
//! // Current rate, inferred if need be
//! let rate = engine.latest_rate("BTC", "USD").await;
//!
//! // Convert amount
//! let usd = engine.convert(dec!(0.5), "BTC", "USD", None).await?;
//! ```

pub mod analytics;
pub mod builder;
pub mod cache;
pub mod config;
pub mod conversion;
pub mod edge;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pathfinder;
pub mod provider;
pub mod source;
pub mod store;

pub use analytics::{AverageRate, HistoricalRate, HistoryQuery, RateHistory, RateTrend, Trend, TrendPoint};
pub use builder::GraphBuilder;
pub use cache::{GraphCache, GraphCacheStats};
pub use config::{ConversionFallback, RateGraphConfig};
pub use conversion::Conversion;
pub use edge::{RateEdge, Provenance};
pub use engine::{AvailablePaths, RateGraphEngine, RateQuery, RateResult};
pub use error::{FxError, FxResult};
pub use graph::RateGraph;
pub use pathfinder::{find_all_paths, find_best_path, PathOptions, PathResult, SearchLimits};
pub use provider::{
    InMemoryProviderRegistry, ProviderInfo, ProviderKind, ProviderRegistry, QuoteMap, QuoteValue,
    RateSource,
};
pub use source::StaticRateSource;
pub use store::{InMemoryRateStore, RateStore, StoredRate};

#[cfg(any(test, feature = "test-utils"))]
pub use provider::MockRateSource;
