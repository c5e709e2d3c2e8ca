//! Rate graph engine configuration.

use chrono::Duration;
use ratemesh_common::{constants, CurrencyCode};
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};
use crate::pathfinder::{PathOptions, SearchLimits};

/// What `convert` does when no rate can be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionFallback {
    /// Fail with `FxError::RateNotAvailable`.
    #[default]
    Strict,
    /// Convert 1:1 and mark the result as a fallback.
    Identity,
}

impl std::str::FromStr for ConversionFallback {
    type Err = FxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "identity" => Ok(Self::Identity),
            other => Err(FxError::Config(format!(
                "Unknown conversion fallback: {}",
                other
            ))),
        }
    }
}

/// Configuration for the rate graph engine.
#[derive(Debug, Clone)]
pub struct RateGraphConfig {
    /// Lifetime of a built graph.
    pub cache_ttl: Duration,
    /// Fiat pivots that plugin quotes are normalised against.
    pub anchor_bases: Vec<CurrencyCode>,
    /// Confidence assigned to freshly fetched provider rates.
    pub live_rate_confidence: f64,
    /// Best-path search limits.
    pub best_path: PathOptions,
    /// Path enumeration limits.
    pub all_paths: SearchLimits,
    /// Default history look-back in days.
    pub history_days: i64,
    /// Default cap on history samples.
    pub history_limit: usize,
    /// Behaviour of `convert` when no rate exists.
    pub conversion_fallback: ConversionFallback,
}

impl Default for RateGraphConfig {
    fn default() -> Self {
        Self {
            cache_ttl: constants::graph_cache_ttl(),
            anchor_bases: vec![
                CurrencyCode::usd(),
                CurrencyCode::eur(),
                CurrencyCode::gbp(),
                CurrencyCode::cny(),
            ],
            live_rate_confidence: 0.95,
            best_path: PathOptions::default(),
            all_paths: SearchLimits::default(),
            history_days: constants::history_window().num_days(),
            history_limit: 100,
            conversion_fallback: ConversionFallback::default(),
        }
    }
}

impl RateGraphConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> FxResult<Self> {
        let mut config = Self::default();

        if let Ok(secs) = std::env::var("RATEMESH_CACHE_TTL_SECS") {
            let secs: i64 = secs
                .parse()
                .map_err(|_| FxError::Config(format!("Invalid RATEMESH_CACHE_TTL_SECS: {}", secs)))?;
            let max_secs = constants::max_graph_cache_ttl().num_seconds();
            if !(1..=max_secs).contains(&secs) {
                return Err(FxError::Config(format!(
                    "RATEMESH_CACHE_TTL_SECS must be between 1 and {}, got {}",
                    max_secs, secs
                )));
            }
            config.cache_ttl = Duration::seconds(secs);
        }

        if let Ok(bases) = std::env::var("RATEMESH_ANCHOR_BASES") {
            config.anchor_bases = bases
                .split(',')
                .filter(|b| !b.trim().is_empty())
                .map(|b| b.parse::<CurrencyCode>())
                .collect::<Result<_, _>>()?;
        }

        if let Ok(hops) = std::env::var("RATEMESH_MAX_HOPS") {
            config.best_path.max_hops = hops
                .parse()
                .map_err(|_| FxError::Config(format!("Invalid RATEMESH_MAX_HOPS: {}", hops)))?;
        }

        if let Ok(min) = std::env::var("RATEMESH_MIN_CONFIDENCE") {
            config.best_path.min_confidence = min.parse().map_err(|_| {
                FxError::Config(format!("Invalid RATEMESH_MIN_CONFIDENCE: {}", min))
            })?;
        }

        if let Ok(fallback) = std::env::var("RATEMESH_CONVERSION_FALLBACK") {
            config.conversion_fallback = fallback.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.cache_ttl <= Duration::zero() {
            return Err(FxError::Config("Cache TTL must be positive".to_string()));
        }

        if self.cache_ttl > constants::max_graph_cache_ttl() {
            return Err(FxError::Config(format!(
                "Cache TTL cannot exceed {} seconds",
                constants::max_graph_cache_ttl().num_seconds()
            )));
        }

        if self.anchor_bases.is_empty() {
            return Err(FxError::Config("At least one anchor base is required".to_string()));
        }

        if !(0.0..=1.0).contains(&self.live_rate_confidence) {
            return Err(FxError::Config(
                "Live rate confidence must be within [0, 1]".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.best_path.min_confidence) {
            return Err(FxError::Config(
                "Minimum confidence must be within [0, 1]".to_string(),
            ));
        }

        if self.best_path.max_hops == 0 || self.all_paths.max_hops == 0 {
            return Err(FxError::Config("Hop limits must be at least 1".to_string()));
        }

        if self.history_days < 0 {
            return Err(FxError::Config("History window cannot be negative".to_string()));
        }

        Ok(())
    }
}
