//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use ratemesh_common::{Clock, CurrencyCode, ManualClock, ProviderId};
use ratemesh_fx::{
    GraphCacheStats, HistoryQuery, InMemoryProviderRegistry, InMemoryRateStore, RateGraphConfig,
    RateGraphEngine, RateQuery, RateResult,
};

use crate::metrics::SimulationMetrics;
use crate::scenario::{start_of, Scenario, ScenarioStep};

/// Runs a scenario against an engine on simulated time.
pub struct SimulationController {
    engine: Arc<RateGraphEngine>,
    clock: Arc<ManualClock>,
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Seed a store and registry from the scenario and start an engine.
    pub fn new(scenario: &Scenario, config: RateGraphConfig) -> Self {
        let clock = Arc::new(ManualClock::new(scenario.start.unwrap_or_else(Utc::now)));

        let store = Arc::new(InMemoryRateStore::with_rates(scenario.stored_rates.iter().cloned()));

        let registry = Arc::new(InMemoryProviderRegistry::new());
        for provider in &scenario.providers {
            match &provider.quotes {
                Some(quotes) => registry.register_with_source(provider.info(), Arc::new(quotes.clone())),
                None => registry.register(provider.info()),
            }
        }

        info!(
            stored_rates = store.len(),
            providers = registry.len(),
            "Initialized simulation"
        );

        let engine = RateGraphEngine::with_clock(store, registry, clock.clone(), config);

        Self {
            engine: Arc::new(engine),
            clock,
            metrics: SimulationMetrics::new(),
        }
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<()> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);

        for (index, step) in scenario.steps.iter().enumerate() {
            self.execute_step(step)
                .await
                .map_err(|e| e.context(format!("step {} failed", index + 1)))?;
        }

        Ok(())
    }

    /// Execute a single scenario step.
    async fn execute_step(&mut self, step: &ScenarioStep) -> anyhow::Result<()> {
        match step {
            ScenarioStep::LatestRate { from, to, provider } => {
                let mut query = RateQuery::latest();
                if let Some(id) = provider {
                    query = query.from_provider(ProviderId::new(id.clone()));
                }
                let started = Instant::now();
                let result = self.engine.get_rate(from.clone(), to.clone(), query).await;
                self.record_lookup(&result, started);
                report_rate(from, to, result.as_ref());
            }
            ScenarioStep::RateAt { from, to, date } => {
                let started = Instant::now();
                let result = self
                    .engine
                    .rate_at(from.clone(), to.clone(), start_of(*date))
                    .await;
                self.record_lookup(&result, started);
                report_rate(from, to, result.as_ref());
            }
            ScenarioStep::Convert { amount, from, to } => {
                let conversion = self
                    .engine
                    .convert(*amount, from.clone(), to.clone(), None)
                    .await?;
                if conversion.fallback {
                    self.metrics.record_fallback();
                }
                info!(
                    "Converted {} {} -> {} {} (rate {}, fallback {})",
                    conversion.amount,
                    conversion.from,
                    conversion.converted_amount,
                    conversion.to,
                    conversion.rate,
                    conversion.fallback
                );
            }
            ScenarioStep::Paths { from, to } => {
                let available = self
                    .engine
                    .get_available_paths(from.clone(), to.clone(), None)
                    .await;
                info!("{} path(s) from {} to {}", available.total_paths, from, to);
                for found in &available.paths {
                    let route: Vec<String> = found.path.iter().map(|c| c.to_string()).collect();
                    info!("  {} = {}", route.join(" -> "), found.total_rate);
                }
            }
            ScenarioStep::History { from, to, days } => {
                let now = self.clock.now();
                let history = self
                    .engine
                    .get_rate_history(
                        from.clone(),
                        to.clone(),
                        HistoryQuery {
                            from_date: Some(now - Duration::days(*days)),
                            to_date: Some(now),
                            limit: None,
                        },
                    )
                    .await?;
                info!("{} daily rate(s) for {}/{}", history.total, from, to);
                for point in &history.rates {
                    info!("  {} {} ({})", point.date.date_naive(), point.rate, point.source);
                }
            }
            ScenarioStep::Average {
                from,
                to,
                from_date,
                to_date,
            } => {
                let average = self
                    .engine
                    .get_average_rate(from.clone(), to.clone(), start_of(*from_date), start_of(*to_date))
                    .await?;
                info!(
                    "Average {}/{} {}..{}: {} (min {}, max {}, {} samples)",
                    from,
                    to,
                    from_date,
                    to_date,
                    average.average_rate,
                    average.min_rate,
                    average.max_rate,
                    average.sample_count
                );
            }
            ScenarioStep::Trend { from, to, days } => {
                let trend = self.engine.get_rate_trend(from.clone(), to.clone(), *days).await?;
                info!(
                    "Trend {}/{} over {} day(s): {:?} {}%",
                    from, to, days, trend.trend, trend.change_percent
                );
            }
            ScenarioStep::Burst { from, to, count } => {
                let started = Instant::now();
                let lookups = (0..*count).map(|_| {
                    let engine = self.engine.clone();
                    let (from, to) = (from.clone(), to.clone());
                    tokio::spawn(async move { engine.latest_rate(from, to).await })
                });
                let results = futures::future::join_all(lookups).await;

                let mut resolved = 0;
                for result in results {
                    let result = result?;
                    if result.is_some() {
                        resolved += 1;
                    }
                    self.record_lookup(&result, started);
                }
                info!(
                    "Burst of {} lookups for {}/{}: {} resolved",
                    count, from, to, resolved
                );
            }
            ScenarioStep::AdvanceClock { minutes } => {
                self.clock.advance(Duration::minutes(*minutes));
                info!("Clock advanced {} minute(s) to {}", minutes, self.clock.now());
            }
            ScenarioStep::ClearCache => {
                self.engine.clear_cache();
            }
            ScenarioStep::ExpectRate {
                from,
                to,
                rate,
                tolerance,
            } => {
                let found = self.engine.latest_rate(from.clone(), to.clone()).await;
                let passed = found
                    .as_ref()
                    .map(|r| (r.rate - rate).abs() <= *tolerance)
                    .unwrap_or(false);
                self.metrics.record_expectation(passed);
                if !passed {
                    warn!(
                        "Expected {}/{} = {}, got {:?}",
                        from,
                        to,
                        rate,
                        found.map(|r| r.rate)
                    );
                }
            }
            ScenarioStep::ExpectNoRate { from, to } => {
                let found = self.engine.latest_rate(from.clone(), to.clone()).await;
                self.metrics.record_expectation(found.is_none());
                if let Some(found) = found {
                    warn!("Expected no rate for {}/{}, got {}", from, to, found.rate);
                }
            }
            ScenarioStep::ExpectCacheSize { size } => {
                let stats = self.engine.cache_stats();
                let passed = stats.size == *size;
                self.metrics.record_expectation(passed);
                if !passed {
                    warn!("Expected {} cached graph(s), found {:?}", size, stats.keys);
                }
            }
        }

        Ok(())
    }

    fn record_lookup(&mut self, result: &Option<RateResult>, started: Instant) {
        match result {
            Some(found) => self.metrics.record_resolved(found.is_inferred, started.elapsed()),
            None => self.metrics.record_unresolved(started.elapsed()),
        }
    }

    /// Get simulation metrics.
    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    pub fn cache_stats(&self) -> GraphCacheStats {
        self.engine.cache_stats()
    }
}

fn report_rate(from: &CurrencyCode, to: &CurrencyCode, result: Option<&RateResult>) {
    match result {
        Some(found) => {
            let route: Vec<String> = found.path.iter().map(|c| c.to_string()).collect();
            info!(
                "{}/{} = {} via {} [{}] ({} hop(s), inferred: {})",
                from,
                to,
                found.rate,
                route.join(" -> "),
                found.source,
                found.hops,
                found.is_inferred
            );
        }
        None => info!("{}/{}: no rate available", from, to),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn run(name: &str) -> SimulationController {
        let scenario = Scenario::load(name).unwrap();
        let mut controller = SimulationController::new(&scenario, RateGraphConfig::default());
        controller.run_scenario(&scenario).await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_crypto_bridge_expectations_hold() {
        let controller = run("crypto-bridge").await;
        let metrics = controller.metrics();

        assert_eq!(metrics.expectations_failed, 0);
        assert_eq!(metrics.expectations_passed, 4);
        // One lookup plus a burst of sixteen, all inferred.
        assert_eq!(metrics.resolved_queries, 17);
        assert_eq!(metrics.inferred_queries, 17);
        assert_eq!(controller.cache_stats().keys, vec!["2024-06-10".to_string()]);
    }

    #[tokio::test]
    async fn test_fiat_history_expectations_hold() {
        let controller = run("fiat-history").await;
        assert_eq!(controller.metrics().expectations_failed, 0);
        assert_eq!(controller.metrics().expectations_passed, 1);
    }

    #[tokio::test]
    async fn test_cache_expiry_expectations_hold() {
        let controller = run("cache-expiry").await;
        assert_eq!(controller.metrics().expectations_failed, 0);
        assert_eq!(controller.metrics().expectations_passed, 3);
        assert_eq!(controller.cache_stats().size, 0);
    }

    #[tokio::test]
    async fn test_strict_conversion_fails_the_step() {
        let scenario: Scenario = serde_json::from_str(
            r#"{
                "name": "strict",
                "start": "2024-06-10T12:00:00Z",
                "steps": [{"action": "convert", "amount": "10", "from": "XAU", "to": "USD"}]
            }"#,
        )
        .unwrap();

        let mut controller = SimulationController::new(&scenario, RateGraphConfig::default());
        let err = controller.run_scenario(&scenario).await.unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }
}
