//! Historical rate series and their summaries.
//!
//! Every sample is an ordinary rate lookup evaluated at a past day, so
//! history benefits from the same stored-rate shortcut and per-day graph
//! cache as live queries.

use chrono::Duration;
use ratemesh_common::{day_key, day_steps, CurrencyCode, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::{RateGraphEngine, RateQuery};
use crate::error::{FxError, FxResult};

/// Movement of a rate over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

impl Trend {
    /// Classify a percentage change; anything within ±1% is stable.
    pub fn from_change(change_percent: f64) -> Self {
        if change_percent > 1.0 {
            Trend::Up
        } else if change_percent < -1.0 {
            Trend::Down
        } else {
            Trend::Stable
        }
    }
}

/// Window and size of a history request. Unset fields use engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub from_date: Option<Timestamp>,
    pub to_date: Option<Timestamp>,
    pub limit: Option<usize>,
}

/// One day's rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: f64,
    /// Day the rate was evaluated for.
    pub date: Timestamp,
    /// Timestamp carried by the resolved rate.
    pub fetched_at: Timestamp,
    /// Where the rate came from.
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateHistory {
    /// Oldest first.
    pub rates: Vec<HistoricalRate>,
    pub total: usize,
}

/// Summary of the rates found over a date range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AverageRate {
    pub average_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: Timestamp,
    pub rate: f64,
}

/// Direction and spread of a rate over the last few days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTrend {
    pub min_rate: f64,
    pub max_rate: f64,
    pub avg_rate: f64,
    pub trend: Trend,
    /// First to last sample, rounded to two decimal places.
    pub change_percent: f64,
    pub history: Vec<TrendPoint>,
}

impl RateTrend {
    fn empty() -> Self {
        Self {
            min_rate: 0.0,
            max_rate: 0.0,
            avg_rate: 0.0,
            trend: Trend::Stable,
            change_percent: 0.0,
            history: Vec::new(),
        }
    }
}

/// Round half away from zero to `places` decimals.
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Min, max and mean of a non-empty sample.
fn summarize(samples: &[f64]) -> Option<(f64, f64, f64)> {
    if samples.is_empty() {
        return None;
    }
    let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
    let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    Some((min, max, mean))
}

fn check_range(from_date: Timestamp, to_date: Timestamp) -> FxResult<()> {
    if from_date > to_date {
        return Err(FxError::InvalidDateRange {
            from: day_key(from_date),
            to: day_key(to_date),
        });
    }
    Ok(())
}

impl RateGraphEngine {
    /// Daily rates for a pair, oldest first.
    ///
    /// Days without a rate are skipped; at most `limit` days are evaluated.
    #[instrument(skip(self, from, to))]
    pub async fn get_rate_history(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        query: HistoryQuery,
    ) -> FxResult<RateHistory> {
        let (from, to) = (from.into(), to.into());
        let now = self.now();
        let from_date = query
            .from_date
            .unwrap_or_else(|| now - Duration::days(self.config().history_days));
        let to_date = query.to_date.unwrap_or(now);
        let limit = query.limit.unwrap_or(self.config().history_limit);
        check_range(from_date, to_date)?;

        let mut rates = Vec::new();
        for date in day_steps(from_date, to_date).take(limit) {
            let Some(result) = self
                .resolve_rate(from.clone(), to.clone(), RateQuery::at(date))
                .await
            else {
                continue;
            };

            rates.push(HistoricalRate {
                from: from.clone(),
                to: to.clone(),
                rate: result.rate,
                date,
                fetched_at: result.timestamp,
                source: result.source,
            });
        }

        debug!(from = %from, to = %to, samples = rates.len(), "Collected rate history");

        Ok(RateHistory {
            total: rates.len(),
            rates,
        })
    }

    /// Average, minimum and maximum daily rate between two dates.
    ///
    /// Values are rounded to eight decimal places. A range with no rates
    /// reports zeros.
    #[instrument(skip(self, from, to))]
    pub async fn get_average_rate(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        from_date: Timestamp,
        to_date: Timestamp,
    ) -> FxResult<AverageRate> {
        let (from, to) = (from.into(), to.into());
        check_range(from_date, to_date)?;

        let mut samples = Vec::new();
        for date in day_steps(from_date, to_date) {
            if let Some(result) = self
                .resolve_rate(from.clone(), to.clone(), RateQuery::at(date))
                .await
            {
                if result.rate > 0.0 {
                    samples.push(result.rate);
                }
            }
        }

        let Some((min, max, mean)) = summarize(&samples) else {
            return Ok(AverageRate {
                average_rate: 0.0,
                min_rate: 0.0,
                max_rate: 0.0,
                sample_count: 0,
            });
        };

        Ok(AverageRate {
            average_rate: round_to(mean, 8),
            min_rate: round_to(min, 8),
            max_rate: round_to(max, 8),
            sample_count: samples.len(),
        })
    }

    /// Trend of a pair over the last `days` days.
    ///
    /// Compares the first and last sample; a change beyond ±1% is a trend.
    #[instrument(skip(self, from, to))]
    pub async fn get_rate_trend(
        &self,
        from: impl Into<CurrencyCode>,
        to: impl Into<CurrencyCode>,
        days: u32,
    ) -> FxResult<RateTrend> {
        let now = self.now();
        let history = self
            .get_rate_history(
                from,
                to,
                HistoryQuery {
                    from_date: Some(now - Duration::days(i64::from(days))),
                    to_date: Some(now),
                    limit: Some(days as usize),
                },
            )
            .await?;

        let samples: Vec<f64> = history.rates.iter().map(|r| r.rate).collect();
        let Some((min, max, mean)) = summarize(&samples) else {
            return Ok(RateTrend::empty());
        };

        let (first, last) = (samples[0], samples[samples.len() - 1]);
        let change_percent = if first != 0.0 {
            (last - first) / first * 100.0
        } else {
            0.0
        };

        Ok(RateTrend {
            min_rate: round_to(min, 8),
            max_rate: round_to(max, 8),
            avg_rate: round_to(mean, 8),
            trend: Trend::from_change(change_percent),
            change_percent: round_to(change_percent, 2),
            history: history
                .rates
                .into_iter()
                .map(|r| TrendPoint {
                    date: r.date,
                    rate: r.rate,
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateGraphConfig;
    use crate::provider::InMemoryProviderRegistry;
    use crate::store::{InMemoryRateStore, StoredRate};
    use chrono::{NaiveDate, TimeZone, Utc};
    use ratemesh_common::{ManualClock, ProviderId};
    use std::sync::Arc;

    fn now() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 3, d, 12, 0, 0).unwrap()
    }

    fn usd_eur(d: u32, rate: f64) -> StoredRate {
        StoredRate {
            from: CurrencyCode::usd(),
            to: CurrencyCode::eur(),
            rate,
            date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
            fetched_at: day(d),
            provider_id: ProviderId::new("ecb"),
        }
    }

    fn engine(rates: Vec<StoredRate>) -> RateGraphEngine {
        RateGraphEngine::with_clock(
            Arc::new(InMemoryRateStore::with_rates(rates)),
            Arc::new(InMemoryProviderRegistry::new()),
            Arc::new(ManualClock::new(now())),
            RateGraphConfig::default(),
        )
    }

    #[test]
    fn test_trend_thresholds() {
        assert_eq!(Trend::from_change(1.5), Trend::Up);
        assert_eq!(Trend::from_change(-2.0), Trend::Down);
        assert_eq!(Trend::from_change(1.0), Trend::Stable);
        assert_eq!(Trend::from_change(-0.4), Trend::Stable);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.333333, 2), 3.33);
        assert_eq!(round_to(0.913333333333, 8), 0.91333333);
        assert_eq!(round_to(-1.005001, 2), -1.01);
    }

    #[tokio::test]
    async fn test_history_skips_days_without_rates() {
        let engine = engine(vec![usd_eur(20, 0.90), usd_eur(22, 0.92)]);

        let history = engine
            .get_rate_history(
                "USD",
                "EUR",
                HistoryQuery {
                    from_date: Some(day(18)),
                    to_date: Some(day(23)),
                    limit: None,
                },
            )
            .await
            .unwrap();

        // 18 and 19 predate every stored rate; 21 and 23 fall back to the
        // latest rate on or before the day.
        let rates: Vec<f64> = history.rates.iter().map(|r| r.rate).collect();
        assert_eq!(rates, vec![0.90, 0.90, 0.92, 0.92]);
        assert_eq!(history.total, 4);
        assert_eq!(history.rates[0].date, day(20));
        assert_eq!(history.rates[0].source, "unknown");
    }

    #[tokio::test]
    async fn test_history_respects_limit_and_defaults() {
        let engine = engine(vec![usd_eur(1, 0.90)]);

        let limited = engine
            .get_rate_history(
                "USD",
                "EUR",
                HistoryQuery {
                    limit: Some(5),
                    ..HistoryQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(limited.total, 5);
        // Default window starts 30 days back.
        assert_eq!(limited.rates[0].date, day(1));
    }

    #[tokio::test]
    async fn test_reversed_range_is_rejected() {
        let engine = engine(Vec::new());

        let history = engine
            .get_rate_history(
                "USD",
                "EUR",
                HistoryQuery {
                    from_date: Some(day(10)),
                    to_date: Some(day(5)),
                    limit: None,
                },
            )
            .await;
        assert!(matches!(history, Err(FxError::InvalidDateRange { .. })));

        let average = engine.get_average_rate("USD", "EUR", day(10), day(5)).await;
        assert!(matches!(average, Err(FxError::InvalidDateRange { .. })));
    }

    #[tokio::test]
    async fn test_average_rate() {
        let engine = engine(vec![usd_eur(28, 0.90), usd_eur(29, 0.91), usd_eur(30, 0.93)]);

        let average = engine
            .get_average_rate("USD", "EUR", day(28), day(30))
            .await
            .unwrap();
        assert_eq!(average.sample_count, 3);
        assert_eq!(average.min_rate, 0.90);
        assert_eq!(average.max_rate, 0.93);
        assert!((average.average_rate - 0.91333333).abs() < 1e-12);

        let empty = engine
            .get_average_rate("USD", "GBP", day(28), day(30))
            .await
            .unwrap();
        assert_eq!(empty.sample_count, 0);
        assert_eq!(empty.average_rate, 0.0);
    }

    #[tokio::test]
    async fn test_rate_trend() {
        let engine = engine(vec![usd_eur(28, 0.90), usd_eur(29, 0.91), usd_eur(30, 0.93)]);

        let trend = engine.get_rate_trend("USD", "EUR", 3).await.unwrap();
        assert_eq!(trend.trend, Trend::Up);
        assert_eq!(trend.change_percent, 3.33);
        assert_eq!(trend.min_rate, 0.90);
        assert_eq!(trend.max_rate, 0.93);
        assert_eq!(trend.history.len(), 3);
        assert_eq!(trend.history[0].date, day(28));
    }

    #[tokio::test]
    async fn test_trend_without_data_is_stable() {
        let engine = engine(Vec::new());

        let trend = engine.get_rate_trend("USD", "JPY", 7).await.unwrap();
        assert_eq!(trend.trend, Trend::Stable);
        assert_eq!(trend.change_percent, 0.0);
        assert!(trend.history.is_empty());
    }
}
