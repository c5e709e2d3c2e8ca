//! Persisted rate store interface.

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::RwLock;
use ratemesh_common::{CurrencyCode, ProviderId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::FxResult;

/// A previously fetched rate, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRate {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: f64,
    /// Business day the rate applies to.
    pub date: NaiveDate,
    /// When the rate was fetched from its provider.
    pub fetched_at: Timestamp,
    pub provider_id: ProviderId,
}

/// Read access to persisted rates.
#[async_trait]
pub trait RateStore: Send + Sync {
    /// Rate stored for exactly this pair and day.
    async fn find(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: NaiveDate,
    ) -> FxResult<Option<StoredRate>>;

    /// All rates with `date <= up_to`, most recently fetched first.
    async fn find_up_to(&self, up_to: NaiveDate) -> FxResult<Vec<StoredRate>>;
}

/// Rate store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryRateStore {
    rates: RwLock<Vec<StoredRate>>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with rates.
    pub fn with_rates(rates: impl IntoIterator<Item = StoredRate>) -> Self {
        Self {
            rates: RwLock::new(rates.into_iter().collect()),
        }
    }

    /// Persist a rate.
    pub fn insert(&self, rate: StoredRate) {
        self.rates.write().push(rate);
    }

    pub fn len(&self) -> usize {
        self.rates.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.read().is_empty()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn find(
        &self,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: NaiveDate,
    ) -> FxResult<Option<StoredRate>> {
        let rates = self.rates.read();
        Ok(rates
            .iter()
            .filter(|r| &r.from == from && &r.to == to && r.date == date)
            .max_by_key(|r| r.fetched_at)
            .cloned())
    }

    async fn find_up_to(&self, up_to: NaiveDate) -> FxResult<Vec<StoredRate>> {
        let mut found: Vec<StoredRate> = self
            .rates
            .read()
            .iter()
            .filter(|r| r.date <= up_to)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn stored(from: &str, to: &str, rate: f64, day: u32, fetched_hours_ago: i64) -> StoredRate {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        StoredRate {
            from: from.into(),
            to: to.into(),
            rate,
            date: NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            fetched_at: now - Duration::hours(fetched_hours_ago),
            provider_id: ProviderId::new("ecb"),
        }
    }

    #[tokio::test]
    async fn test_find_exact_day() {
        let store = InMemoryRateStore::with_rates(vec![
            stored("USD", "EUR", 0.91, 9, 30),
            stored("USD", "EUR", 0.92, 10, 2),
        ]);

        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let found = store.find(&"USD".into(), &"EUR".into(), day).await.unwrap();
        assert_eq!(found.unwrap().rate, 0.92);

        let other = NaiveDate::from_ymd_opt(2024, 5, 8).unwrap();
        assert!(store.find(&"USD".into(), &"EUR".into(), other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_up_to_orders_newest_first() {
        let store = InMemoryRateStore::new();
        store.insert(stored("USD", "EUR", 0.91, 8, 50));
        store.insert(stored("GBP", "USD", 1.26, 9, 1));
        store.insert(stored("USD", "JPY", 151.0, 11, 0));
        store.insert(stored("USD", "EUR", 0.92, 9, 20));

        let day = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let found = store.find_up_to(day).await.unwrap();

        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].fetched_at >= w[1].fetched_at));
        assert_eq!(found[0].from, CurrencyCode::gbp());
    }
}
