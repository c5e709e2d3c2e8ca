//! Simulation scenarios.

use std::path::Path;

use anyhow::Context;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use ratemesh_common::{CurrencyCode, ProviderId, Timestamp};
use ratemesh_fx::{ProviderInfo, ProviderKind, StaticRateSource, StoredRate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Simulated time at the start; wall-clock time when absent.
    #[serde(default)]
    pub start: Option<Timestamp>,
    /// Rates already persisted when the scenario starts.
    #[serde(default)]
    pub stored_rates: Vec<StoredRate>,
    /// Configured providers.
    #[serde(default)]
    pub providers: Vec<ScenarioProvider>,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A provider and, for plugin providers, its quote table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioProvider {
    pub id: String,
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub currencies: Vec<CurrencyCode>,
    #[serde(default)]
    pub quotes: Option<StaticRateSource>,
}

fn default_active() -> bool {
    true
}

fn default_tolerance() -> f64 {
    1e-9
}

impl ScenarioProvider {
    pub fn info(&self) -> ProviderInfo {
        let info = ProviderInfo::new(ProviderId::new(self.id.clone()), self.name.clone(), self.kind)
            .with_currencies(self.currencies.iter().cloned());
        if self.active {
            info
        } else {
            info.inactive()
        }
    }
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Look up the current rate.
    LatestRate {
        from: CurrencyCode,
        to: CurrencyCode,
        #[serde(default)]
        provider: Option<String>,
    },
    /// Look up the rate for a past day.
    RateAt {
        from: CurrencyCode,
        to: CurrencyCode,
        date: NaiveDate,
    },
    /// Convert an amount at the current rate.
    Convert {
        amount: Decimal,
        from: CurrencyCode,
        to: CurrencyCode,
    },
    /// List alternative paths.
    Paths { from: CurrencyCode, to: CurrencyCode },
    /// Daily history over the last `days` days.
    History {
        from: CurrencyCode,
        to: CurrencyCode,
        days: i64,
    },
    /// Average over a closed range of days.
    Average {
        from: CurrencyCode,
        to: CurrencyCode,
        from_date: NaiveDate,
        to_date: NaiveDate,
    },
    /// Trend over the last `days` days.
    Trend {
        from: CurrencyCode,
        to: CurrencyCode,
        days: u32,
    },
    /// Issue `count` concurrent lookups for the same pair.
    Burst {
        from: CurrencyCode,
        to: CurrencyCode,
        count: usize,
    },
    /// Move simulated time forward.
    AdvanceClock { minutes: i64 },
    /// Drop all cached graphs.
    ClearCache,
    /// Assert the current rate for a pair.
    ExpectRate {
        from: CurrencyCode,
        to: CurrencyCode,
        rate: f64,
        #[serde(default = "default_tolerance")]
        tolerance: f64,
    },
    /// Assert that no rate can be found for a pair.
    ExpectNoRate { from: CurrencyCode, to: CurrencyCode },
    /// Assert the number of cached graphs.
    ExpectCacheSize { size: usize },
}

/// Start of a day, in UTC.
pub fn start_of(date: NaiveDate) -> Timestamp {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

impl Scenario {
    /// Names of the built-in scenarios.
    pub const BUILT_IN: [&'static str; 3] = ["crypto-bridge", "fiat-history", "cache-expiry"];

    /// Load a scenario by name.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "crypto-bridge" => Ok(Self::crypto_bridge()),
            "fiat-history" => Ok(Self::fiat_history()),
            "cache-expiry" => Ok(Self::cache_expiry()),
            _ => Err(anyhow::anyhow!("Unknown scenario: {}", name)),
        }
    }

    /// Load a scenario from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse scenario {}", path.display()))
    }

    fn start_time() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    fn stored(from: &str, to: &str, rate: f64, date: NaiveDate, fetched_at: Timestamp) -> StoredRate {
        StoredRate {
            from: from.into(),
            to: to.into(),
            rate,
            date,
            fetched_at,
            provider_id: ProviderId::new("ecb"),
        }
    }

    fn ecb() -> ScenarioProvider {
        ScenarioProvider {
            id: "ecb".to_string(),
            name: "European Central Bank".to_string(),
            kind: ProviderKind::Rest,
            active: true,
            currencies: vec![CurrencyCode::usd(), CurrencyCode::eur(), CurrencyCode::gbp()],
            quotes: None,
        }
    }

    fn pair(from: &str, to: &str) -> (CurrencyCode, CurrencyCode) {
        (from.into(), to.into())
    }

    /// Crypto rates bridged to fiat through stablecoins.
    fn crypto_bridge() -> Self {
        let start = Self::start_time();
        let today = start.date_naive();
        let quotes = StaticRateSource::default()
            .with_quote("USD/USDT", "1.0")
            .with_quote("SOL/USD", 145.2);

        let (btc, usd) = Self::pair("BTC", "USD");
        let (eth, eur) = Self::pair("ETH", "EUR");

        Self {
            name: "crypto-bridge".to_string(),
            description: "Multi-hop crypto to fiat inference through a stablecoin".to_string(),
            start: Some(start),
            stored_rates: vec![
                Self::stored("BTC", "ETH", 15.0, today, start - Duration::minutes(5)),
                Self::stored("ETH", "USDT", 2000.0, today, start - Duration::minutes(10)),
                Self::stored("USD", "EUR", 0.92, today, start - Duration::minutes(30)),
            ],
            providers: vec![
                Self::ecb(),
                ScenarioProvider {
                    id: "chain".to_string(),
                    name: "Chain Oracle".to_string(),
                    kind: ProviderKind::Plugin,
                    active: true,
                    currencies: vec!["USDT".into(), "SOL".into()],
                    quotes: Some(quotes),
                },
            ],
            steps: vec![
                ScenarioStep::LatestRate {
                    from: btc.clone(),
                    to: usd.clone(),
                    provider: None,
                },
                ScenarioStep::ExpectRate {
                    from: btc.clone(),
                    to: usd.clone(),
                    rate: 30000.0,
                    tolerance: 1e-6,
                },
                ScenarioStep::ExpectRate {
                    from: eth.clone(),
                    to: eur.clone(),
                    rate: 1840.0,
                    tolerance: 1e-6,
                },
                ScenarioStep::Convert {
                    amount: Decimal::new(25, 1),
                    from: btc.clone(),
                    to: eur,
                },
                ScenarioStep::Paths {
                    from: btc.clone(),
                    to: usd.clone(),
                },
                ScenarioStep::ExpectNoRate {
                    from: usd.clone(),
                    to: "SOL".into(),
                },
                ScenarioStep::Burst {
                    from: btc,
                    to: usd,
                    count: 16,
                },
                ScenarioStep::ExpectCacheSize { size: 1 },
            ],
        }
    }

    /// A week of daily fiat rates.
    fn fiat_history() -> Self {
        let start = Self::start_time();
        let closes = [1.0712, 1.0745, 1.0781, 1.0803, 1.0850, 1.0874, 1.0902];
        let stored_rates = closes
            .iter()
            .enumerate()
            .map(|(offset, close)| {
                let fetched = start - Duration::days(7 - offset as i64);
                Self::stored("EUR", "USD", *close, fetched.date_naive(), fetched)
            })
            .collect();

        let (eur, usd) = Self::pair("EUR", "USD");

        Self {
            name: "fiat-history".to_string(),
            description: "Daily EUR/USD closes with history, average and trend".to_string(),
            start: Some(start),
            stored_rates,
            providers: vec![Self::ecb()],
            steps: vec![
                ScenarioStep::History {
                    from: eur.clone(),
                    to: usd.clone(),
                    days: 7,
                },
                ScenarioStep::Average {
                    from: eur.clone(),
                    to: usd.clone(),
                    from_date: (start - Duration::days(7)).date_naive(),
                    to_date: (start - Duration::days(1)).date_naive(),
                },
                ScenarioStep::Trend {
                    from: eur.clone(),
                    to: usd.clone(),
                    days: 7,
                },
                ScenarioStep::RateAt {
                    from: eur.clone(),
                    to: usd.clone(),
                    date: (start - Duration::days(3)).date_naive(),
                },
                // Today has no close yet: the newest earlier one is used.
                ScenarioStep::ExpectRate {
                    from: eur,
                    to: usd,
                    rate: 1.0902,
                    tolerance: 1e-9,
                },
            ],
        }
    }

    /// Graph reuse inside the TTL and rebuild after it.
    fn cache_expiry() -> Self {
        let start = Self::start_time();
        let quotes = StaticRateSource::default()
            .with_quote("GBP/USD", 1.27)
            .with_quote("USD/JPY", 157.1);

        // Live quotes only reach the anchor; the stored rate bridges back out.

        let (gbp, jpy) = Self::pair("GBP", "JPY");

        Self {
            name: "cache-expiry".to_string(),
            description: "Graph cache hits within the TTL and rebuilds after it".to_string(),
            start: Some(start),
            stored_rates: vec![Self::stored(
                "USD",
                "JPY",
                157.0,
                start.date_naive(),
                start - Duration::hours(2),
            )],
            providers: vec![ScenarioProvider {
                id: "fxdesk".to_string(),
                name: "FX Desk".to_string(),
                kind: ProviderKind::Plugin,
                active: true,
                currencies: vec![CurrencyCode::gbp(), "JPY".into()],
                quotes: Some(quotes),
            }],
            steps: vec![
                ScenarioStep::ExpectRate {
                    from: gbp.clone(),
                    to: jpy.clone(),
                    rate: 1.27 * 157.0,
                    tolerance: 1e-9,
                },
                ScenarioStep::AdvanceClock { minutes: 4 },
                ScenarioStep::LatestRate {
                    from: gbp.clone(),
                    to: jpy.clone(),
                    provider: Some("fxdesk".to_string()),
                },
                ScenarioStep::ExpectCacheSize { size: 2 },
                ScenarioStep::AdvanceClock { minutes: 2 },
                ScenarioStep::LatestRate {
                    from: gbp,
                    to: jpy,
                    provider: None,
                },
                ScenarioStep::ClearCache,
                ScenarioStep::ExpectCacheSize { size: 0 },
            ],
        }
    }
}
