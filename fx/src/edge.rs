//! Directed rate edges and freshness-based confidence.

use chrono::Duration;
use ratemesh_common::{CurrencyCode, ProviderId, Timestamp};
use serde::{Deserialize, Serialize};

use crate::error::{FxError, FxResult};

/// Where an edge's rate came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Provider that supplied the rate.
    pub provider_id: ProviderId,
    /// Display name of the provider, or `cached` for stored rates.
    pub provider_name: String,
    /// When the rate was observed or fetched.
    pub timestamp: Timestamp,
}

impl Provenance {
    pub fn new(provider_id: ProviderId, provider_name: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            provider_id,
            provider_name: provider_name.into(),
            timestamp,
        }
    }
}

/// One directed conversion fact: one unit of `from` buys `rate` units of `to`.
///
/// An edge `A -> B` says nothing about `B -> A`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEdge {
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Multiplier from `from` to `to`, always finite and positive.
    pub rate: f64,
    pub provider_id: ProviderId,
    pub provider_name: String,
    /// When the underlying rate was observed.
    pub timestamp: Timestamp,
    /// Reliability score in `[0, 1]`.
    pub confidence: f64,
}

impl RateEdge {
    /// Create an edge, rejecting non-finite or non-positive rates.
    ///
    /// Confidence is clamped into `[0, 1]`.
    pub fn new(
        from: CurrencyCode,
        to: CurrencyCode,
        rate: f64,
        provenance: Provenance,
        confidence: f64,
    ) -> FxResult<Self> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(FxError::InvalidRate { from, to, rate });
        }

        Ok(Self {
            from,
            to,
            rate,
            provider_id: provenance.provider_id,
            provider_name: provenance.provider_name,
            timestamp: provenance.timestamp,
            confidence: confidence.clamp(0.0, 1.0),
        })
    }

    /// Path-finding weight: `-ln(rate)`.
    ///
    /// Maximising a product of rates is minimising the sum of these.
    pub fn weight(&self) -> f64 {
        -self.rate.ln()
    }
}

/// Confidence of a rate observed `age` ago.
///
/// | age       | confidence |
/// |-----------|------------|
/// | < 1 hour  | 1.0        |
/// | < 6 hours | 0.9        |
/// | < 24 hours| 0.7        |
/// | < 72 hours| 0.5        |
/// | otherwise | 0.3        |
pub fn confidence_for_age(age: Duration) -> f64 {
    if age < Duration::hours(1) {
        1.0
    } else if age < Duration::hours(6) {
        0.9
    } else if age < Duration::hours(24) {
        0.7
    } else if age < Duration::hours(72) {
        0.5
    } else {
        0.3
    }
}

/// Confidence of a rate fetched at `fetched_at`, evaluated at `now`.
pub fn confidence_at(fetched_at: Timestamp, now: Timestamp) -> f64 {
    confidence_for_age(now.signed_duration_since(fetched_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn provenance() -> Provenance {
        Provenance::new(
            ProviderId::new("test"),
            "TEST",
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_edge_rejects_bad_rates() {
        for bad in [0.0, -1.5, f64::NAN, f64::INFINITY] {
            let result = RateEdge::new("USD".into(), "EUR".into(), bad, provenance(), 1.0);
            assert!(matches!(result, Err(FxError::InvalidRate { .. })), "rate {bad}");
        }
    }

    #[test]
    fn test_edge_clamps_confidence() {
        let edge = RateEdge::new("USD".into(), "EUR".into(), 0.92, provenance(), 1.7).unwrap();
        assert_eq!(edge.confidence, 1.0);
        assert_eq!(edge.provider_name, "TEST");
    }

    #[test]
    fn test_weight_is_negative_log() {
        let edge = RateEdge::new("BTC".into(), "USD".into(), 100.0, provenance(), 1.0).unwrap();
        assert!((edge.weight() + 100f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_confidence_breakpoints() {
        let cases = [
            (Duration::zero(), 1.0),
            (Duration::minutes(59), 1.0),
            (Duration::minutes(61), 0.9),
            (Duration::hours(6) - Duration::seconds(1), 0.9),
            (Duration::hours(6), 0.7),
            (Duration::hours(24) - Duration::seconds(1), 0.7),
            (Duration::hours(24), 0.5),
            (Duration::hours(72) - Duration::seconds(1), 0.5),
            (Duration::hours(72), 0.3),
            (Duration::days(365), 0.3),
        ];

        for (age, expected) in cases {
            assert_eq!(confidence_for_age(age), expected, "age {age}");
        }
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(confidence_at(now + Duration::minutes(5), now), 1.0);
        assert_eq!(confidence_at(now - Duration::minutes(61), now), 0.9);
    }
}
