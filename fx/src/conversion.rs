//! Currency conversion types and operations.

use ratemesh_common::{CurrencyCode, CurrencyPair, Timestamp};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FxError, FxResult};

/// Represents a completed currency conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    /// Unique conversion ID.
    pub id: Uuid,
    pub amount: Decimal,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub converted_amount: Decimal,
    /// Rate applied, `1.0` for a fallback conversion.
    pub rate: f64,
    /// Evaluation date of the rate.
    pub date: Timestamp,
    /// Path the rate was derived along, absent for a fallback.
    pub path: Option<Vec<CurrencyCode>>,
    pub hops: Option<usize>,
    /// No rate was found and the amount was converted 1:1.
    pub fallback: bool,
    pub executed_at: Timestamp,
}

impl Conversion {
    /// Get the currency pair.
    pub fn pair(&self) -> CurrencyPair {
        CurrencyPair::new(self.from.clone(), self.to.clone())
    }

    /// Get the effective rate used.
    pub fn effective_rate(&self) -> Decimal {
        if self.amount.is_zero() {
            return Decimal::ZERO;
        }
        self.converted_amount / self.amount
    }
}

/// Multiply `amount` by a floating point rate.
///
/// The rate is carried into decimal space first; amounts are never rounded.
pub fn apply_rate(
    amount: Decimal,
    rate: f64,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> FxResult<Decimal> {
    let invalid = || FxError::InvalidRate {
        from: from.clone(),
        to: to.clone(),
        rate,
    };

    if !rate.is_finite() || rate <= 0.0 {
        return Err(invalid());
    }

    let multiplier = Decimal::from_f64(rate).ok_or_else(invalid)?;
    amount.checked_mul(multiplier).ok_or_else(invalid)
}
