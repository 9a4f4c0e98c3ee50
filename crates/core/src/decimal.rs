//! Decimal helpers for money and percentage math.
//!
//! All monetary pipelines run internally at scale 6 and round half-up to
//! scale 2 only at the declared rounding point (final fee, stored ledger
//! value). Never round intermediates.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Round half-up to 2 decimal places (the storage scale for money).
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round half-up to 6 decimal places (the internal computation scale).
pub fn round6(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero)
}

/// A percentage in (0, 100].
///
/// Used by the output-value decomposition where each level must sum to 100.
/// Constructed through `new` so an out-of-range value can never circulate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percent(Decimal);

impl Percent {
    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value <= Decimal::ZERO || value > Decimal::from(100) {
            return Err(DomainError::invalid_configuration(format!(
                "percentage must be in (0, 100], got {value}"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Sum a slice of percentages (for the Σ = 100 invariant checks).
    pub fn sum(parts: &[Percent]) -> Decimal {
        parts.iter().map(|p| p.0).sum()
    }
}

impl core::fmt::Display for Percent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl TryFrom<u32> for Percent {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(Decimal::from(value))
    }
}
