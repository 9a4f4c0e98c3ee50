//! Settlement scheme model and validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use archerp_core::{DomainError, DomainResult};

/// Interpretation of the area figure used by fixed-unit pricing.
///
/// Opaque to the calculator: the facts supply one `service_area` number and
/// the collaborator decides which measurement it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaBasis {
    BuildingArea,
    GroundArea,
    Other,
}

/// Fixed pricing component: a lump sum or a unit price times area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FixedPart {
    Total { total_price: Decimal },
    Unit { unit_price: Decimal, area_basis: AreaBasis },
}

/// Settlement method. Exactly one per scheme (enforced by the enum).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum SettlementMethod {
    /// Settlement is the configured lump sum.
    FixedTotal { total_price: Decimal },
    /// Settlement is unit price × service area.
    FixedUnit { unit_price: Decimal, area_basis: AreaBasis },
    /// Rate applied to cumulative consumption; a configured tier table takes
    /// precedence over the flat rate.
    ActualCumulative { cumulative_rate: Decimal },
    /// Fixed part + actual part; optionally the fixed part is deducted from
    /// consumption before the actual rate applies.
    CombinedFixedAndActual {
        fixed: FixedPart,
        cumulative_rate: Decimal,
        deduct_fixed: bool,
    },
}

/// One tier: covers [threshold, next threshold) at `rate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tier {
    pub threshold: Decimal,
    pub rate: Decimal,
}

/// Ordered (threshold, rate) table, interpreted per scheme as segmented-sum
/// (累进) or jump-point-whole (跳点).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub tiers: Vec<Tier>,
}

impl TierTable {
    pub fn new(tiers: Vec<Tier>) -> Self {
        Self { tiers }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.tiers.is_empty() {
            return Err(DomainError::invalid_configuration("tier table is empty"));
        }
        if self.tiers[0].threshold != Decimal::ZERO {
            return Err(DomainError::invalid_configuration(
                "first tier threshold must be 0",
            ));
        }
        for pair in self.tiers.windows(2) {
            if pair[1].threshold <= pair[0].threshold {
                return Err(DomainError::invalid_configuration(format!(
                    "tier thresholds must be strictly ascending ({} then {})",
                    pair[0].threshold, pair[1].threshold
                )));
            }
        }
        for tier in &self.tiers {
            if tier.rate < Decimal::ZERO || tier.rate > Decimal::ONE {
                return Err(DomainError::invalid_configuration(format!(
                    "tier rate must be in [0, 1], got {}",
                    tier.rate
                )));
            }
        }
        Ok(())
    }
}

/// Per-unit cap line: caps one unit's share at area × cap unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitCap {
    pub unit_name: String,
    pub cap_unit_price: Decimal,
}

/// Cap configuration applied after the method computes a settlement price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CapRule {
    None,
    TotalCapAmount { amount: Decimal },
    PerUnitCap { units: Vec<UnitCap> },
}

/// The settlement pricing blueprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFeeScheme {
    pub method: SettlementMethod,
    pub cap: CapRule,
    /// 累进 table: sum of per-tier spans × rates.
    pub segmented: Option<TierTable>,
    /// 跳点 table: whole base × rate of the highest tier reached.
    pub jump_point: Option<TierTable>,
}

impl ServiceFeeScheme {
    pub fn new(method: SettlementMethod) -> Self {
        Self {
            method,
            cap: CapRule::None,
            segmented: None,
            jump_point: None,
        }
    }

    pub fn with_cap(mut self, cap: CapRule) -> Self {
        self.cap = cap;
        self
    }

    pub fn with_segmented(mut self, table: TierTable) -> Self {
        self.segmented = Some(table);
        self
    }

    pub fn with_jump_point(mut self, table: TierTable) -> Self {
        self.jump_point = Some(table);
        self
    }

    /// Invariant check run at configuration save time and again by `compute`.
    pub fn validate(&self) -> DomainResult<()> {
        if self.segmented.is_some() && self.jump_point.is_some() {
            return Err(DomainError::invalid_configuration(
                "segmented and jump-point tables are mutually exclusive",
            ));
        }
        if let Some(table) = &self.segmented {
            table.validate()?;
        }
        if let Some(table) = &self.jump_point {
            table.validate()?;
        }
        match &self.method {
            SettlementMethod::ActualCumulative { cumulative_rate }
            | SettlementMethod::CombinedFixedAndActual { cumulative_rate, .. } => {
                if *cumulative_rate < Decimal::ZERO || *cumulative_rate > Decimal::ONE {
                    return Err(DomainError::invalid_configuration(format!(
                        "cumulative rate must be in [0, 1], got {cumulative_rate}"
                    )));
                }
            }
            _ => {}
        }
        if let CapRule::PerUnitCap { units } = &self.cap {
            if units.is_empty() {
                return Err(DomainError::invalid_configuration(
                    "per-unit cap requires at least one unit",
                ));
            }
        }
        Ok(())
    }
}

/// Consumption facts supplied by the caller at settlement time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionFacts {
    /// Cumulative consumption amount (actual methods).
    pub cumulative_consumption: Decimal,
    /// Service area (fixed-unit pricing). Units are whatever the scheme's
    /// `area_basis` says; the calculator does not convert.
    pub service_area: Decimal,
    /// Per-unit breakdown (per-unit caps). `base` drives proportional shares.
    pub units: Vec<UnitFact>,
}

/// One unit in the per-unit cap breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitFact {
    pub unit_name: String,
    pub area: Decimal,
    pub base: Decimal,
}
