//! The fee computation pipeline.
//!
//! `compute` is pure: (scheme, facts) → (settlement price, final fee, trace).
//! Internals stay at full decimal precision; only `final_fee` is rounded,
//! half-up to 2 decimal places.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use archerp_core::{DomainError, DomainResult, round2};

use crate::scheme::{
    CapRule, ConsumptionFacts, FixedPart, ServiceFeeScheme, SettlementMethod, TierTable,
};

/// One line of the calculation trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLine {
    pub step: String,
    pub amount: Decimal,
}

impl TraceLine {
    fn new(step: impl Into<String>, amount: Decimal) -> Self {
        Self { step: step.into(), amount }
    }
}

/// Result of a settlement computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeComputation {
    /// Settlement price after the method and any per-unit cap.
    pub settlement_price: Decimal,
    /// Settlement price after the total cap, rounded half-up to 2dp.
    pub final_fee: Decimal,
    pub trace: Vec<TraceLine>,
}

/// Compute the settlement fee for a scheme against consumption facts.
///
/// Re-validates the scheme first: a record is never produced from a scheme
/// violating its invariants, even if bad configuration slipped past save time.
pub fn compute(scheme: &ServiceFeeScheme, facts: &ConsumptionFacts) -> DomainResult<FeeComputation> {
    scheme.validate()?;

    let mut trace = Vec::new();
    let mut settlement = method_amount(scheme, facts, &mut trace)?;

    if let CapRule::PerUnitCap { units } = &scheme.cap {
        settlement = apply_per_unit_cap(settlement, units, facts, &mut trace)?;
    }

    let final_fee = match &scheme.cap {
        CapRule::TotalCapAmount { amount } => {
            let capped = settlement.min(*amount);
            if capped < settlement {
                trace.push(TraceLine::new(format!("total cap {amount} applied"), capped));
            }
            capped
        }
        _ => settlement,
    };
    let final_fee = round2(final_fee);
    trace.push(TraceLine::new("final fee", final_fee));

    Ok(FeeComputation {
        settlement_price: settlement,
        final_fee,
        trace,
    })
}

fn method_amount(
    scheme: &ServiceFeeScheme,
    facts: &ConsumptionFacts,
    trace: &mut Vec<TraceLine>,
) -> DomainResult<Decimal> {
    match &scheme.method {
        SettlementMethod::FixedTotal { total_price } => {
            trace.push(TraceLine::new("fixed total", *total_price));
            Ok(*total_price)
        }
        SettlementMethod::FixedUnit { unit_price, .. } => {
            let amount = *unit_price * facts.service_area;
            trace.push(TraceLine::new(
                format!("fixed unit {} × area {}", unit_price, facts.service_area),
                amount,
            ));
            Ok(amount)
        }
        SettlementMethod::ActualCumulative { cumulative_rate } => Ok(actual_amount(
            scheme,
            facts.cumulative_consumption,
            *cumulative_rate,
            trace,
        )),
        SettlementMethod::CombinedFixedAndActual {
            fixed,
            cumulative_rate,
            deduct_fixed,
        } => {
            let fixed_part = match fixed {
                FixedPart::Total { total_price } => *total_price,
                FixedPart::Unit { unit_price, .. } => *unit_price * facts.service_area,
            };
            trace.push(TraceLine::new("combined: fixed part", fixed_part));

            let base = if *deduct_fixed {
                (facts.cumulative_consumption - fixed_part).max(Decimal::ZERO)
            } else {
                facts.cumulative_consumption
            };
            let actual_part = actual_amount(scheme, base, *cumulative_rate, trace);
            trace.push(TraceLine::new("combined: actual part", actual_part));
            Ok(fixed_part + actual_part)
        }
    }
}

/// Rate application for the actual-consumption leg: a segmented table wins,
/// then a jump-point table, then the flat cumulative rate.
fn actual_amount(
    scheme: &ServiceFeeScheme,
    base: Decimal,
    flat_rate: Decimal,
    trace: &mut Vec<TraceLine>,
) -> Decimal {
    if let Some(table) = &scheme.segmented {
        return segmented_amount(table, base, trace);
    }
    if let Some(table) = &scheme.jump_point {
        return jump_point_amount(table, base, trace);
    }
    let amount = base * flat_rate;
    trace.push(TraceLine::new(
        format!("flat rate {flat_rate} × base {base}"),
        amount,
    ));
    amount
}

/// 累进: Σᵢ (min(base, tᵢ₊₁) − tᵢ)⁺ × rᵢ, last tier unbounded.
fn segmented_amount(table: &TierTable, base: Decimal, trace: &mut Vec<TraceLine>) -> Decimal {
    let mut total = Decimal::ZERO;
    for (i, tier) in table.tiers.iter().enumerate() {
        let upper = table
            .tiers
            .get(i + 1)
            .map(|next| next.threshold)
            .unwrap_or(base);
        let span = (base.min(upper) - tier.threshold).max(Decimal::ZERO);
        if span > Decimal::ZERO {
            let contribution = span * tier.rate;
            trace.push(TraceLine::new(
                format!("segmented tier {} ({} × {})", tier.threshold, span, tier.rate),
                contribution,
            ));
            total += contribution;
        }
    }
    total
}

/// 跳点: base × rate of the highest tier whose threshold the base reaches.
fn jump_point_amount(table: &TierTable, base: Decimal, trace: &mut Vec<TraceLine>) -> Decimal {
    let rate = table
        .tiers
        .iter()
        .rev()
        .find(|tier| base >= tier.threshold)
        .map(|tier| tier.rate)
        .unwrap_or(Decimal::ZERO);
    let amount = base * rate;
    trace.push(TraceLine::new(
        format!("jump point rate {rate} × base {base}"),
        amount,
    ));
    amount
}

/// Replace the settlement by the sum of per-unit capped shares. Shares are
/// proportional to each unit's declared base.
fn apply_per_unit_cap(
    settlement: Decimal,
    caps: &[crate::scheme::UnitCap],
    facts: &ConsumptionFacts,
    trace: &mut Vec<TraceLine>,
) -> DomainResult<Decimal> {
    let total_base: Decimal = facts.units.iter().map(|u| u.base).sum();
    if total_base <= Decimal::ZERO {
        return Err(DomainError::validation(
            "per-unit cap requires units with a positive total base",
        ));
    }

    let mut capped_total = Decimal::ZERO;
    for cap in caps {
        let fact = facts
            .units
            .iter()
            .find(|u| u.unit_name == cap.unit_name)
            .ok_or_else(|| {
                DomainError::validation(format!("no unit facts for `{}`", cap.unit_name))
            })?;
        let share = settlement * fact.base / total_base;
        let ceiling = fact.area * cap.cap_unit_price;
        let capped = share.min(ceiling);
        trace.push(TraceLine::new(
            format!(
                "unit `{}` share {} capped at {}",
                cap.unit_name,
                round2(share),
                round2(ceiling)
            ),
            capped,
        ));
        capped_total += capped;
    }
    Ok(capped_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use crate::scheme::{AreaBasis, Tier, UnitCap, UnitFact};

    fn two_tiers() -> TierTable {
        TierTable::new(vec![
            Tier { threshold: dec!(0), rate: dec!(0.20) },
            Tier { threshold: dec!(1000000), rate: dec!(0.15) },
        ])
    }

    fn facts(consumption: Decimal) -> ConsumptionFacts {
        ConsumptionFacts {
            cumulative_consumption: consumption,
            ..Default::default()
        }
    }

    #[test]
    fn segmented_two_tier_with_total_cap() {
        // 1,000,000 × 0.20 + 500,000 × 0.15 = 275,000; capped at 250,000.
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0),
        })
        .with_segmented(two_tiers())
        .with_cap(CapRule::TotalCapAmount { amount: dec!(250000) });

        let result = compute(&scheme, &facts(dec!(1500000))).unwrap();
        assert_eq!(result.settlement_price, dec!(275000));
        assert_eq!(result.final_fee, dec!(250000.00));
    }

    #[test]
    fn jump_point_uses_highest_reached_rate_on_whole_base() {
        // 1,500,000 ≥ 1,000,000 → whole base at 0.15.
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0),
        })
        .with_jump_point(two_tiers());

        let result = compute(&scheme, &facts(dec!(1500000))).unwrap();
        assert_eq!(result.final_fee, dec!(225000.00));
    }

    #[test]
    fn jump_point_below_second_threshold_stays_on_first_rate() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0),
        })
        .with_jump_point(two_tiers());

        let result = compute(&scheme, &facts(dec!(800000))).unwrap();
        assert_eq!(result.final_fee, dec!(160000.00));
    }

    #[test]
    fn segmented_exactly_at_threshold_has_no_second_tier_span() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0),
        })
        .with_segmented(two_tiers());

        let result = compute(&scheme, &facts(dec!(1000000))).unwrap();
        assert_eq!(result.final_fee, dec!(200000.00));
    }

    #[test]
    fn flat_rate_applies_without_tables() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0.12),
        });
        let result = compute(&scheme, &facts(dec!(500000))).unwrap();
        assert_eq!(result.final_fee, dec!(60000.00));
    }

    #[test]
    fn fixed_unit_multiplies_area() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::FixedUnit {
            unit_price: dec!(38.5),
            area_basis: AreaBasis::BuildingArea,
        });
        let f = ConsumptionFacts {
            service_area: dec!(12000),
            ..Default::default()
        };
        let result = compute(&scheme, &f).unwrap();
        assert_eq!(result.final_fee, dec!(462000.00));
    }

    #[test]
    fn combined_deducts_fixed_before_rate_when_configured() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::CombinedFixedAndActual {
            fixed: FixedPart::Total { total_price: dec!(100000) },
            cumulative_rate: dec!(0.10),
            deduct_fixed: true,
        });
        // 100,000 + (600,000 − 100,000) × 0.10 = 150,000
        let result = compute(&scheme, &facts(dec!(600000))).unwrap();
        assert_eq!(result.final_fee, dec!(150000.00));

        let no_deduct = ServiceFeeScheme::new(SettlementMethod::CombinedFixedAndActual {
            fixed: FixedPart::Total { total_price: dec!(100000) },
            cumulative_rate: dec!(0.10),
            deduct_fixed: false,
        });
        // 100,000 + 600,000 × 0.10 = 160,000
        let result = compute(&no_deduct, &facts(dec!(600000))).unwrap();
        assert_eq!(result.final_fee, dec!(160000.00));
    }

    #[test]
    fn per_unit_cap_replaces_settlement_with_capped_shares() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::FixedTotal {
            total_price: dec!(300000),
        })
        .with_cap(CapRule::PerUnitCap {
            units: vec![
                UnitCap { unit_name: "A栋".into(), cap_unit_price: dec!(10) },
                UnitCap { unit_name: "B栋".into(), cap_unit_price: dec!(50) },
            ],
        });
        let f = ConsumptionFacts {
            units: vec![
                UnitFact { unit_name: "A栋".into(), area: dec!(5000), base: dec!(1) },
                UnitFact { unit_name: "B栋".into(), area: dec!(5000), base: dec!(1) },
            ],
            ..Default::default()
        };
        // Equal shares of 150,000 each; A capped at 50,000, B keeps 150,000.
        let result = compute(&scheme, &f).unwrap();
        assert_eq!(result.settlement_price, dec!(200000));
        assert_eq!(result.final_fee, dec!(200000.00));
    }

    #[test]
    fn per_unit_cap_missing_fact_is_an_error() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::FixedTotal {
            total_price: dec!(100),
        })
        .with_cap(CapRule::PerUnitCap {
            units: vec![UnitCap { unit_name: "A栋".into(), cap_unit_price: dec!(10) }],
        });
        assert!(compute(&scheme, &ConsumptionFacts::default()).is_err());
    }

    #[test]
    fn invalid_scheme_refused_at_compute_time() {
        let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
            cumulative_rate: dec!(0.1),
        })
        .with_segmented(two_tiers())
        .with_jump_point(two_tiers());
        assert!(compute(&scheme, &facts(dec!(1))).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, ..ProptestConfig::default() })]

        /// final_fee never exceeds the (rounded) settlement price, and never
        /// exceeds the total cap when one is set.
        #[test]
        fn final_fee_bounded_by_settlement_and_cap(
            consumption in 0u64..100_000_000u64,
            cap in 1u64..10_000_000u64,
        ) {
            let scheme = ServiceFeeScheme::new(SettlementMethod::ActualCumulative {
                cumulative_rate: dec!(0),
            })
            .with_segmented(two_tiers())
            .with_cap(CapRule::TotalCapAmount { amount: Decimal::from(cap) });

            let result = compute(&scheme, &facts(Decimal::from(consumption))).unwrap();
            prop_assert!(result.final_fee <= archerp_core::round2(result.settlement_price));
            prop_assert!(result.final_fee <= Decimal::from(cap));
        }

        /// Segmented never exceeds the highest tier rate applied to the whole
        /// base, and is monotone in the base.
        #[test]
        fn segmented_bounds_and_monotonicity(
            base in 0u64..100_000_000u64,
            delta in 0u64..1_000_000u64,
        ) {
            let table = two_tiers();
            let mut trace = Vec::new();
            let b = Decimal::from(base);
            let lower = segmented_amount(&table, b, &mut trace);
            let higher = segmented_amount(&table, b + Decimal::from(delta), &mut trace);
            prop_assert!(lower <= b * dec!(0.20));
            prop_assert!(lower <= higher);
        }

        /// Jump-point equals base × rate of the reached tier.
        #[test]
        fn jump_point_matches_reached_tier(base in 0u64..100_000_000u64) {
            let table = two_tiers();
            let mut trace = Vec::new();
            let b = Decimal::from(base);
            let amount = jump_point_amount(&table, b, &mut trace);
            let expected_rate = if b >= dec!(1000000) { dec!(0.15) } else { dec!(0.20) };
            prop_assert_eq!(amount, b * expected_rate);
        }
    }
}
