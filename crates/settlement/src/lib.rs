//! Deterministic service-fee settlement.
//!
//! A settlement scheme (pricing blueprint attached to a contract or project)
//! plus consumption facts go in; a settlement price, a capped final fee, and a
//! per-line calculation trace come out. Pure functions, no I/O, decimal
//! arithmetic throughout.

pub mod compute;
pub mod scheme;

pub use compute::{FeeComputation, TraceLine, compute};
pub use scheme::{
    AreaBasis, CapRule, ConsumptionFacts, FixedPart, ServiceFeeScheme, SettlementMethod, Tier,
    TierTable, UnitCap, UnitFact,
};
