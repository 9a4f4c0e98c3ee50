//! Per-role output-value accrual.
//!
//! When a project lifecycle event fires, the configured three-level percentage
//! decomposition (stage → milestone → event) turns a monetary base into an
//! immutable ledger credit for the role that earned it.

pub mod ledger;
pub mod plan;

pub use ledger::{OutputValueLedger, OutputValueRecord, ProjectRoster, RecordId, RecordStatus};
pub use plan::{MonetaryBase, OutputValueEvent, OutputValueMilestone, OutputValuePlan, OutputValueStage};
