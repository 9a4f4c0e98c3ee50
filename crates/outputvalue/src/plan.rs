//! Stage / milestone / event percentage decomposition.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use archerp_core::{DomainError, DomainResult, Percent, RoleCode};

/// Which monetary amount a stage draws its base from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonetaryBase {
    RegistrationAmount,
    IntentionAmount,
    ContractAmount,
    SettlementAmount,
    PaymentAmount,
}

/// Leaf of the decomposition: fires on a lifecycle event code, credits a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValueEvent {
    /// Project lifecycle event code that triggers this leaf.
    pub trigger: String,
    pub name: String,
    pub pct: Percent,
    /// Role that earns the credit, resolved against the project roster.
    pub role: RoleCode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValueMilestone {
    pub name: String,
    pub pct: Percent,
    pub events: Vec<OutputValueEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValueStage {
    pub name: String,
    pub pct: Percent,
    pub base: MonetaryBase,
    pub milestones: Vec<OutputValueMilestone>,
}

/// The full decomposition configured for a project type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValuePlan {
    pub stages: Vec<OutputValueStage>,
}

impl OutputValuePlan {
    pub fn new(stages: Vec<OutputValueStage>) -> Self {
        Self { stages }
    }

    /// Invariants: milestone percentages sum to 100 per stage, event
    /// percentages sum to 100 per milestone, trigger codes unique. Run at
    /// configuration save time and re-run before any accrual.
    pub fn validate(&self) -> DomainResult<()> {
        if self.stages.is_empty() {
            return Err(DomainError::invalid_configuration("plan has no stages"));
        }
        let hundred = Decimal::from(100);
        let mut seen_triggers = std::collections::HashSet::new();
        for stage in &self.stages {
            if stage.milestones.is_empty() {
                return Err(DomainError::invalid_configuration(format!(
                    "stage `{}` has no milestones",
                    stage.name
                )));
            }
            let milestone_pcts: Vec<Percent> =
                stage.milestones.iter().map(|m| m.pct).collect();
            if Percent::sum(&milestone_pcts) != hundred {
                return Err(DomainError::invalid_configuration(format!(
                    "milestone percentages in stage `{}` must sum to 100",
                    stage.name
                )));
            }
            for milestone in &stage.milestones {
                if milestone.events.is_empty() {
                    return Err(DomainError::invalid_configuration(format!(
                        "milestone `{}` has no events",
                        milestone.name
                    )));
                }
                let event_pcts: Vec<Percent> = milestone.events.iter().map(|e| e.pct).collect();
                if Percent::sum(&event_pcts) != hundred {
                    return Err(DomainError::invalid_configuration(format!(
                        "event percentages in milestone `{}` must sum to 100",
                        milestone.name
                    )));
                }
                for event in &milestone.events {
                    if !seen_triggers.insert(event.trigger.clone()) {
                        return Err(DomainError::invalid_configuration(format!(
                            "duplicate trigger code `{}`",
                            event.trigger
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Find the (stage, milestone, event) triple whose trigger matches.
    pub fn find_trigger(
        &self,
        event_code: &str,
    ) -> Option<(&OutputValueStage, &OutputValueMilestone, &OutputValueEvent)> {
        for stage in &self.stages {
            for milestone in &stage.milestones {
                for event in &milestone.events {
                    if event.trigger == event_code {
                        return Some((stage, milestone, event));
                    }
                }
            }
        }
        None
    }
}
