//! Append-only output-value ledger.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use archerp_core::{DomainError, DomainResult, ProjectId, RoleCode, UserId, round2};

use crate::plan::OutputValuePlan;

/// Ledger row identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Calculated,
    Confirmed,
    Cancelled,
}

/// One immutable ledger entry.
///
/// Once confirmed the row is append-only: corrections are recorded as new
/// delta rows referencing the original via `corrects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputValueRecord {
    pub id: RecordId,
    pub project: ProjectId,
    pub stage: String,
    pub milestone: String,
    pub event: String,
    /// Lifecycle occurrence this accrual answers to (idempotence key part).
    pub occurrence_id: String,
    pub responsible: UserId,
    pub role: RoleCode,
    /// Monetary base captured at compute time.
    pub base_amount: Decimal,
    /// base × stage% × milestone% × event% / 10⁶, half-up to scale 2.
    pub value: Decimal,
    pub status: RecordStatus,
    pub computed_at: DateTime<Utc>,
    pub confirmed_by: Option<UserId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub corrects: Option<RecordId>,
}

/// Role → user mapping of a project's team.
pub type ProjectRoster = HashMap<RoleCode, UserId>;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<RecordId, OutputValueRecord>,
    /// (project, trigger, occurrence) → record, for idempotent accrual.
    by_occurrence: HashMap<(ProjectId, String, String), RecordId>,
}

/// The accrual ledger for one output-value plan.
pub struct OutputValueLedger {
    plan: OutputValuePlan,
    inner: Mutex<Inner>,
}

impl OutputValueLedger {
    /// Build a ledger over a validated plan.
    pub fn new(plan: OutputValuePlan) -> DomainResult<Self> {
        plan.validate()?;
        Ok(Self {
            plan,
            inner: Mutex::new(Inner::default()),
        })
    }

    /// Accrue the credit for a lifecycle occurrence.
    ///
    /// Idempotent on (project, event_code, occurrence_id): a duplicate
    /// invocation returns the existing row untouched.
    pub fn accrue(
        &self,
        project: ProjectId,
        event_code: &str,
        base_amount: Decimal,
        occurrence_id: &str,
        roster: &ProjectRoster,
        now: DateTime<Utc>,
    ) -> DomainResult<OutputValueRecord> {
        // Configuration may have been edited since construction; refuse to
        // produce a row from a broken plan.
        self.plan.validate()?;

        let (stage, milestone, event) = self.plan.find_trigger(event_code).ok_or_else(|| {
            DomainError::not_found(format!("no output-value event for trigger `{event_code}`"))
        })?;
        let responsible = roster.get(&event.role).copied().ok_or_else(|| {
            DomainError::invalid_configuration(format!(
                "project roster has no user for role `{}`",
                event.role
            ))
        })?;

        let mut inner = self.inner.lock().unwrap();
        let key = (project, event_code.to_string(), occurrence_id.to_string());
        if let Some(existing) = inner.by_occurrence.get(&key) {
            debug!(project = %project, event_code, occurrence_id, "accrual already recorded");
            return Ok(inner.records[existing].clone());
        }

        let value = compute_value(
            base_amount,
            stage.pct.value(),
            milestone.pct.value(),
            event.pct.value(),
        );
        let record = OutputValueRecord {
            id: RecordId::new(),
            project,
            stage: stage.name.clone(),
            milestone: milestone.name.clone(),
            event: event.name.clone(),
            occurrence_id: occurrence_id.to_string(),
            responsible,
            role: event.role.clone(),
            base_amount,
            value,
            status: RecordStatus::Calculated,
            computed_at: now,
            confirmed_by: None,
            confirmed_at: None,
            corrects: None,
        };
        inner.by_occurrence.insert(key, record.id);
        inner.records.insert(record.id, record.clone());
        info!(
            project = %project,
            event_code,
            %responsible,
            value = %record.value,
            "output value accrued"
        );
        Ok(record)
    }

    /// Confirm a calculated row. Irreversible; confirming again is a no-op.
    pub fn confirm(
        &self,
        id: RecordId,
        confirmer: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<OutputValueRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("output value record {id}")))?;
        match record.status {
            RecordStatus::Calculated => {
                record.status = RecordStatus::Confirmed;
                record.confirmed_by = Some(confirmer);
                record.confirmed_at = Some(now);
                Ok(record.clone())
            }
            RecordStatus::Confirmed => Ok(record.clone()),
            RecordStatus::Cancelled => Err(DomainError::illegal_transition(format!(
                "record {id} is cancelled"
            ))),
        }
    }

    /// Cancel a calculated row (never a confirmed one).
    pub fn cancel(&self, id: RecordId) -> DomainResult<OutputValueRecord> {
        let mut inner = self.inner.lock().unwrap();
        let record = inner
            .records
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found(format!("output value record {id}")))?;
        if record.status == RecordStatus::Confirmed {
            return Err(DomainError::illegal_transition(format!(
                "record {id} is confirmed and append-only"
            )));
        }
        record.status = RecordStatus::Cancelled;
        Ok(record.clone())
    }

    /// Record a correction as a new delta row referencing the original.
    /// The original is never edited.
    pub fn correct(
        &self,
        original: RecordId,
        delta_value: Decimal,
        now: DateTime<Utc>,
    ) -> DomainResult<OutputValueRecord> {
        let mut inner = self.inner.lock().unwrap();
        let source = inner
            .records
            .get(&original)
            .ok_or_else(|| DomainError::not_found(format!("output value record {original}")))?
            .clone();
        let correction = OutputValueRecord {
            id: RecordId::new(),
            occurrence_id: format!("{}#correction", source.occurrence_id),
            base_amount: Decimal::ZERO,
            value: round2(delta_value),
            status: RecordStatus::Calculated,
            computed_at: now,
            confirmed_by: None,
            confirmed_at: None,
            corrects: Some(original),
            ..source
        };
        inner.records.insert(correction.id, correction.clone());
        Ok(correction)
    }

    pub fn get(&self, id: RecordId) -> Option<OutputValueRecord> {
        self.inner.lock().unwrap().records.get(&id).cloned()
    }

    /// All rows for a project, oldest first.
    pub fn for_project(&self, project: ProjectId) -> Vec<OutputValueRecord> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<OutputValueRecord> = inner
            .records
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.computed_at);
        rows
    }
}

/// value = base × s% × m% × e% / 10⁶, computed at full precision, stored at
/// scale 2 half-up.
fn compute_value(base: Decimal, stage_pct: Decimal, milestone_pct: Decimal, event_pct: Decimal) -> Decimal {
    let raw = base * stage_pct * milestone_pct * event_pct / Decimal::from(1_000_000);
    round2(raw)
}
