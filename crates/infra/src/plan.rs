//! Plan-calendar port for the scheduled reminder scans.
//!
//! Plan and todo data live with business collaborators; the scanners only need
//! a listing of who should be reminded of what. Collaborators implement this
//! port, the scanners turn each item into a tracked notification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use archerp_core::UserId;
use archerp_notify::Urgency;

/// Cadence of a plan todo reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoCadence {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

/// One reminder to deliver: who, what, how urgent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTodo {
    pub owner: UserId,
    pub title: String,
    pub body: String,
    pub urgency: Urgency,
}

/// Read-only view over the collaborator's plan data.
pub trait PlanCalendar: Send + Sync {
    /// Plans past their deadline and not yet completed.
    fn overdue_plans(&self, now: DateTime<Utc>) -> Vec<PlanTodo>;

    /// Tracking todos due at the given cadence (fill in progress, etc.).
    fn tracking_todos(&self, cadence: TodoCadence, now: DateTime<Utc>) -> Vec<PlanTodo>;

    /// Plan-creation todos due at the given cadence (draft next period's plan).
    fn creation_todos(&self, cadence: TodoCadence, now: DateTime<Utc>) -> Vec<PlanTodo>;
}

/// Calendar with nothing to remind; the default until a collaborator plugs in.
#[derive(Debug, Default)]
pub struct EmptyPlanCalendar;

impl PlanCalendar for EmptyPlanCalendar {
    fn overdue_plans(&self, _now: DateTime<Utc>) -> Vec<PlanTodo> {
        Vec::new()
    }

    fn tracking_todos(&self, _cadence: TodoCadence, _now: DateTime<Utc>) -> Vec<PlanTodo> {
        Vec::new()
    }

    fn creation_todos(&self, _cadence: TodoCadence, _now: DateTime<Utc>) -> Vec<PlanTodo> {
        Vec::new()
    }
}
