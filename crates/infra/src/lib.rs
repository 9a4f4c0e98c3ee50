//! Periodic job runtime and wiring.
//!
//! Hosts the background job system (store, executor, retry, dead-letter), the
//! business-timezone schedule table, and the scan handlers that drive the
//! approval timeout policies, the notification escalation ladder, and the
//! plan reminders.

pub mod config;
pub mod jobs;
pub mod plan;
pub mod scanners;
pub mod schedule;

#[cfg(test)]
mod integration_tests;

pub use config::{AppConfig, MailConfig, WeComConfig, bootstrap};
pub use jobs::{
    InMemoryJobStore, Job, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobKind, JobResult,
    JobStatus, JobStore, RetryPolicy,
};
pub use plan::{EmptyPlanCalendar, PlanCalendar, PlanTodo, TodoCadence};
pub use scanners::{ScanContext, register_scan_handlers};
pub use schedule::{ScheduleEntry, ScheduleSpec, Scheduler};
