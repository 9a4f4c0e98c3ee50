//! Job handlers wiring the recurring scans to the engine and notifier.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Map;
use tracing::{info, warn};

use archerp_notify::{NotificationService, Notifier, Severity, Urgency};
use archerp_workflow::ApprovalEngine;

use crate::jobs::store::JobStore;
use crate::jobs::{JobExecutor, JobKind, JobResult};
use crate::plan::{PlanCalendar, PlanTodo, TodoCadence};

/// Everything the scan handlers need.
#[derive(Clone)]
pub struct ScanContext {
    pub engine: Arc<ApprovalEngine>,
    pub notifications: Arc<NotificationService>,
    pub plans: Arc<dyn PlanCalendar>,
}

impl ScanContext {
    /// Apply timeout policies to stale approval nodes.
    pub fn run_timeout_scan(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let fired = self.engine.scan_timeouts(now).map_err(|e| e.to_string())?;
        if fired > 0 {
            info!(fired, "approval timeout scan acted on instances");
        }
        Ok(fired)
    }

    /// Walk unconfirmed notifications up the escalation ladder.
    pub fn run_escalation_scan(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let escalated = self
            .notifications
            .scan_escalations(now)
            .map_err(|e| e.to_string())?;
        if escalated > 0 {
            info!(escalated, "escalation scan stepped notifications");
        }
        Ok(escalated)
    }

    /// Remind owners of plans past their deadline.
    pub fn run_overdue_plan_scan(&self, now: DateTime<Utc>) -> Result<usize, String> {
        let todos = self.plans.overdue_plans(now);
        self.deliver_todos("plan_overdue", &todos, now);
        Ok(todos.len())
    }

    /// Plan-tracking reminders at the given cadence.
    pub fn run_tracking_todos(
        &self,
        cadence: TodoCadence,
        now: DateTime<Utc>,
    ) -> Result<usize, String> {
        let todos = self.plans.tracking_todos(cadence, now);
        self.deliver_todos("plan_tracking", &todos, now);
        Ok(todos.len())
    }

    /// Plan-creation reminders at the given cadence.
    pub fn run_creation_todos(
        &self,
        cadence: TodoCadence,
        now: DateTime<Utc>,
    ) -> Result<usize, String> {
        let todos = self.plans.creation_todos(cadence, now);
        self.deliver_todos("plan_creation", &todos, now);
        Ok(todos.len())
    }

    /// Turn todos into tracked notifications; urgent ones enter the
    /// confirmation ladder.
    fn deliver_todos(&self, category: &str, todos: &[PlanTodo], now: DateTime<Utc>) {
        for todo in todos {
            let severity = match todo.urgency {
                Urgency::Normal => Severity::Info,
                Urgency::Important | Urgency::Urgent => Severity::Warning,
            };
            match self.notifications.notify(
                todo.owner,
                &todo.title,
                &todo.body,
                category,
                severity,
                Map::new(),
                now,
            ) {
                Ok(id) => {
                    if todo.urgency != Urgency::Normal {
                        if let Err(err) = self.notifications.track(id, todo.urgency) {
                            warn!(error = %err, "failed to track plan reminder");
                        }
                    }
                }
                Err(err) => warn!(owner = %todo.owner, error = %err, "plan reminder failed"),
            }
        }
    }
}

/// Register a handler for every scan job kind.
pub fn register_scan_handlers<S: JobStore + 'static>(
    executor: &mut JobExecutor<S>,
    context: ScanContext,
) {
    let ctx = context.clone();
    executor.register_handler("approval_timeout_scan", move |_| {
        match ctx.run_timeout_scan(Utc::now()) {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e),
        }
    });

    let ctx = context.clone();
    executor.register_handler("escalation_scan", move |_| {
        match ctx.run_escalation_scan(Utc::now()) {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e),
        }
    });

    let ctx = context.clone();
    executor.register_handler("overdue_plan_scan", move |_| {
        match ctx.run_overdue_plan_scan(Utc::now()) {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e),
        }
    });

    let ctx = context.clone();
    executor.register_handler("plan_tracking_todo", move |job| {
        let cadence = match &job.kind {
            JobKind::PlanTrackingTodo { cadence } => *cadence,
            _ => return JobResult::Failure("mismatched job kind".into()),
        };
        match ctx.run_tracking_todos(cadence, Utc::now()) {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e),
        }
    });

    let ctx = context;
    executor.register_handler("plan_creation_todo", move |job| {
        let cadence = match &job.kind {
            JobKind::PlanCreationTodo { cadence } => *cadence,
            _ => return JobResult::Failure("mismatched job kind".into()),
        };
        match ctx.run_creation_todos(cadence, Utc::now()) {
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use archerp_core::UserId;
    use archerp_directory::InMemoryDirectory;
    use archerp_notify::{InMemoryNotificationStore, RecordingTransport};
    use archerp_workflow::{CallbackRegistry, InMemoryWorkflowStore};

    struct FixedCalendar {
        todos: Mutex<Vec<PlanTodo>>,
    }

    impl PlanCalendar for FixedCalendar {
        fn overdue_plans(&self, _now: DateTime<Utc>) -> Vec<PlanTodo> {
            self.todos.lock().unwrap().clone()
        }

        fn tracking_todos(&self, _cadence: TodoCadence, _now: DateTime<Utc>) -> Vec<PlanTodo> {
            Vec::new()
        }

        fn creation_todos(&self, _cadence: TodoCadence, _now: DateTime<Utc>) -> Vec<PlanTodo> {
            Vec::new()
        }
    }

    #[test]
    fn overdue_scan_delivers_and_tracks_urgent_todos() {
        let directory = Arc::new(InMemoryDirectory::new());
        let notifications = Arc::new(NotificationService::new(
            Arc::new(InMemoryNotificationStore::new()),
            Arc::new(RecordingTransport::new()),
            directory.clone(),
        ));
        let engine = Arc::new(ApprovalEngine::new(
            Arc::new(InMemoryWorkflowStore::new()),
            directory,
            notifications.clone(),
            Arc::new(CallbackRegistry::new()),
        ));
        let owner = UserId::new();
        let calendar = Arc::new(FixedCalendar {
            todos: Mutex::new(vec![
                PlanTodo {
                    owner,
                    title: "季度计划逾期".into(),
                    body: "请尽快更新进度。".into(),
                    urgency: Urgency::Important,
                },
                PlanTodo {
                    owner,
                    title: "周计划提醒".into(),
                    body: "本周计划待填写。".into(),
                    urgency: Urgency::Normal,
                },
            ]),
        });
        let context = ScanContext {
            engine,
            notifications: notifications.clone(),
            plans: calendar,
        };

        let now = Utc::now();
        assert_eq!(context.run_overdue_plan_scan(now).unwrap(), 2);

        let inbox = notifications.list_for_recipient(owner).unwrap();
        assert_eq!(inbox.len(), 2);
        // The important one entered confirmation tracking, the normal one
        // did not.
        let tracked: usize = inbox
            .iter()
            .filter(|n| notifications.confirmation(n.id).unwrap().is_some())
            .count();
        assert_eq!(tracked, 1);
    }
}
