//! Process-wide callback registry.
//!
//! Business modules register handlers at startup keyed by (workflow code,
//! terminal event); the engine looks up at most one handler per terminal
//! transition. This keeps the dependency arrow one-directional: business
//! modules depend on the engine, never the reverse.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::instance::ApprovalInstance;

/// Terminal event a callback subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalEvent {
    Approved,
    Rejected,
}

/// Collaborator-provided handler. Runs synchronously inside the terminal
/// transition; must be idempotent (the admin retry action may re-invoke it).
pub type CallbackHandler = Arc<dyn Fn(&ApprovalInstance) -> anyhow::Result<()> + Send + Sync>;

/// Read-mostly map populated once at startup.
#[derive(Default)]
pub struct CallbackRegistry {
    handlers: RwLock<HashMap<(String, TerminalEvent), CallbackHandler>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a workflow code and event.
    /// Re-registering the same key is allowed so startup is idempotent.
    pub fn register<F>(&self, workflow_code: impl Into<String>, event: TerminalEvent, handler: F)
    where
        F: Fn(&ApprovalInstance) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let code = workflow_code.into();
        debug!(workflow_code = %code, ?event, "callback registered");
        self.handlers
            .write()
            .unwrap()
            .insert((code, event), Arc::new(handler));
    }

    pub fn get(&self, workflow_code: &str, event: TerminalEvent) -> Option<CallbackHandler> {
        self.handlers
            .read()
            .unwrap()
            .get(&(workflow_code.to_string(), event))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn register_and_lookup() {
        let registry = CallbackRegistry::new();
        registry.register("customer_management_approval", TerminalEvent::Approved, |_| Ok(()));

        assert!(registry
            .get("customer_management_approval", TerminalEvent::Approved)
            .is_some());
        assert!(registry
            .get("customer_management_approval", TerminalEvent::Rejected)
            .is_none());
        assert!(registry.get("other", TerminalEvent::Approved).is_none());
    }

    #[test]
    fn re_register_replaces() {
        let counter = Arc::new(AtomicUsize::new(0));
        let registry = CallbackRegistry::new();

        let c1 = counter.clone();
        registry.register("wf", TerminalEvent::Approved, move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let c2 = counter.clone();
        registry.register("wf", TerminalEvent::Approved, move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
            Ok(())
        });

        let dummy = dummy_instance();
        registry.get("wf", TerminalEvent::Approved).unwrap()(&dummy).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    fn dummy_instance() -> ApprovalInstance {
        use archerp_core::{EntityRef, EntitySnapshot, InstanceId, TemplateId, UserId};
        use chrono::Utc;

        use crate::instance::InstanceStatus;

        ApprovalInstance {
            id: InstanceId::new(),
            number: "WF-20260302-0001".into(),
            template_id: TemplateId::new(),
            workflow_code: "wf".into(),
            entity: EntityRef::new("customer", "1"),
            snapshot: EntitySnapshot::new(),
            applicant: UserId::new(),
            comment: None,
            applied_at: Utc::now(),
            current_node: None,
            node_entered_at: None,
            timeout_notified_at: None,
            status: InstanceStatus::Approved,
            finished_at: Some(Utc::now()),
            callback_warning: None,
        }
    }
}
