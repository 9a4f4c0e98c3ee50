//! The data-driven approval engine.
//!
//! A reusable multi-step approval runtime attachable to any business entity.
//! Templates define ordered nodes with dynamic approver resolution; the engine
//! runs instances through them, escalates on timeout, and fires registered
//! business callbacks on terminal states.

pub mod engine;
pub mod instance;
pub mod node;
pub mod registry;
pub mod resolve;
pub mod store;
pub mod template;

#[cfg(test)]
mod engine_scenarios;

pub use engine::{ApprovalEngine, DecisionAction, system_user};
pub use instance::{ApprovalInstance, ApprovalRecord, InstanceStatus, RecordResult, format_instance_number};
pub use node::{ApprovalMode, ApprovalNode, ApproverSpec, NodeKind};
pub use registry::{CallbackHandler, CallbackRegistry, TerminalEvent};
pub use resolve::resolve_approvers;
pub use store::{InMemoryWorkflowStore, WorkflowStore, WorkflowStoreError};
pub use template::{TemplateStatus, TimeoutPolicy, WorkflowTemplate};
