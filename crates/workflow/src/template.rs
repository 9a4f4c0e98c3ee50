//! Workflow templates: reusable approval definitions.

use serde::{Deserialize, Serialize};

use archerp_core::{DomainError, DomainResult, TemplateId, UserId};

use crate::node::{ApprovalNode, NodeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateStatus {
    Draft,
    Active,
    Inactive,
}

/// What happens when a node's timeout elapses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// Resend reminders and escalate through the notification service.
    Notify,
    /// Fabricate a system approval and advance.
    AutoApprove,
    /// Terminate the instance with status `timeout`.
    AutoReject,
}

/// Reusable workflow definition, identified by a stable `code` that business
/// callbacks key on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub code: String,
    pub name: String,
    pub category: String,
    pub status: TemplateStatus,
    /// Entity model tags this workflow applies to. A plain string list so new
    /// business entity types need no engine change.
    pub applicable_models: Vec<String>,
    pub allow_withdraw: bool,
    pub allow_reject: bool,
    pub allow_transfer: bool,
    pub default_timeout_hours: i64,
    pub timeout_policy: TimeoutPolicy,
    pub created_by: UserId,
    pub nodes: Vec<ApprovalNode>,
}

impl WorkflowTemplate {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        created_by: UserId,
        nodes: Vec<ApprovalNode>,
    ) -> Self {
        Self {
            id: TemplateId::new(),
            code: code.into(),
            name: name.into(),
            category: category.into(),
            status: TemplateStatus::Draft,
            applicable_models: Vec::new(),
            allow_withdraw: true,
            allow_reject: true,
            allow_transfer: true,
            default_timeout_hours: 72,
            timeout_policy: TimeoutPolicy::Notify,
            created_by,
            nodes,
        }
    }

    pub fn applicable_to(mut self, models: Vec<String>) -> Self {
        self.applicable_models = models;
        self
    }

    pub fn with_timeout(mut self, hours: i64, policy: TimeoutPolicy) -> Self {
        self.default_timeout_hours = hours;
        self.timeout_policy = policy;
        self
    }

    /// Structural invariants, checked on activation: at least one approval
    /// node; sequences dense (starting at 0 or 1), ascending, unique; at most
    /// one start and one end node; branch nodes carry a condition.
    pub fn validate(&self) -> DomainResult<()> {
        let approval_count = self
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Approval)
            .count();
        if approval_count == 0 {
            return Err(DomainError::invalid_configuration(format!(
                "template `{}` has no approval node",
                self.code
            )));
        }

        let mut sequences: Vec<u32> = self.nodes.iter().map(|n| n.sequence).collect();
        sequences.sort_unstable();
        let start = sequences.first().copied().unwrap_or(0);
        if start > 1 {
            return Err(DomainError::invalid_configuration(format!(
                "template `{}` sequences must start at 0 or 1",
                self.code
            )));
        }
        for (i, seq) in sequences.iter().enumerate() {
            if *seq != start + i as u32 {
                return Err(DomainError::invalid_configuration(format!(
                    "template `{}` sequences must be dense and unique",
                    self.code
                )));
            }
        }

        for kind in [NodeKind::Start, NodeKind::End] {
            if self.nodes.iter().filter(|n| n.kind == kind).count() > 1 {
                return Err(DomainError::invalid_configuration(format!(
                    "template `{}` has more than one {kind:?} node",
                    self.code
                )));
            }
        }

        for node in &self.nodes {
            if node.kind == NodeKind::Branch && node.condition.is_none() {
                return Err(DomainError::invalid_configuration(format!(
                    "branch node `{}` in template `{}` has no condition",
                    node.name, self.code
                )));
            }
        }
        Ok(())
    }

    /// Draft → active. Validation gate.
    pub fn activate(&mut self) -> DomainResult<()> {
        self.validate()?;
        self.status = TemplateStatus::Active;
        Ok(())
    }

    /// Deactivation does not invalidate running instances; the engine only
    /// checks the status at submission time.
    pub fn deactivate(&mut self) {
        self.status = TemplateStatus::Inactive;
    }

    pub fn is_active(&self) -> bool {
        self.status == TemplateStatus::Active
    }

    pub fn applies_to(&self, model: &str) -> bool {
        self.applicable_models.iter().any(|m| m == model)
    }

    pub fn node(&self, sequence: u32) -> Option<&ApprovalNode> {
        self.nodes.iter().find(|n| n.sequence == sequence)
    }

    /// Nodes in chain order.
    pub fn ordered_nodes(&self) -> Vec<&ApprovalNode> {
        let mut nodes: Vec<&ApprovalNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|n| n.sequence);
        nodes
    }

    /// Effective timeout for a node (per-node override or template default).
    pub fn timeout_hours_for(&self, node: &ApprovalNode) -> i64 {
        node.timeout_hours.unwrap_or(self.default_timeout_hours)
    }
}
