//! Approval nodes: ordered steps within a workflow template.

use serde::{Deserialize, Serialize};

use archerp_core::{DepartmentId, EntitySnapshot, RoleCode, UserId};

/// Node kind. Start/end are optional bookkeeping markers; branch nodes guard
/// the approval node that follows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Start,
    Approval,
    End,
    Branch,
}

/// How a node's concrete approver list is produced when the node activates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ApproverSpec {
    SpecificUsers { users: Vec<UserId> },
    RoleMembers { roles: Vec<RoleCode> },
    DepartmentManagerOfApplicant,
    ApplicantSuperior,
    DepartmentMembers { departments: Vec<DepartmentId> },
}

/// How many of the resolved approvers must act for the node to decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// First responder decides.
    Single,
    /// Unanimous approval; any rejection rejects.
    All,
    /// > 50% approvals approve; ≥ 50% rejections reject.
    Majority,
}

/// One step of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalNode {
    /// Dense, unique within the template, ascending.
    pub sequence: u32,
    pub name: String,
    pub kind: NodeKind,
    pub approvers: ApproverSpec,
    pub mode: ApprovalMode,
    /// A required node with no resolvable approver fails the advance; an
    /// optional one is skipped.
    pub is_required: bool,
    pub can_reject: bool,
    pub can_transfer: bool,
    /// Overrides the template default when set.
    pub timeout_hours: Option<i64>,
    /// Branch nodes only: condition over the entity snapshot.
    pub condition: Option<BranchCondition>,
}

impl ApprovalNode {
    /// A plain single-approver node; the common case in seeded templates.
    pub fn approval(sequence: u32, name: impl Into<String>, approvers: ApproverSpec) -> Self {
        Self {
            sequence,
            name: name.into(),
            kind: NodeKind::Approval,
            approvers,
            mode: ApprovalMode::Single,
            is_required: true,
            can_reject: true,
            can_transfer: true,
            timeout_hours: None,
            condition: None,
        }
    }

    pub fn with_mode(mut self, mode: ApprovalMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn optional(mut self) -> Self {
        self.is_required = false;
        self
    }

    pub fn with_timeout_hours(mut self, hours: i64) -> Self {
        self.timeout_hours = Some(hours);
        self
    }
}

/// Comparison operator of a branch condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// `snapshot[field] <op> value`, evaluated when the chain reaches the branch.
///
/// A missing or mistyped snapshot field evaluates to false: collaborators own
/// the snapshot shape and the engine must tolerate gaps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchCondition {
    pub field: String,
    pub op: BranchOp,
    pub value: serde_json::Value,
}

impl BranchCondition {
    pub fn evaluate(&self, snapshot: &EntitySnapshot) -> bool {
        let Some(actual) = snapshot.get(&self.field) else {
            return false;
        };
        match (actual.as_f64(), self.value.as_f64()) {
            (Some(a), Some(b)) => match self.op {
                BranchOp::Eq => a == b,
                BranchOp::Ne => a != b,
                BranchOp::Gt => a > b,
                BranchOp::Ge => a >= b,
                BranchOp::Lt => a < b,
                BranchOp::Le => a <= b,
            },
            _ => match self.op {
                BranchOp::Eq => actual == &self.value,
                BranchOp::Ne => actual != &self.value,
                _ => false,
            },
        }
    }
}
