//! Running approval instances and their per-approver records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use archerp_core::{EntityRef, EntitySnapshot, InstanceId, TemplateId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// No decision recorded on the current node yet.
    Pending,
    /// Some decision recorded, instance not yet terminal.
    InProgress,
    Approved,
    Rejected,
    Withdrawn,
    Timeout,
    Cancelled,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InstanceStatus::Approved
                | InstanceStatus::Rejected
                | InstanceStatus::Withdrawn
                | InstanceStatus::Timeout
                | InstanceStatus::Cancelled
        )
    }
}

/// Format the human instance number: `{CODE}-{YYYYMMDD}-{NNNN}`.
///
/// `serial` is monotonic per (code, local date), zero-padded to four digits,
/// resetting daily.
pub fn format_instance_number(code: &str, date: NaiveDate, serial: u32) -> String {
    format!("{}-{}-{:04}", code.to_uppercase(), date.format("%Y%m%d"), serial)
}

/// A live workflow execution against one business entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: InstanceId,
    pub number: String,
    pub template_id: TemplateId,
    pub workflow_code: String,
    pub entity: EntityRef,
    /// Entity attributes frozen at submission; callbacks and branch
    /// conditions read this, never the live entity.
    pub snapshot: EntitySnapshot,
    pub applicant: UserId,
    pub comment: Option<String>,
    pub applied_at: DateTime<Utc>,
    /// Sequence of the active node. `None` iff the status is terminal.
    pub current_node: Option<u32>,
    /// When the active node was entered (timeout reference point).
    pub node_entered_at: Option<DateTime<Utc>>,
    /// Set once the timeout reminder for the active node has gone out, so the
    /// 15-minute scanner does not re-notify every pass. Reset on node entry.
    pub timeout_notified_at: Option<DateTime<Utc>>,
    pub status: InstanceStatus,
    pub finished_at: Option<DateTime<Utc>>,
    /// Message of a failed terminal callback, surfaced to operators; cleared
    /// by a successful retry.
    pub callback_warning: Option<String>,
}

impl ApprovalInstance {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The §8 structural invariant: exactly one of (current node set,
    /// terminal status) holds.
    pub fn invariant_holds(&self) -> bool {
        self.current_node.is_some() != self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordResult {
    Pending,
    Approved,
    Rejected,
    Transferred,
    Withdrawn,
    /// Outstanding record voided by a terminal transition elsewhere.
    Cancelled,
}

/// One row per (instance, node, approver).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub id: Uuid,
    pub instance: InstanceId,
    pub node_sequence: u32,
    pub approver: UserId,
    pub result: RecordResult,
    pub comment: Option<String>,
    pub attachments: Vec<String>,
    pub decided_at: Option<DateTime<Utc>>,
    /// Set when result is `Transferred`.
    pub transfer_target: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRecord {
    pub fn pending(
        instance: InstanceId,
        node_sequence: u32,
        approver: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            instance,
            node_sequence,
            approver,
            result: RecordResult::Pending,
            comment: None,
            attachments: Vec::new(),
            decided_at: None,
            transfer_target: None,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.result == RecordResult::Pending
    }

    /// Records that still count toward the node's approver set (transferred
    /// and cancelled rows are replaced or void).
    pub fn counts_for_decision(&self) -> bool {
        !matches!(self.result, RecordResult::Transferred | RecordResult::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(
            format_instance_number("customer_management_approval", date, 7),
            "CUSTOMER_MANAGEMENT_APPROVAL-20260302-0007"
        );
        assert_eq!(format_instance_number("seal", date, 1234), "SEAL-20260302-1234");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!InstanceStatus::Pending.is_terminal());
        assert!(!InstanceStatus::InProgress.is_terminal());
        for s in [
            InstanceStatus::Approved,
            InstanceStatus::Rejected,
            InstanceStatus::Withdrawn,
            InstanceStatus::Timeout,
            InstanceStatus::Cancelled,
        ] {
            assert!(s.is_terminal());
        }
    }
}
