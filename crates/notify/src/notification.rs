//! Notification records and escalation-tracked confirmations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use archerp_core::{NotificationId, UserId};

/// Notification severity. Severities at or above the transport threshold also
/// go out via email/WeCom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Urgency of an escalation-tracked notification. The phone-escalation rung
/// only fires for `Important` and `Urgent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Normal,
    Important,
    Urgent,
}

/// Acknowledgement state of a tracked notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    ReadUnconfirmed,
    Confirmed,
}

/// In-app notification record.
///
/// `context` is a free-form key/value map carrying enough to deep-link back
/// into the source entity; readers must tolerate missing keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub title: String,
    pub body: String,
    pub category: String,
    pub severity: Severity,
    pub context: Map<String, Value>,
    pub is_read: bool,
    pub read_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn context_str(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

/// Escalation tracking attached to a notification.
///
/// `escalation_level` only ever increases; once `Confirmed`, no further
/// escalation happens regardless of age. `escalated_to_user` is set exactly
/// when the supervisor rung (level 2) has fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfirmation {
    pub notification_id: NotificationId,
    pub status: ConfirmationStatus,
    pub urgency: Urgency,
    pub escalation_level: u8,
    pub sent_at: DateTime<Utc>,
    pub last_escalated_at: Option<DateTime<Utc>>,
    pub escalated_to_user: Option<UserId>,
    pub confirmed_by: Option<UserId>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirm_comment: Option<String>,
}

impl NotificationConfirmation {
    pub fn new(notification_id: NotificationId, urgency: Urgency, sent_at: DateTime<Utc>) -> Self {
        Self {
            notification_id,
            status: ConfirmationStatus::Pending,
            urgency,
            escalation_level: 0,
            sent_at,
            last_escalated_at: None,
            escalated_to_user: None,
            confirmed_by: None,
            confirmed_at: None,
            confirm_comment: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ConfirmationStatus::Confirmed
    }

    /// Hours elapsed since the notification was sent.
    pub fn age_hours(&self, now: DateTime<Utc>) -> i64 {
        (now - self.sent_at).num_hours()
    }
}
