//! Notification service: creation, delivery, acknowledgement, escalation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use archerp_core::{DomainError, DomainResult, NotificationId, UserId};
use archerp_directory::Directory;

use crate::notification::{
    ConfirmationStatus, Notification, NotificationConfirmation, Severity, Urgency,
};
use crate::store::{NotificationStore, NotificationStoreError};
use crate::transport::{Transport, TransportMessage};

/// The narrow seam other crates use to emit notifications.
///
/// The approval engine depends on this trait, not on the full service, so it
/// can be exercised in tests with a recording notifier.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        recipient: UserId,
        title: &str,
        body: &str,
        category: &str,
        severity: Severity,
        context: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> DomainResult<NotificationId>;
}

/// Full notification service.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    /// Severities at or above this also go out via email/WeCom.
    transport_threshold: Severity,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        Self {
            store,
            transport,
            directory,
            transport_threshold: Severity::Warning,
        }
    }

    pub fn with_transport_threshold(mut self, threshold: Severity) -> Self {
        self.transport_threshold = threshold;
        self
    }

    /// Upgrade a notification to an escalation-tracked one at level 0.
    pub fn track(&self, id: NotificationId, urgency: Urgency) -> DomainResult<()> {
        let notification = self.load(id)?;
        let confirmation =
            NotificationConfirmation::new(notification.id, urgency, notification.created_at);
        self.store
            .upsert_confirmation(confirmation)
            .map_err(store_err)?;
        Ok(())
    }

    /// Mark read. For tracked notifications this moves the confirmation to
    /// `ReadUnconfirmed` but does not confirm; confirmation is a distinct act.
    pub fn mark_read(&self, id: NotificationId, user: UserId, now: DateTime<Utc>) -> DomainResult<()> {
        let mut notification = self.load(id)?;
        if notification.recipient != user {
            return Err(DomainError::not_authorized(format!(
                "user {user} is not the recipient of notification {id}"
            )));
        }
        if !notification.is_read {
            notification.is_read = true;
            notification.read_time = Some(now);
            self.store.update(&notification).map_err(store_err)?;
        }
        if let Some(mut confirmation) = self.store.confirmation(id).map_err(store_err)? {
            if confirmation.status == ConfirmationStatus::Pending {
                confirmation.status = ConfirmationStatus::ReadUnconfirmed;
                self.store
                    .upsert_confirmation(confirmation)
                    .map_err(store_err)?;
            }
        }
        Ok(())
    }

    /// Confirm a tracked notification. Stops all future escalation.
    ///
    /// Unlike `mark_read`, any user may confirm: once the ladder has pulled a
    /// supervisor in, that supervisor closes the loop on the recipient's
    /// behalf. `confirmed_by` records who actually did.
    pub fn confirm(
        &self,
        id: NotificationId,
        user: UserId,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut confirmation = self
            .store
            .confirmation(id)
            .map_err(store_err)?
            .ok_or_else(|| DomainError::not_found(format!("no confirmation tracking for {id}")))?;
        if confirmation.is_confirmed() {
            return Ok(());
        }
        confirmation.status = ConfirmationStatus::Confirmed;
        confirmation.confirmed_by = Some(user);
        confirmation.confirmed_at = Some(now);
        confirmation.confirm_comment = comment;
        self.store
            .upsert_confirmation(confirmation)
            .map_err(store_err)?;
        info!(notification = %id, %user, "notification confirmed");
        Ok(())
    }

    /// Walk every unconfirmed tracked notification and apply the escalation
    /// ladder. Returns the number of rungs fired. Re-running without time
    /// passing is a no-op because every rung checks the current level.
    ///
    /// Ladder: age ≥ 2h at level 0 → re-notify recipient; age ≥ 4h at level 1
    /// → notify the Directory-resolved supervisor; age ≥ 6h below level 3 for
    /// important/urgent → phone-escalation marker.
    pub fn scan_escalations(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut fired = 0usize;
        for confirmation in self.store.unconfirmed().map_err(store_err)? {
            fired += self.escalate_one(confirmation, now)?;
        }
        if fired > 0 {
            info!(fired, "escalation scan fired rungs");
        }
        Ok(fired)
    }

    fn escalate_one(
        &self,
        mut confirmation: NotificationConfirmation,
        now: DateTime<Utc>,
    ) -> DomainResult<usize> {
        let Some(notification) = self
            .store
            .get(confirmation.notification_id)
            .map_err(store_err)?
        else {
            warn!(
                notification = %confirmation.notification_id,
                "confirmation without notification, skipping"
            );
            return Ok(0);
        };

        let age = confirmation.age_hours(now);
        let mut fired = 0usize;

        if age >= 2 && confirmation.escalation_level == 0 {
            self.deliver(&notification.recipient, &reminder_message(&notification));
            confirmation.escalation_level = 1;
            confirmation.last_escalated_at = Some(now);
            fired += 1;
            debug!(notification = %notification.id, "escalation level 1: recipient re-notified");
        }

        if age >= 4 && confirmation.escalation_level == 1 {
            match self.directory.superior(notification.recipient) {
                Ok(Some(supervisor)) => {
                    self.deliver(&supervisor, &supervisor_message(&notification));
                    confirmation.escalated_to_user = Some(supervisor);
                    confirmation.escalation_level = 2;
                    confirmation.last_escalated_at = Some(now);
                    fired += 1;
                    info!(
                        notification = %notification.id,
                        %supervisor,
                        "escalation level 2: supervisor notified"
                    );
                }
                Ok(None) => {
                    warn!(
                        notification = %notification.id,
                        recipient = %notification.recipient,
                        "no supervisor resolvable, staying at level 1"
                    );
                }
                Err(err) => {
                    // Directory hiccups retry on the next scheduler pass.
                    warn!(notification = %notification.id, error = %err, "directory lookup failed");
                }
            }
        }

        if age >= 6
            && confirmation.escalation_level < 3
            && matches!(confirmation.urgency, Urgency::Important | Urgency::Urgent)
        {
            // When the supervisor rung never resolved, the phone call falls
            // back to the recipient; level 3 always names its target.
            let target = confirmation
                .escalated_to_user
                .get_or_insert(notification.recipient);
            info!(
                notification = %notification.id,
                recipient = %notification.recipient,
                target = %target,
                urgency = ?confirmation.urgency,
                "escalation level 3: phone escalation required"
            );
            confirmation.escalation_level = 3;
            confirmation.last_escalated_at = Some(now);
            fired += 1;
        }

        if fired > 0 {
            self.store
                .upsert_confirmation(confirmation)
                .map_err(store_err)?;
        }
        Ok(fired)
    }

    /// Best-effort outbound delivery for every channel the recipient has.
    fn deliver(&self, recipient: &UserId, message: &TransportMessage) {
        let user = match self.directory.user(*recipient) {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(%recipient, "recipient unknown to directory, in-app only");
                return;
            }
            Err(err) => {
                warn!(%recipient, error = %err, "directory lookup failed, in-app only");
                return;
            }
        };
        if let Some(email) = &user.email {
            if let Err(err) = self.transport.send_email(email, message) {
                warn!(%recipient, error = %err, "email delivery failed");
            }
        }
        if let Some(wecom_id) = &user.wecom_id {
            if let Err(err) = self.transport.send_wecom(wecom_id, message) {
                warn!(%recipient, error = %err, "wecom delivery failed");
            }
        }
    }

    pub fn list_for_recipient(&self, recipient: UserId) -> DomainResult<Vec<Notification>> {
        self.store.list_for_recipient(recipient).map_err(store_err)
    }

    pub fn get(&self, id: NotificationId) -> DomainResult<Option<Notification>> {
        self.store.get(id).map_err(store_err)
    }

    pub fn confirmation(
        &self,
        id: NotificationId,
    ) -> DomainResult<Option<NotificationConfirmation>> {
        self.store.confirmation(id).map_err(store_err)
    }

    fn load(&self, id: NotificationId) -> DomainResult<Notification> {
        self.store
            .get(id)
            .map_err(store_err)?
            .ok_or_else(|| DomainError::not_found(format!("notification {id}")))
    }
}

impl Notifier for NotificationService {
    fn notify(
        &self,
        recipient: UserId,
        title: &str,
        body: &str,
        category: &str,
        severity: Severity,
        context: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> DomainResult<NotificationId> {
        let notification = Notification {
            id: NotificationId::new(),
            recipient,
            title: title.to_string(),
            body: body.to_string(),
            category: category.to_string(),
            severity,
            context,
            is_read: false,
            read_time: None,
            created_at: now,
        };
        let id = notification.id;
        // In-app record first; outbound channels are best-effort afterwards.
        self.store.insert(notification.clone()).map_err(store_err)?;
        if severity >= self.transport_threshold {
            self.deliver(
                &recipient,
                &TransportMessage {
                    subject: notification.title.clone(),
                    body: notification.body.clone(),
                },
            );
        }
        debug!(notification = %id, %recipient, category, "notification created");
        Ok(id)
    }
}

fn reminder_message(notification: &Notification) -> TransportMessage {
    TransportMessage {
        subject: format!("[提醒] {}", notification.title),
        body: format!("您有一条未确认的通知，请及时处理。\n\n{}", notification.body),
    }
}

fn supervisor_message(notification: &Notification) -> TransportMessage {
    TransportMessage {
        subject: format!("[上报] 下属未确认通知: {}", notification.title),
        body: format!(
            "下属收到的通知超过 4 小时未确认，请跟进。\n\n{}",
            notification.body
        ),
    }
}

fn store_err(err: NotificationStoreError) -> DomainError {
    match err {
        NotificationStoreError::NotFound(id) => {
            DomainError::not_found(format!("notification {id}"))
        }
        NotificationStoreError::Storage(msg) => DomainError::validation(msg),
    }
}
