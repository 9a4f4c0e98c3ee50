//! Notification storage.

use std::collections::HashMap;
use std::sync::RwLock;

use archerp_core::NotificationId;

use crate::notification::{Notification, NotificationConfirmation};

/// Notification store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotificationStoreError {
    #[error("notification not found: {0}")]
    NotFound(NotificationId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Store abstraction for notifications and their confirmation tracking.
pub trait NotificationStore: Send + Sync {
    fn insert(&self, notification: Notification) -> Result<(), NotificationStoreError>;

    fn get(&self, id: NotificationId) -> Result<Option<Notification>, NotificationStoreError>;

    fn update(&self, notification: &Notification) -> Result<(), NotificationStoreError>;

    fn upsert_confirmation(
        &self,
        confirmation: NotificationConfirmation,
    ) -> Result<(), NotificationStoreError>;

    fn confirmation(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationConfirmation>, NotificationStoreError>;

    /// All confirmations not yet confirmed (escalation scan input).
    fn unconfirmed(&self) -> Result<Vec<NotificationConfirmation>, NotificationStoreError>;

    fn list_for_recipient(
        &self,
        recipient: archerp_core::UserId,
    ) -> Result<Vec<Notification>, NotificationStoreError>;
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    notifications: RwLock<HashMap<NotificationId, Notification>>,
    confirmations: RwLock<HashMap<NotificationId, NotificationConfirmation>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NotificationStore for InMemoryNotificationStore {
    fn insert(&self, notification: Notification) -> Result<(), NotificationStoreError> {
        self.notifications
            .write()
            .unwrap()
            .insert(notification.id, notification);
        Ok(())
    }

    fn get(&self, id: NotificationId) -> Result<Option<Notification>, NotificationStoreError> {
        Ok(self.notifications.read().unwrap().get(&id).cloned())
    }

    fn update(&self, notification: &Notification) -> Result<(), NotificationStoreError> {
        let mut map = self.notifications.write().unwrap();
        if !map.contains_key(&notification.id) {
            return Err(NotificationStoreError::NotFound(notification.id));
        }
        map.insert(notification.id, notification.clone());
        Ok(())
    }

    fn upsert_confirmation(
        &self,
        confirmation: NotificationConfirmation,
    ) -> Result<(), NotificationStoreError> {
        self.confirmations
            .write()
            .unwrap()
            .insert(confirmation.notification_id, confirmation);
        Ok(())
    }

    fn confirmation(
        &self,
        id: NotificationId,
    ) -> Result<Option<NotificationConfirmation>, NotificationStoreError> {
        Ok(self.confirmations.read().unwrap().get(&id).cloned())
    }

    fn unconfirmed(&self) -> Result<Vec<NotificationConfirmation>, NotificationStoreError> {
        Ok(self
            .confirmations
            .read()
            .unwrap()
            .values()
            .filter(|c| !c.is_confirmed())
            .cloned()
            .collect())
    }

    fn list_for_recipient(
        &self,
        recipient: archerp_core::UserId,
    ) -> Result<Vec<Notification>, NotificationStoreError> {
        let mut found: Vec<Notification> = self
            .notifications
            .read()
            .unwrap()
            .values()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect();
        found.sort_by_key(|n| n.created_at);
        Ok(found)
    }
}
