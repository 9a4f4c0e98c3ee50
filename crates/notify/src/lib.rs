//! Multi-channel notification with confirmation tracking.
//!
//! Creates in-app notification records, hands formatted payloads to the
//! email/WeCom transports best-effort, and runs the read/acknowledge
//! escalation ladder (T+2h re-notify, T+4h supervisor, T+6h phone marker for
//! important/urgent items).

pub mod notification;
pub mod service;
pub mod store;
pub mod transport;

pub use notification::{
    ConfirmationStatus, Notification, NotificationConfirmation, Severity, Urgency,
};
pub use service::{NotificationService, Notifier};
pub use store::{InMemoryNotificationStore, NotificationStore, NotificationStoreError};
pub use transport::{NullTransport, RecordingTransport, Transport, TransportMessage};
