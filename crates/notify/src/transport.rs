//! Outbound transport port (email / WeCom).
//!
//! Delivery is best-effort: the service logs transport failures and moves on.
//! A missing email must never block an approval decision.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// A formatted outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    pub subject: String,
    pub body: String,
}

/// Transport error. Absorbed (logged, not propagated) by the service.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

/// Outbound delivery port.
pub trait Transport: Send + Sync {
    fn send_email(&self, address: &str, message: &TransportMessage) -> Result<(), TransportError>;

    fn send_wecom(&self, wecom_id: &str, message: &TransportMessage) -> Result<(), TransportError>;
}

/// Transport that drops everything. Default for deployments without
/// mail/WeCom credentials configured.
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn send_email(&self, _address: &str, _message: &TransportMessage) -> Result<(), TransportError> {
        Ok(())
    }

    fn send_wecom(&self, _wecom_id: &str, _message: &TransportMessage) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Test double that records every send.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    pub emails: Mutex<Vec<(String, TransportMessage)>>,
    pub wecom: Mutex<Vec<(String, TransportMessage)>>,
    /// When set, every send fails; used to assert best-effort semantics.
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    pub fn wecom_count(&self) -> usize {
        self.wecom.lock().unwrap().len()
    }

    fn failing(&self) -> bool {
        self.fail.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Transport for RecordingTransport {
    fn send_email(&self, address: &str, message: &TransportMessage) -> Result<(), TransportError> {
        if self.failing() {
            return Err(TransportError("smtp refused".into()));
        }
        self.emails
            .lock()
            .unwrap()
            .push((address.to_string(), message.clone()));
        Ok(())
    }

    fn send_wecom(&self, wecom_id: &str, message: &TransportMessage) -> Result<(), TransportError> {
        if self.failing() {
            return Err(TransportError("wecom api error".into()));
        }
        self.wecom
            .lock()
            .unwrap()
            .push((wecom_id.to_string(), message.clone()));
        Ok(())
    }
}
