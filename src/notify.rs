//! Outbound notifications for stored reports.
//!
//! Mail delivery itself is external: reports are queued in the SQLite
//! outbox for a relay to pick up, or just logged in development.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::db::{DatabaseError, RiskStore};
use crate::models::*;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("No notification recipient configured")]
    NoRecipient,

    #[error("Cannot render notification body: {0}")]
    Render(String),

    #[error("Cannot queue notification: {0}")]
    Outbox(#[from] DatabaseError),
}

pub trait Notifier {
    fn send(&self, report_id: Option<&Uuid>, notification: &Notification) -> Result<(), NotifyError>;
}

/// Subject line plus a pretty-printed JSON body of the entry without its image.
pub fn build_notification(
    entry: &RiskEntry,
    recipient: &str,
    subject: &str,
) -> Result<Notification, NotifyError> {
    let body = serde_json::to_string_pretty(&entry.to_json_without_image())
        .map_err(|e| NotifyError::Render(e.to_string()))?;
    Ok(Notification {
        recipient: recipient.to_string(),
        subject: subject.to_string(),
        body,
    })
}

/// Queues messages in the `notification_outbox` table.
pub struct OutboxNotifier {
    store: Arc<dyn RiskStore + Send + Sync>,
}

impl OutboxNotifier {
    pub fn new(store: Arc<dyn RiskStore + Send + Sync>) -> Self {
        Self { store }
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, report_id: Option<&Uuid>, notification: &Notification) -> Result<(), NotifyError> {
        if notification.recipient.trim().is_empty() {
            return Err(NotifyError::NoRecipient);
        }
        let id = self.store.enqueue_notification(report_id, notification)?;
        tracing::info!(
            notification_id = %id,
            recipient = %notification.recipient,
            "Notification queued"
        );
        Ok(())
    }
}

/// Development notifier: logs the subject and body.
#[derive(Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, report_id: Option<&Uuid>, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            report_id = ?report_id,
            subject = %notification.subject,
            body = %notification.body,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Recording notifier for testing. Optionally fails every send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, _report_id: Option<&Uuid>, notification: &Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Render("recording notifier set to fail".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn send(&self, report_id: Option<&Uuid>, notification: &Notification) -> Result<(), NotifyError> {
        (**self).send(report_id, notification)
    }
}
