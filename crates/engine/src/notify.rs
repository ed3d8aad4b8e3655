use std::sync::{Arc, Mutex};

use timebank_core::domain::document::DocumentId;
use timebank_core::domain::subject::SubjectId;

/// Events the core fires at the notification dispatcher. Delivery is
/// fire-and-forget: a transition never waits on, or fails because of, the
/// dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    StepActivated { document_id: DocumentId, order: u32, approvers: Vec<SubjectId> },
    DocumentApproved { document_id: DocumentId, subject: SubjectId },
    DocumentRejected { document_id: DocumentId, subject: SubjectId, reason: String },
}

pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, notification: Notification);
}

/// Used where no delivery channel is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl NotificationDispatch for NoopNotifier {
    fn dispatch(&self, _notification: Notification) {}
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notifications: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        match self.notifications.lock() {
            Ok(notifications) => notifications.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationDispatch for RecordingNotifier {
    fn dispatch(&self, notification: Notification) {
        match self.notifications.lock() {
            Ok(mut notifications) => notifications.push(notification),
            Err(poisoned) => poisoned.into_inner().push(notification),
        }
    }
}
