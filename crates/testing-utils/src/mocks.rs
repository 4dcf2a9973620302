//! Test doubles for the notification hook used by job transitions

use std::sync::{Arc, Mutex};

use streetwise_domain::entities::{Job, JobStatus, NewNotification};
use streetwise_domain::notifications::{JobEventNotifier, JobNotificationTemplates};

/// Notifier that never produces notifications
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl JobEventNotifier for NoopNotifier {
    fn compose(&self, _job: &Job) -> Option<NewNotification> {
        None
    }
}

/// Notifier that records every job it was asked about and delegates to the
/// default templates
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    templates: JobNotificationTemplates,
    seen: Arc<Mutex<Vec<(i64, JobStatus)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(job id, status after the transition)` in call order
    pub fn seen(&self) -> Vec<(i64, JobStatus)> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl JobEventNotifier for RecordingNotifier {
    fn compose(&self, job: &Job) -> Option<NewNotification> {
        self.seen.lock().unwrap().push((job.id, job.status));
        self.templates.compose(job)
    }
}
