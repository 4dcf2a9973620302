//! Test data builders for creating test entities
//!
//! Builders start from a queued job / unread notification owned by
//! `user-a` and let tests override only what they care about.

use chrono::Utc;
use serde_json::{json, Value};
use streetwise_domain::entities::{Job, JobStatus, JobType, NewJob, NewNotification};

/// Builder for creating test Job entities
pub struct JobBuilder {
    job: Job,
}

impl JobBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            job: Job {
                id: 1,
                user_id: "user-a".to_string(),
                job_type: JobType::WebsiteCrawl,
                status: JobStatus::Queued,
                priority: 0,
                progress: 0,
                current_step: None,
                input: json!({}),
                result: None,
                error: None,
                metadata: None,
                retry_count: 0,
                max_retries: 3,
                next_retry_at: None,
                created_at: now,
                updated_at: now,
                started_at: None,
                completed_at: None,
            },
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.job.id = id;
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.job.user_id = user_id.to_string();
        self
    }

    pub fn with_type(mut self, job_type: JobType) -> Self {
        self.job.job_type = job_type;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.job.input = input;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }

    /// The insertable part of the job, for seeding a repository
    pub fn build_new(self) -> NewJob {
        let job = self.job;
        NewJob::new(job.user_id, job.job_type)
            .with_priority(job.priority)
            .with_input(job.input)
            .with_max_retries(job.max_retries)
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for insertable test notifications
pub struct NotificationBuilder {
    notification: NewNotification,
}

impl NotificationBuilder {
    pub fn new() -> Self {
        Self {
            notification: NewNotification::new(
                "user-a",
                "system",
                "Test notification",
                "Something happened",
            ),
        }
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.notification.user_id = user_id.to_string();
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.notification.title = title.to_string();
        self
    }

    pub fn build_new(self) -> NewNotification {
        self.notification
    }
}

impl Default for NotificationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
