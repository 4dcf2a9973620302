//! 任务终态通知模板

use chrono::{Duration, Utc};

use crate::entities::{Job, JobStatus, NewNotification};

pub const JOB_COMPLETED: &str = "job_completed";
pub const JOB_FAILED: &str = "job_failed";
pub const JOB_CANCELLED: &str = "job_cancelled";

/// 根据任务的新状态生成通知
///
/// 仓储在状态迁移所在的事务中调用，返回 `None` 表示不产生通知。
pub trait JobEventNotifier: Send + Sync {
    fn compose(&self, job: &Job) -> Option<NewNotification>;
}

/// 默认通知模板
#[derive(Debug, Clone)]
pub struct JobNotificationTemplates {
    pub enabled: bool,
    pub auto_dismiss_after: Option<Duration>,
}

impl Default for JobNotificationTemplates {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_dismiss_after: Some(Duration::hours(24)),
        }
    }
}

impl JobNotificationTemplates {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            auto_dismiss_after: None,
        }
    }

    fn job_url(job: &Job) -> String {
        format!("/dashboard/jobs/{}", job.id)
    }

    fn dismiss_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.auto_dismiss_after.map(|after| Utc::now() + after)
    }
}

impl JobEventNotifier for JobNotificationTemplates {
    fn compose(&self, job: &Job) -> Option<NewNotification> {
        if !self.enabled {
            return None;
        }
        let name = job.job_type.display_name();
        let notification = match job.status {
            JobStatus::Completed => NewNotification::new(
                job.user_id.clone(),
                JOB_COMPLETED,
                format!("{name} completed"),
                format!("Your {} job #{} finished successfully.", name.to_lowercase(), job.id),
            )
            .with_action(Self::job_url(job), "View results")
            .with_auto_dismiss(self.dismiss_at()),
            JobStatus::Failed => {
                let reason = job.error.as_deref().unwrap_or("unknown error");
                let action_text = if job.can_retry() {
                    "Retry job"
                } else {
                    "View details"
                };
                NewNotification::new(
                    job.user_id.clone(),
                    JOB_FAILED,
                    format!("{name} failed"),
                    format!("Your {} job #{} failed: {reason}", name.to_lowercase(), job.id),
                )
                .with_action(Self::job_url(job), action_text)
            }
            JobStatus::Cancelled => NewNotification::new(
                job.user_id.clone(),
                JOB_CANCELLED,
                format!("{name} cancelled"),
                format!("Your {} job #{} was cancelled.", name.to_lowercase(), job.id),
            )
            .with_action(Self::job_url(job), "View details")
            .with_auto_dismiss(self.dismiss_at()),
            JobStatus::Queued | JobStatus::Running => return None,
        };
        Some(notification.with_job(job.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::JobType;
    use serde_json::json;

    fn job(status: JobStatus, retry_count: i32) -> Job {
        let now = Utc::now();
        Job {
            id: 42,
            user_id: "user-a".into(),
            job_type: JobType::PerformanceAnalysis,
            status,
            priority: 0,
            progress: 0,
            current_step: None,
            input: json!({}),
            result: None,
            error: Some("crawler unreachable".into()),
            metadata: None,
            retry_count,
            max_retries: 3,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_no_notification_for_active_states() {
        let templates = JobNotificationTemplates::default();
        assert!(templates.compose(&job(JobStatus::Queued, 0)).is_none());
        assert!(templates.compose(&job(JobStatus::Running, 0)).is_none());
    }

    #[test]
    fn test_completed_notification() {
        let templates = JobNotificationTemplates::default();
        let n = templates.compose(&job(JobStatus::Completed, 0)).unwrap();
        assert_eq!(n.notification_type, JOB_COMPLETED);
        assert_eq!(n.title, "Performance analysis completed");
        assert_eq!(n.job_id, Some(42));
        assert_eq!(n.user_id, "user-a");
        assert!(n.auto_dismiss);
        assert!(n.dismiss_at.is_some());
        assert_eq!(n.action_url.as_deref(), Some("/dashboard/jobs/42"));
        assert!(n.validate().is_ok());
    }

    #[test]
    fn test_failed_notification_offers_retry_only_with_budget() {
        let templates = JobNotificationTemplates::default();
        let n = templates.compose(&job(JobStatus::Failed, 1)).unwrap();
        assert_eq!(n.notification_type, JOB_FAILED);
        assert!(n.message.contains("crawler unreachable"));
        assert_eq!(n.action_text.as_deref(), Some("Retry job"));
        assert!(!n.auto_dismiss);

        let n = templates.compose(&job(JobStatus::Failed, 3)).unwrap();
        assert_eq!(n.action_text.as_deref(), Some("View details"));
    }

    #[test]
    fn test_disabled_templates() {
        let templates = JobNotificationTemplates::disabled();
        assert!(templates.compose(&job(JobStatus::Completed, 0)).is_none());
    }
}
