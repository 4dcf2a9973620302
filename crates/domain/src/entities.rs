use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use streetwise_errors::{StreetwiseError, StreetwiseResult};

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: i32 = 3;
/// 单个任务允许配置的最大重试次数上限
pub const MAX_RETRIES_LIMIT: i32 = 10;
/// 任务优先级取值范围
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = -100..=100;

const MAX_NOTIFICATION_TYPE_LEN: usize = 64;
const MAX_TITLE_LEN: usize = 200;
const MAX_MESSAGE_LEN: usize = 2000;
const MAX_ACTION_URL_LEN: usize = 2048;

/// 后台任务
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub user_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub progress: i32,
    pub current_step: Option<String>,
    pub input: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub metadata: Option<Value>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// 失败状态且仍有剩余重试次数
    pub fn can_retry(&self) -> bool {
        self.status == JobStatus::Failed && self.retry_count < self.max_retries
    }

    pub fn remaining_retries(&self) -> i32 {
        (self.max_retries - self.retry_count).max(0)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "任务 '{}' (ID: {}, 用户: {}, 状态: {})",
            self.job_type, self.id, self.user_id, self.status
        )
    }
}

/// 任务状态
///
/// ```text
/// queued ──start──▶ running ──complete──▶ completed
///   │                 │  └────fail─────▶ failed ──retry──▶ queued
///   └──cancel──┬──────┘
///              ▼
///          cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Queued, Cancelled)
                | (Running, Cancelled)
                | (Failed, Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StreetwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(StreetwiseError::validation_error(format!(
                "status: unknown job status '{s}'"
            ))),
        }
    }
}

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    WebsiteCrawl,
    PerformanceAnalysis,
    CompetitorAnalysis,
    ContentGeneration,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::WebsiteCrawl => "website_crawl",
            JobType::PerformanceAnalysis => "performance_analysis",
            JobType::CompetitorAnalysis => "competitor_analysis",
            JobType::ContentGeneration => "content_generation",
        }
    }

    /// 面向用户的名称，用于通知标题
    pub fn display_name(&self) -> &'static str {
        match self {
            JobType::WebsiteCrawl => "Website crawl",
            JobType::PerformanceAnalysis => "Performance analysis",
            JobType::CompetitorAnalysis => "Competitor analysis",
            JobType::ContentGeneration => "Content generation",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = StreetwiseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "website_crawl" => Ok(JobType::WebsiteCrawl),
            "performance_analysis" => Ok(JobType::PerformanceAnalysis),
            "competitor_analysis" => Ok(JobType::CompetitorAnalysis),
            "content_generation" => Ok(JobType::ContentGeneration),
            _ => Err(StreetwiseError::validation_error(format!(
                "type: unknown job type '{s}'"
            ))),
        }
    }
}

/// 创建任务所需的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub user_id: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub priority: i32,
    pub input: Value,
    pub metadata: Option<Value>,
    pub max_retries: i32,
}

impl NewJob {
    pub fn new<S: Into<String>>(user_id: S, job_type: JobType) -> Self {
        Self {
            user_id: user_id.into(),
            job_type,
            priority: 0,
            input: Value::Object(Default::default()),
            metadata: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = input;
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn validate(&self) -> StreetwiseResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(StreetwiseError::validation_error("userId: is required"));
        }
        if !(0..=MAX_RETRIES_LIMIT).contains(&self.max_retries) {
            return Err(StreetwiseError::validation_error(format!(
                "maxRetries: must be between 0 and {MAX_RETRIES_LIMIT}"
            )));
        }
        if !PRIORITY_RANGE.contains(&self.priority) {
            return Err(StreetwiseError::validation_error(format!(
                "priority: must be between {} and {}",
                PRIORITY_RANGE.start(),
                PRIORITY_RANGE.end()
            )));
        }
        if !self.input.is_object() {
            return Err(StreetwiseError::validation_error(
                "input: must be a JSON object",
            ));
        }
        Ok(())
    }
}

/// 用户通知
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub job_id: Option<i64>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub auto_dismiss: bool,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub dismiss_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}

/// 创建通知所需的数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub user_id: String,
    pub job_id: Option<i64>,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub auto_dismiss: bool,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub dismiss_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    pub fn new<U, T, H, M>(user_id: U, notification_type: T, title: H, message: M) -> Self
    where
        U: Into<String>,
        T: Into<String>,
        H: Into<String>,
        M: Into<String>,
    {
        Self {
            user_id: user_id.into(),
            job_id: None,
            notification_type: notification_type.into(),
            title: title.into(),
            message: message.into(),
            auto_dismiss: false,
            action_url: None,
            action_text: None,
            dismiss_at: None,
        }
    }

    pub fn with_job(mut self, job_id: i64) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_action<U: Into<String>, T: Into<String>>(mut self, url: U, text: T) -> Self {
        self.action_url = Some(url.into());
        self.action_text = Some(text.into());
        self
    }

    /// 标记为自动消失；`dismiss_at` 为空时由客户端决定何时隐藏
    pub fn with_auto_dismiss(mut self, dismiss_at: Option<DateTime<Utc>>) -> Self {
        self.auto_dismiss = true;
        self.dismiss_at = dismiss_at;
        self
    }

    pub fn validate(&self) -> StreetwiseResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(StreetwiseError::validation_error("userId: is required"));
        }
        require_text("type", &self.notification_type, MAX_NOTIFICATION_TYPE_LEN)?;
        require_text("title", &self.title, MAX_TITLE_LEN)?;
        require_text("message", &self.message, MAX_MESSAGE_LEN)?;
        if let Some(url) = &self.action_url {
            if url.len() > MAX_ACTION_URL_LEN {
                return Err(StreetwiseError::validation_error(format!(
                    "actionUrl: must be at most {MAX_ACTION_URL_LEN} characters"
                )));
            }
        }
        Ok(())
    }
}

fn require_text(field: &str, value: &str, max_len: usize) -> StreetwiseResult<()> {
    if value.trim().is_empty() {
        return Err(StreetwiseError::validation_error(format!(
            "{field}: is required"
        )));
    }
    if value.chars().count() > max_len {
        return Err(StreetwiseError::validation_error(format!(
            "{field}: must be at most {max_len} characters"
        )));
    }
    Ok(())
}

/// 任务查询过滤器
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub user_id: Option<String>,
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl JobFilter {
    pub fn for_user<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

/// 一页任务以及过滤条件下的总数
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl JobPage {
    pub fn has_more(&self) -> bool {
        self.offset + (self.jobs.len() as i64) < self.total
    }
}

/// 通知查询过滤器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationFilter {
    pub user_id: String,
    pub unread_only: bool,
    pub limit: i64,
    pub offset: i64,
}

impl NotificationFilter {
    pub fn new<S: Into<String>>(user_id: S, unread_only: bool, limit: i64, offset: i64) -> Self {
        Self {
            user_id: user_id.into(),
            unread_only,
            limit,
            offset,
        }
    }
}

/// 一页通知
///
/// `unread_count` 是该用户全部未读通知数，与分页无关；`total` 是过滤条件下的总数。
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl NotificationPage {
    pub fn has_more(&self) -> bool {
        self.offset + (self.notifications.len() as i64) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_job(status: JobStatus) -> Job {
        let now = Utc::now();
        Job {
            id: 1,
            user_id: "user-a".to_string(),
            job_type: JobType::WebsiteCrawl,
            status,
            priority: 0,
            progress: 0,
            current_step: None,
            input: json!({"url": "https://example.com"}),
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
        }
    }

    #[test]
    fn test_job_status_round_trip_strings() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_terminal_and_cancel_rules() {
        assert!(JobStatus::Queued.can_cancel());
        assert!(JobStatus::Running.can_cancel());
        for status in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            assert!(status.is_terminal());
            assert!(!status.can_cancel());
        }
    }

    #[test]
    fn test_state_machine_edges() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Running));
        assert!(JobStatus::Failed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Completed));
        assert!(!JobStatus::Cancelled.can_transition_to(JobStatus::Running));
    }

    #[test]
    fn test_job_serializes_camel_case_with_type_field() {
        let job = sample_job(JobStatus::Queued);
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "website_crawl");
        assert_eq!(value["status"], "queued");
        assert_eq!(value["retryCount"], 0);
        assert_eq!(value["maxRetries"], 3);
        assert!(value.get("userId").is_some());
        assert!(value.get("job_type").is_none());
    }

    #[test]
    fn test_can_retry() {
        let mut job = sample_job(JobStatus::Failed);
        assert!(job.can_retry());
        assert_eq!(job.remaining_retries(), 3);
        job.retry_count = 3;
        assert!(!job.can_retry());
        assert_eq!(job.remaining_retries(), 0);
        assert!(!sample_job(JobStatus::Running).can_retry());
    }

    #[test]
    fn test_new_job_validation() {
        assert!(NewJob::new("user-a", JobType::WebsiteCrawl).validate().is_ok());
        assert!(NewJob::new("", JobType::WebsiteCrawl).validate().is_err());
        assert!(NewJob::new("u", JobType::WebsiteCrawl)
            .with_max_retries(11)
            .validate()
            .is_err());
        assert!(NewJob::new("u", JobType::WebsiteCrawl)
            .with_priority(500)
            .validate()
            .is_err());
        assert!(NewJob::new("u", JobType::WebsiteCrawl)
            .with_input(json!([1, 2]))
            .validate()
            .is_err());
    }

    #[test]
    fn test_new_notification_validation_reports_field() {
        let ok = NewNotification::new("user-a", "job_failed", "X", "Y");
        assert!(ok.validate().is_ok());

        let missing_title = NewNotification::new("user-a", "job_failed", "  ", "Y");
        let err = missing_title.validate().unwrap_err();
        assert!(matches!(err, StreetwiseError::ValidationError(msg) if msg.starts_with("title")));

        let missing_type = NewNotification::new("user-a", "", "X", "Y");
        let err = missing_type.validate().unwrap_err();
        assert!(matches!(err, StreetwiseError::ValidationError(msg) if msg.starts_with("type")));
    }

    #[test]
    fn test_page_has_more() {
        let page = NotificationPage {
            notifications: vec![],
            unread_count: 0,
            total: 0,
            limit: 20,
            offset: 0,
        };
        assert!(!page.has_more());

        let page = JobPage {
            jobs: vec![sample_job(JobStatus::Queued)],
            total: 5,
            limit: 1,
            offset: 3,
        };
        assert!(page.has_more());
    }
}
