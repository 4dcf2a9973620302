use async_trait::async_trait;
use serde_json::Value;

use streetwise_domain::entities::{
    Job, JobPage, JobStatus, JobType, NewNotification, Notification, NotificationPage,
};
use streetwise_errors::StreetwiseResult;

/// 创建任务请求，未提供的字段使用配置中的默认值
#[derive(Debug, Clone, PartialEq)]
pub struct CreateJobRequest {
    pub job_type: JobType,
    pub priority: Option<i32>,
    pub input: Option<Value>,
    pub metadata: Option<Value>,
    pub max_retries: Option<i32>,
}

impl CreateJobRequest {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            priority: None,
            input: None,
            metadata: None,
            max_retries: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationListQuery {
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 任务生命周期服务
///
/// 用户操作都带 `user_id`，仓储更新语句同时以 `user_id` 为条件；
/// Worker 操作不做归属校验，由 API 层的 `job:execute` 权限保护。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobService: Send + Sync {
    async fn create_job(&self, user_id: &str, request: CreateJobRequest) -> StreetwiseResult<Job>;

    /// 按ID获取任务，不做归属校验；调用方负责检查 `Job::is_owned_by`
    async fn get_job(&self, id: i64) -> StreetwiseResult<Job>;

    async fn list_jobs(&self, user_id: &str, query: JobListQuery) -> StreetwiseResult<JobPage>;

    async fn cancel_job(&self, id: i64, user_id: &str) -> StreetwiseResult<Job>;

    async fn retry_job(&self, id: i64, user_id: &str) -> StreetwiseResult<Job>;

    async fn claim_next_job(&self, job_types: Vec<JobType>) -> StreetwiseResult<Option<Job>>;

    async fn start_job(&self, id: i64, current_step: Option<String>) -> StreetwiseResult<Job>;

    async fn report_progress(
        &self,
        id: i64,
        progress: i32,
        current_step: Option<String>,
    ) -> StreetwiseResult<Job>;

    async fn complete_job(&self, id: i64, result: Value) -> StreetwiseResult<Job>;

    async fn fail_job(&self, id: i64, error: String) -> StreetwiseResult<Job>;

    /// 将超时未更新的运行中任务标记为失败，返回处理数量
    async fn expire_stale_jobs(&self) -> StreetwiseResult<usize>;
}

/// 用户通知服务
#[async_trait]
pub trait NotificationService: Send + Sync {
    async fn list_notifications(
        &self,
        user_id: &str,
        query: NotificationListQuery,
    ) -> StreetwiseResult<NotificationPage>;

    async fn create_notification(
        &self,
        notification: NewNotification,
    ) -> StreetwiseResult<Notification>;

    async fn mark_read(
        &self,
        id: i64,
        user_id: &str,
        is_read: bool,
    ) -> StreetwiseResult<Notification>;

    async fn mark_all_read(&self, user_id: &str) -> StreetwiseResult<u64>;

    async fn delete_notification(&self, id: i64, user_id: &str) -> StreetwiseResult<()>;
}
