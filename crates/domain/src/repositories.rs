//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entities::{
    Job, JobFilter, JobStatus, JobType, NewJob, NewNotification, Notification, NotificationFilter,
};
use crate::notifications::JobEventNotifier;
use crate::transitions::JobTransition;
use streetwise_errors::StreetwiseResult;

/// 一次成功的状态迁移
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub job: Job,
    /// 与状态更新在同一事务中写入的通知
    pub notification: Option<Notification>,
}

/// 任务仓储抽象
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 创建任务，初始状态为 queued
    async fn create(&self, job: &NewJob) -> StreetwiseResult<Job>;

    /// 根据ID获取任务，不做归属校验
    async fn get_by_id(&self, id: i64) -> StreetwiseResult<Option<Job>>;

    /// 按过滤条件分页查询，按创建时间倒序
    async fn list(&self, filter: &JobFilter) -> StreetwiseResult<Vec<Job>>;

    /// 过滤条件下的总数（忽略 limit/offset）
    async fn count(&self, filter: &JobFilter) -> StreetwiseResult<i64>;

    /// 条件状态迁移
    ///
    /// # 参数
    /// * `id` - 任务ID
    /// * `owner` - 若提供，更新语句额外要求 `user_id = owner`
    /// * `transition` - 目标迁移
    /// * `notifier` - 迁移成功后生成通知，与状态更新在同一事务中写入
    ///
    /// # 返回值
    /// * `Ok(Some(outcome))` - 迁移成功
    /// * `Ok(None)` - 没有满足条件的行（不存在、不属于 owner、或状态不允许）
    async fn transition(
        &self,
        id: i64,
        owner: Option<&str>,
        transition: &JobTransition,
        notifier: &dyn JobEventNotifier,
    ) -> StreetwiseResult<Option<TransitionOutcome>>;

    /// 更新运行中任务的进度，进度只增不减
    async fn update_progress(
        &self,
        id: i64,
        progress: i32,
        current_step: Option<&str>,
    ) -> StreetwiseResult<Option<Job>>;

    /// 领取下一个可执行的排队任务并置为 running
    ///
    /// 按优先级降序、创建时间升序选择；`job_types` 为空表示不限类型。
    async fn claim_next(&self, job_types: &[JobType]) -> StreetwiseResult<Option<Job>>;

    /// 查找 `updated_at` 早于给定时间的运行中任务
    async fn find_stale_running(
        &self,
        updated_before: DateTime<Utc>,
        limit: i64,
    ) -> StreetwiseResult<Vec<Job>>;

    /// 删除指定终态下完成时间早于给定时间的任务，返回删除数量
    async fn delete_finished_before(
        &self,
        statuses: &[JobStatus],
        before: DateTime<Utc>,
    ) -> StreetwiseResult<u64>;
}

/// 通知仓储抽象
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, notification: &NewNotification) -> StreetwiseResult<Notification>;

    async fn get_by_id(&self, id: i64) -> StreetwiseResult<Option<Notification>>;

    /// 按创建时间倒序分页查询
    async fn list(&self, filter: &NotificationFilter) -> StreetwiseResult<Vec<Notification>>;

    /// 过滤条件下的总数（忽略 limit/offset）
    async fn count(&self, filter: &NotificationFilter) -> StreetwiseResult<i64>;

    async fn count_unread(&self, user_id: &str) -> StreetwiseResult<i64>;

    /// 设置已读/未读，返回 `None` 表示不存在或不属于该用户
    async fn set_read(
        &self,
        id: i64,
        user_id: &str,
        is_read: bool,
    ) -> StreetwiseResult<Option<Notification>>;

    /// 将用户所有未读通知标记为已读，返回受影响行数
    async fn mark_all_read(&self, user_id: &str) -> StreetwiseResult<u64>;

    /// 删除通知，返回是否删除了记录
    async fn delete(&self, id: i64, user_id: &str) -> StreetwiseResult<bool>;

    /// 删除 `dismiss_at` 已过期的通知
    async fn delete_dismissed(&self, now: DateTime<Utc>) -> StreetwiseResult<u64>;

    /// 删除阅读时间早于给定时间的已读通知
    async fn delete_read_before(&self, before: DateTime<Utc>) -> StreetwiseResult<u64>;
}
