use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use streetwise_config::JobsConfig;
use streetwise_domain::{
    entities::{Job, JobFilter, JobPage, JobStatus, JobType, NewJob},
    notifications::JobEventNotifier,
    repositories::{JobRepository, TransitionOutcome},
    transitions::JobTransition,
};
use streetwise_errors::{StreetwiseError, StreetwiseResult};

use crate::interfaces::{CreateJobRequest, JobListQuery, JobService};

pub const DEFAULT_JOB_PAGE_SIZE: i64 = 20;
pub const MAX_JOB_PAGE_SIZE: i64 = 100;

/// 任务生命周期管理
///
/// 所有状态迁移都交给仓储的条件更新；没有行被更新时再读取一次任务，
/// 把失败原因归类为不存在、无权限、状态不允许或重试次数用尽。
pub struct JobManager {
    job_repository: Arc<dyn JobRepository>,
    notifier: Arc<dyn JobEventNotifier>,
    config: JobsConfig,
}

impl JobManager {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        notifier: Arc<dyn JobEventNotifier>,
        config: JobsConfig,
    ) -> Self {
        Self {
            job_repository,
            notifier,
            config,
        }
    }

    async fn apply_transition(
        &self,
        id: i64,
        owner: Option<&str>,
        transition: JobTransition,
    ) -> StreetwiseResult<Job> {
        let outcome = self
            .job_repository
            .transition(id, owner, &transition, self.notifier.as_ref())
            .await?;

        match outcome {
            Some(TransitionOutcome { job, notification }) => {
                counter!("streetwise_job_transitions_total", "action" => transition.action())
                    .increment(1);
                if let Some(notification) = notification {
                    counter!(
                        "streetwise_notifications_created_total",
                        "type" => notification.notification_type.clone()
                    )
                    .increment(1);
                }
                info!(
                    job_id = job.id,
                    status = %job.status,
                    "任务状态迁移成功: {}",
                    transition.action()
                );
                Ok(job)
            }
            None => Err(self.classify_rejection(id, owner, &transition).await),
        }
    }

    async fn classify_rejection(
        &self,
        id: i64,
        owner: Option<&str>,
        transition: &JobTransition,
    ) -> StreetwiseError {
        let job = match self.job_repository.get_by_id(id).await {
            Ok(Some(job)) => job,
            Ok(None) => return StreetwiseError::job_not_found(id),
            Err(e) => return e,
        };

        if let Some(owner) = owner {
            if !job.is_owned_by(owner) {
                warn!(job_id = id, user_id = owner, "拒绝访问其他用户的任务");
                return StreetwiseError::job_access_denied(id);
            }
        }

        if matches!(transition, JobTransition::Retry)
            && job.status == JobStatus::Failed
            && job.retry_count >= job.max_retries
        {
            return StreetwiseError::RetryLimitExceeded {
                id,
                retry_count: job.retry_count,
                max_retries: job.max_retries,
            };
        }

        debug!(
            job_id = id,
            status = %job.status,
            "任务状态不允许执行 {}",
            transition.action()
        );
        StreetwiseError::invalid_state(id, job.status.as_str(), transition.action())
    }

    fn page_bounds(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
        let limit = limit
            .unwrap_or(DEFAULT_JOB_PAGE_SIZE)
            .clamp(1, MAX_JOB_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[async_trait]
impl JobService for JobManager {
    #[instrument(skip(self, request), fields(job_type = %request.job_type))]
    async fn create_job(&self, user_id: &str, request: CreateJobRequest) -> StreetwiseResult<Job> {
        let mut job = NewJob::new(user_id, request.job_type)
            .with_priority(request.priority.unwrap_or(self.config.default_priority))
            .with_max_retries(
                request
                    .max_retries
                    .unwrap_or(self.config.default_max_retries),
            );
        if let Some(input) = request.input {
            job = job.with_input(input);
        }
        if let Some(metadata) = request.metadata {
            job = job.with_metadata(metadata);
        }
        job.validate()?;

        let created = self.job_repository.create(&job).await?;
        counter!("streetwise_jobs_created_total", "type" => created.job_type.as_str())
            .increment(1);
        Ok(created)
    }

    async fn get_job(&self, id: i64) -> StreetwiseResult<Job> {
        self.job_repository
            .get_by_id(id)
            .await?
            .ok_or_else(|| StreetwiseError::job_not_found(id))
    }

    async fn list_jobs(&self, user_id: &str, query: JobListQuery) -> StreetwiseResult<JobPage> {
        let (limit, offset) = Self::page_bounds(query.limit, query.offset);
        let filter = JobFilter {
            user_id: Some(user_id.to_string()),
            status: query.status,
            job_type: query.job_type,
            limit: Some(limit),
            offset: Some(offset),
        };

        let jobs = self.job_repository.list(&filter).await?;
        let total = self.job_repository.count(&filter).await?;
        Ok(JobPage {
            jobs,
            total,
            limit,
            offset,
        })
    }

    #[instrument(skip(self))]
    async fn cancel_job(&self, id: i64, user_id: &str) -> StreetwiseResult<Job> {
        self.apply_transition(id, Some(user_id), JobTransition::Cancel)
            .await
    }

    #[instrument(skip(self))]
    async fn retry_job(&self, id: i64, user_id: &str) -> StreetwiseResult<Job> {
        self.apply_transition(id, Some(user_id), JobTransition::Retry)
            .await
    }

    #[instrument(skip(self))]
    async fn claim_next_job(&self, job_types: Vec<JobType>) -> StreetwiseResult<Option<Job>> {
        let claimed = self.job_repository.claim_next(&job_types).await?;
        if let Some(job) = &claimed {
            counter!("streetwise_job_transitions_total", "action" => "claim").increment(1);
            info!(job_id = job.id, job_type = %job.job_type, "Worker 领取任务");
        }
        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn start_job(&self, id: i64, current_step: Option<String>) -> StreetwiseResult<Job> {
        self.apply_transition(id, None, JobTransition::Start { current_step })
            .await
    }

    #[instrument(skip(self))]
    async fn report_progress(
        &self,
        id: i64,
        progress: i32,
        current_step: Option<String>,
    ) -> StreetwiseResult<Job> {
        let progress = progress.clamp(0, 100);
        match self
            .job_repository
            .update_progress(id, progress, current_step.as_deref())
            .await?
        {
            Some(job) => Ok(job),
            None => {
                let job = self.get_job(id).await?;
                Err(StreetwiseError::invalid_state(
                    id,
                    job.status.as_str(),
                    "progress",
                ))
            }
        }
    }

    #[instrument(skip(self, result))]
    async fn complete_job(&self, id: i64, result: Value) -> StreetwiseResult<Job> {
        self.apply_transition(id, None, JobTransition::Complete { result })
            .await
    }

    #[instrument(skip(self))]
    async fn fail_job(&self, id: i64, error: String) -> StreetwiseResult<Job> {
        if error.trim().is_empty() {
            return Err(StreetwiseError::validation_error("error: is required"));
        }
        self.apply_transition(id, None, JobTransition::Fail { error })
            .await
    }

    async fn expire_stale_jobs(&self) -> StreetwiseResult<usize> {
        let timeout_seconds = self.config.stale_job_timeout_seconds;
        let stale_before = Utc::now() - Duration::seconds(timeout_seconds as i64);
        let stale = self
            .job_repository
            .find_stale_running(stale_before, self.config.stale_batch_size)
            .await?;

        let mut expired = 0;
        for job in stale {
            let transition = JobTransition::Expire {
                error: format!(
                    "Job timed out after {timeout_seconds} seconds without a progress update"
                ),
                stale_before,
            };
            match self.apply_transition(job.id, None, transition).await {
                Ok(_) => {
                    expired += 1;
                    counter!("streetwise_stale_jobs_expired_total").increment(1);
                    warn!(job_id = job.id, "运行中任务超时，已标记为失败");
                }
                // 检测与更新之间任务已上报进度或结束
                Err(StreetwiseError::InvalidJobState { .. }) => {
                    debug!(job_id = job.id, "任务已不再超时，跳过");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(expired)
    }
}
