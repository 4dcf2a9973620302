//! 任务仓储实现，SQLite 与 PostgreSQL 共用同一份 SQL
//!
//! 后端之间唯一的差别是领取任务时的行锁子句。

/// 为指定的连接池类型生成任务仓储
///
/// `insert_notification` 必须是同一后端上可在事务中执行的通知插入函数，
/// 状态迁移与通知写入在同一事务内提交。
macro_rules! impl_job_repository {
    (
        $name:ident,
        pool = $pool:ty,
        database = $db:ty,
        insert_notification = $insert_notification:path,
        claim_lock = $claim_lock:expr $(,)?
    ) => {
        pub struct $name {
            pool: $pool,
        }

        impl $name {
            pub fn new(pool: $pool) -> Self {
                Self { pool }
            }
        }

        #[::async_trait::async_trait]
        impl ::streetwise_domain::repositories::JobRepository for $name {
            #[::tracing::instrument(skip(self, job), fields(
                user_id = %job.user_id,
                job_type = %job.job_type,
                priority = job.priority,
            ))]
            async fn create(
                &self,
                job: &::streetwise_domain::entities::NewJob,
            ) -> ::streetwise_errors::StreetwiseResult<::streetwise_domain::entities::Job> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
                use ::streetwise_domain::entities::{Job, JobStatus};

                let context =
                    $crate::job_context!(RepositoryOperation::Create, user_id = job.user_id.clone())
                        .with_job_type(job.job_type.as_str());
                let now = ::chrono::Utc::now();

                let sql = format!(
                    "INSERT INTO background_jobs (user_id, job_type, status, priority, progress, \
                     input, metadata, retry_count, max_retries, created_at, updated_at) \
                     VALUES ($1, $2, $3, $4, 0, $5, $6, 0, $7, $8, $8) \
                     RETURNING {}",
                    $crate::database::query_builder::JOB_COLUMNS
                );
                let created: Job = ::sqlx::query_as(&sql)
                    .bind(&job.user_id)
                    .bind(job.job_type)
                    .bind(JobStatus::Queued)
                    .bind(job.priority)
                    .bind(&job.input)
                    .bind(&job.metadata)
                    .bind(job.max_retries)
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context.clone(), e))?;

                RepositoryErrorHelpers::log_operation_success_job(
                    context,
                    &created.entity_description(),
                    Some(&format!("优先级: {}", created.priority)),
                );
                Ok(created)
            }

            #[::tracing::instrument(skip(self))]
            async fn get_by_id(
                &self,
                id: i64,
            ) -> ::streetwise_errors::StreetwiseResult<Option<::streetwise_domain::entities::Job>>
            {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::job_context!(RepositoryOperation::Read, job_id = id);
                let sql = format!(
                    "SELECT {} FROM background_jobs WHERE id = $1",
                    $crate::database::query_builder::JOB_COLUMNS
                );
                ::sqlx::query_as::<_, ::streetwise_domain::entities::Job>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn list(
                &self,
                filter: &::streetwise_domain::entities::JobFilter,
            ) -> ::streetwise_errors::StreetwiseResult<Vec<::streetwise_domain::entities::Job>> {
                use $crate::database::query_builder::{into_arguments, JobQueryBuilder};
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let mut context = $crate::job_context!(RepositoryOperation::Query);
                if let Some(user_id) = &filter.user_id {
                    context = context.with_user_id(user_id.clone());
                }
                let (sql, params) = JobQueryBuilder::build_list_query(filter);
                let args = into_arguments::<$db>(params).map_err(|e| {
                    RepositoryErrorHelpers::query_argument_error(context.clone(), e)
                })?;

                ::sqlx::query_as_with::<_, ::streetwise_domain::entities::Job, _>(&sql, args)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn count(
                &self,
                filter: &::streetwise_domain::entities::JobFilter,
            ) -> ::streetwise_errors::StreetwiseResult<i64> {
                use $crate::database::query_builder::{into_arguments, JobQueryBuilder};
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::job_context!(RepositoryOperation::Count);
                let (sql, params) = JobQueryBuilder::build_count_query(filter);
                let args = into_arguments::<$db>(params).map_err(|e| {
                    RepositoryErrorHelpers::query_argument_error(context.clone(), e)
                })?;

                ::sqlx::query_scalar_with::<_, i64, _>(&sql, args)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))
            }

            #[::tracing::instrument(
                skip(self, transition, notifier),
                fields(action = transition.action())
            )]
            async fn transition(
                &self,
                id: i64,
                owner: Option<&str>,
                transition: &::streetwise_domain::transitions::JobTransition,
                notifier: &dyn ::streetwise_domain::notifications::JobEventNotifier,
            ) -> ::streetwise_errors::StreetwiseResult<
                Option<::streetwise_domain::repositories::TransitionOutcome>,
            > {
                use $crate::database::query_builder::{into_arguments, JobQueryBuilder};
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
                use ::streetwise_domain::repositories::TransitionOutcome;

                let mut context = $crate::job_context!(RepositoryOperation::Transition, job_id = id)
                    .with_status(transition.target())
                    .with_additional_info(transition.action());
                if let Some(owner) = owner {
                    context = context.with_user_id(owner);
                }

                let (sql, params) =
                    JobQueryBuilder::build_transition_query(id, owner, transition, ::chrono::Utc::now());
                let args = into_arguments::<$db>(params).map_err(|e| {
                    RepositoryErrorHelpers::query_argument_error(context.clone(), e)
                })?;

                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context.clone(), e))?;

                let job = ::sqlx::query_as_with::<_, ::streetwise_domain::entities::Job, _>(&sql, args)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context.clone(), e))?;

                let Some(job) = job else {
                    ::tracing::debug!("任务 {} 不满足 {} 的迁移条件", id, transition.action());
                    return Ok(None);
                };

                let notification = match notifier.compose(&job) {
                    Some(new_notification) => Some(
                        $insert_notification(&mut *tx, &new_notification, ::chrono::Utc::now())
                            .await
                            .map_err(|e| {
                                RepositoryErrorHelpers::job_database_error(context.clone(), e)
                            })?,
                    ),
                    None => None,
                };

                tx.commit()
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context.clone(), e))?;

                RepositoryErrorHelpers::log_operation_success_job(
                    context,
                    &job.entity_description(),
                    Some(&format!("新状态: {}", job.status)),
                );
                Ok(Some(TransitionOutcome { job, notification }))
            }

            #[::tracing::instrument(skip(self))]
            async fn update_progress(
                &self,
                id: i64,
                progress: i32,
                current_step: Option<&str>,
            ) -> ::streetwise_errors::StreetwiseResult<Option<::streetwise_domain::entities::Job>>
            {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
                use ::streetwise_domain::entities::{Job, JobStatus};

                let context = $crate::job_context!(RepositoryOperation::Update, job_id = id);
                let sql = format!(
                    "UPDATE background_jobs \
                     SET progress = CASE WHEN progress > $2 THEN progress ELSE $2 END, \
                         current_step = COALESCE($3, current_step), updated_at = $4 \
                     WHERE id = $1 AND status = $5 \
                     RETURNING {}",
                    $crate::database::query_builder::JOB_COLUMNS
                );
                ::sqlx::query_as::<_, Job>(&sql)
                    .bind(id)
                    .bind(progress)
                    .bind(current_step)
                    .bind(::chrono::Utc::now())
                    .bind(JobStatus::Running)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn claim_next(
                &self,
                job_types: &[::streetwise_domain::entities::JobType],
            ) -> ::streetwise_errors::StreetwiseResult<Option<::streetwise_domain::entities::Job>>
            {
                use $crate::database::query_builder::{into_arguments, JobQueryBuilder};
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
                use ::streetwise_domain::entities::{Job, JobStatus};

                let context = $crate::job_context!(RepositoryOperation::Transition)
                    .with_status(JobStatus::Running)
                    .with_additional_info("claim");
                let (sql, params) =
                    JobQueryBuilder::build_claim_query(job_types, ::chrono::Utc::now(), $claim_lock);
                let args = into_arguments::<$db>(params).map_err(|e| {
                    RepositoryErrorHelpers::query_argument_error(context.clone(), e)
                })?;

                let claimed = ::sqlx::query_as_with::<_, Job, _>(&sql, args)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))?;

                if let Some(job) = &claimed {
                    ::tracing::debug!("领取任务成功: {}", job.entity_description());
                }
                Ok(claimed)
            }

            #[::tracing::instrument(skip(self))]
            async fn find_stale_running(
                &self,
                updated_before: ::chrono::DateTime<::chrono::Utc>,
                limit: i64,
            ) -> ::streetwise_errors::StreetwiseResult<Vec<::streetwise_domain::entities::Job>> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};
                use ::streetwise_domain::entities::{Job, JobStatus};

                let context =
                    $crate::job_context!(RepositoryOperation::Query).with_status(JobStatus::Running);
                let sql = format!(
                    "SELECT {} FROM background_jobs \
                     WHERE status = $1 AND updated_at < $2 \
                     ORDER BY updated_at ASC LIMIT $3",
                    $crate::database::query_builder::JOB_COLUMNS
                );
                ::sqlx::query_as::<_, Job>(&sql)
                    .bind(JobStatus::Running)
                    .bind(updated_before)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn delete_finished_before(
                &self,
                statuses: &[::streetwise_domain::entities::JobStatus],
                before: ::chrono::DateTime<::chrono::Utc>,
            ) -> ::streetwise_errors::StreetwiseResult<u64> {
                use $crate::database::query_builder::{into_arguments, JobQueryBuilder};
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                if statuses.is_empty() {
                    return Ok(0);
                }
                let context = $crate::job_context!(RepositoryOperation::Cleanup);
                let (sql, params) = JobQueryBuilder::build_delete_finished_query(statuses, before);
                let args = into_arguments::<$db>(params).map_err(|e| {
                    RepositoryErrorHelpers::query_argument_error(context.clone(), e)
                })?;

                let result = ::sqlx::query_with(&sql, args)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::job_database_error(context, e))?;
                Ok(result.rows_affected())
            }
        }
    };
}

pub(crate) use impl_job_repository;
