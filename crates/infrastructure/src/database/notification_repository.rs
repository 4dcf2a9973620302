//! 通知仓储实现，SQLite 与 PostgreSQL 共用同一份 SQL

/// 为指定的连接池类型生成通知仓储及其事务内插入函数
///
/// 两种后端的 SQL 均使用 `$N` 占位符，因此实现完全一致。
macro_rules! impl_notification_repository {
    ($name:ident, $pool:ty, $db:ty) => {
        /// 插入通知，既可在连接池上执行，也可在事务中执行
        pub(crate) async fn insert_notification<'e, E>(
            executor: E,
            notification: &::streetwise_domain::entities::NewNotification,
            now: ::chrono::DateTime<::chrono::Utc>,
        ) -> Result<::streetwise_domain::entities::Notification, ::sqlx::Error>
        where
            E: ::sqlx::Executor<'e, Database = $db>,
        {
            let sql = format!(
                "INSERT INTO job_notifications (user_id, job_id, notification_type, title, \
                 message, is_read, auto_dismiss, action_url, action_text, created_at, dismiss_at) \
                 VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7, $8, $9, $10) \
                 RETURNING {}",
                $crate::database::query_builder::NOTIFICATION_COLUMNS
            );
            ::sqlx::query_as::<_, ::streetwise_domain::entities::Notification>(&sql)
                .bind(&notification.user_id)
                .bind(notification.job_id)
                .bind(&notification.notification_type)
                .bind(&notification.title)
                .bind(&notification.message)
                .bind(notification.auto_dismiss)
                .bind(&notification.action_url)
                .bind(&notification.action_text)
                .bind(now)
                .bind(notification.dismiss_at)
                .fetch_one(executor)
                .await
        }

        pub struct $name {
            pool: $pool,
        }

        impl $name {
            pub fn new(pool: $pool) -> Self {
                Self { pool }
            }
        }

        #[::async_trait::async_trait]
        impl ::streetwise_domain::repositories::NotificationRepository for $name {
            #[::tracing::instrument(skip(self, notification), fields(
                user_id = %notification.user_id,
                notification_type = %notification.notification_type,
            ))]
            async fn create(
                &self,
                notification: &::streetwise_domain::entities::NewNotification,
            ) -> ::streetwise_errors::StreetwiseResult<::streetwise_domain::entities::Notification>
            {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(
                    RepositoryOperation::Create,
                    user_id = notification.user_id.clone()
                )
                .with_job_id(notification.job_id);

                let created = insert_notification(&self.pool, notification, ::chrono::Utc::now())
                    .await
                    .map_err(|e| {
                        RepositoryErrorHelpers::notification_database_error(context.clone(), e)
                    })?;

                RepositoryErrorHelpers::log_operation_success_notification(
                    context.with_notification_id(created.id),
                    Some(&created.notification_type),
                );
                Ok(created)
            }

            #[::tracing::instrument(skip(self))]
            async fn get_by_id(
                &self,
                id: i64,
            ) -> ::streetwise_errors::StreetwiseResult<
                Option<::streetwise_domain::entities::Notification>,
            > {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(RepositoryOperation::Read)
                    .with_notification_id(id);
                let sql = format!(
                    "SELECT {} FROM job_notifications WHERE id = $1",
                    $crate::database::query_builder::NOTIFICATION_COLUMNS
                );
                ::sqlx::query_as::<_, ::streetwise_domain::entities::Notification>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn list(
                &self,
                filter: &::streetwise_domain::entities::NotificationFilter,
            ) -> ::streetwise_errors::StreetwiseResult<
                Vec<::streetwise_domain::entities::Notification>,
            > {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(
                    RepositoryOperation::Query,
                    user_id = filter.user_id.clone()
                );
                let sql = format!(
                    "SELECT {} FROM job_notifications \
                     WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
                     ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
                    $crate::database::query_builder::NOTIFICATION_COLUMNS
                );
                ::sqlx::query_as::<_, ::streetwise_domain::entities::Notification>(&sql)
                    .bind(&filter.user_id)
                    .bind(filter.unread_only)
                    .bind(filter.limit)
                    .bind(filter.offset)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn count(
                &self,
                filter: &::streetwise_domain::entities::NotificationFilter,
            ) -> ::streetwise_errors::StreetwiseResult<i64> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(
                    RepositoryOperation::Count,
                    user_id = filter.user_id.clone()
                );
                ::sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM job_notifications \
                     WHERE user_id = $1 AND ($2 = FALSE OR is_read = FALSE)",
                )
                .bind(&filter.user_id)
                .bind(filter.unread_only)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn count_unread(&self, user_id: &str) -> ::streetwise_errors::StreetwiseResult<i64> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context =
                    $crate::notification_context!(RepositoryOperation::Count, user_id = user_id);
                ::sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM job_notifications WHERE user_id = $1 AND is_read = FALSE",
                )
                .bind(user_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))
            }

            #[::tracing::instrument(skip(self))]
            async fn set_read(
                &self,
                id: i64,
                user_id: &str,
                is_read: bool,
            ) -> ::streetwise_errors::StreetwiseResult<
                Option<::streetwise_domain::entities::Notification>,
            > {
                use $crate::database::query_builder::NOTIFICATION_COLUMNS;
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(
                    RepositoryOperation::Update,
                    id = id,
                    user_id = user_id
                );
                let sql = if is_read {
                    format!(
                        "UPDATE job_notifications SET is_read = TRUE, \
                         read_at = COALESCE(read_at, $3) \
                         WHERE id = $1 AND user_id = $2 RETURNING {}",
                        NOTIFICATION_COLUMNS
                    )
                } else {
                    format!(
                        "UPDATE job_notifications SET is_read = FALSE, read_at = NULL \
                         WHERE id = $1 AND user_id = $2 RETURNING {}",
                        NOTIFICATION_COLUMNS
                    )
                };

                let mut query = ::sqlx::query_as::<_, ::streetwise_domain::entities::Notification>(
                    &sql,
                )
                .bind(id)
                .bind(user_id);
                if is_read {
                    query = query.bind(::chrono::Utc::now());
                }
                let updated = query.fetch_optional(&self.pool).await.map_err(|e| {
                    RepositoryErrorHelpers::notification_database_error(context.clone(), e)
                })?;

                if updated.is_some() {
                    RepositoryErrorHelpers::log_operation_success_notification(
                        context,
                        Some(if is_read { "已读" } else { "未读" }),
                    );
                }
                Ok(updated)
            }

            #[::tracing::instrument(skip(self))]
            async fn mark_all_read(&self, user_id: &str) -> ::streetwise_errors::StreetwiseResult<u64> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context =
                    $crate::notification_context!(RepositoryOperation::Update, user_id = user_id);
                let result = ::sqlx::query(
                    "UPDATE job_notifications SET is_read = TRUE, read_at = $2 \
                     WHERE user_id = $1 AND is_read = FALSE",
                )
                .bind(user_id)
                .bind(::chrono::Utc::now())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    RepositoryErrorHelpers::notification_database_error(context.clone(), e)
                })?;

                RepositoryErrorHelpers::log_operation_success_notification(
                    context,
                    Some(&format!("标记 {} 条为已读", result.rows_affected())),
                );
                Ok(result.rows_affected())
            }

            #[::tracing::instrument(skip(self))]
            async fn delete(&self, id: i64, user_id: &str) -> ::streetwise_errors::StreetwiseResult<bool> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(
                    RepositoryOperation::Delete,
                    id = id,
                    user_id = user_id
                );
                let result =
                    ::sqlx::query("DELETE FROM job_notifications WHERE id = $1 AND user_id = $2")
                        .bind(id)
                        .bind(user_id)
                        .execute(&self.pool)
                        .await
                        .map_err(|e| {
                            RepositoryErrorHelpers::notification_database_error(context, e)
                        })?;
                Ok(result.rows_affected() > 0)
            }

            #[::tracing::instrument(skip(self))]
            async fn delete_dismissed(
                &self,
                now: ::chrono::DateTime<::chrono::Utc>,
            ) -> ::streetwise_errors::StreetwiseResult<u64> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(RepositoryOperation::Cleanup);
                let result = ::sqlx::query(
                    "DELETE FROM job_notifications \
                     WHERE dismiss_at IS NOT NULL AND dismiss_at <= $1",
                )
                .bind(now)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))?;
                Ok(result.rows_affected())
            }

            #[::tracing::instrument(skip(self))]
            async fn delete_read_before(
                &self,
                before: ::chrono::DateTime<::chrono::Utc>,
            ) -> ::streetwise_errors::StreetwiseResult<u64> {
                use $crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

                let context = $crate::notification_context!(RepositoryOperation::Cleanup);
                let result = ::sqlx::query(
                    "DELETE FROM job_notifications \
                     WHERE is_read = TRUE AND read_at IS NOT NULL AND read_at < $1",
                )
                .bind(before)
                .execute(&self.pool)
                .await
                .map_err(|e| RepositoryErrorHelpers::notification_database_error(context, e))?;
                Ok(result.rows_affected())
            }
        }
    };
}

pub(crate) use impl_notification_repository;
