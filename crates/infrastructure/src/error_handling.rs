//! Enhanced error handling for repository operations with rich context
//!
//! Every repository call builds an operation context (job or notification) so that
//! database failures are logged and reported with the entity they concern.

use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::Error as SqlxError;
use std::fmt;
use streetwise_domain::entities::JobStatus;
use streetwise_errors::StreetwiseError;
use tracing::{debug, error, info, instrument};

/// Operation context for repository operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOperation {
    Create,
    Read,
    Query,
    Count,
    Update,
    Transition,
    Delete,
    Cleanup,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Create => write!(f, "创建"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Query => write!(f, "查询"),
            RepositoryOperation::Count => write!(f, "统计"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Transition => write!(f, "迁移状态"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Cleanup => write!(f, "清理"),
        }
    }
}

/// Context information for job repository operations
#[derive(Debug, Clone)]
pub struct JobOperationContext {
    pub operation: RepositoryOperation,
    pub job_id: Option<i64>,
    pub user_id: Option<String>,
    pub job_type: Option<String>,
    pub status: Option<JobStatus>,
    pub timestamp: DateTime<Utc>,
    pub additional_info: Option<String>,
}

impl JobOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            job_id: None,
            user_id: None,
            job_type: None,
            status: None,
            timestamp: Utc::now(),
            additional_info: None,
        }
    }

    pub fn with_job_id(mut self, job_id: i64) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_job_type<S: Into<String>>(mut self, job_type: S) -> Self {
        self.job_type = Some(job_type.into());
        self
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_additional_info<S: Into<String>>(mut self, info: S) -> Self {
        self.additional_info = Some(info.into());
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.job_id, &self.job_type) {
            (Some(id), Some(job_type)) => format!("任务 '{}' (ID: {})", job_type, id),
            (Some(id), None) => format!("任务 (ID: {})", id),
            (None, Some(job_type)) => format!("任务 '{}'", job_type),
            (None, None) => "任务".to_string(),
        }
    }
}

/// Context information for notification repository operations
#[derive(Debug, Clone)]
pub struct NotificationOperationContext {
    pub operation: RepositoryOperation,
    pub notification_id: Option<i64>,
    pub user_id: Option<String>,
    pub job_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationOperationContext {
    pub fn new(operation: RepositoryOperation) -> Self {
        Self {
            operation,
            notification_id: None,
            user_id: None,
            job_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_notification_id(mut self, id: i64) -> Self {
        self.notification_id = Some(id);
        self
    }

    pub fn with_user_id<S: Into<String>>(mut self, user_id: S) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_job_id(mut self, job_id: Option<i64>) -> Self {
        self.job_id = job_id;
        self
    }

    pub fn entity_description(&self) -> String {
        match (&self.notification_id, &self.user_id) {
            (Some(id), Some(user)) => format!("通知 (ID: {}, 用户: {})", id, user),
            (Some(id), None) => format!("通知 (ID: {})", id),
            (None, Some(user)) => format!("用户 {} 的通知", user),
            (None, None) => "通知".to_string(),
        }
    }
}

/// Enhanced error helpers for repository operations
pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    fn describe(operation_desc: &str, entity_desc: &str, error: &SqlxError) -> String {
        match error {
            SqlxError::Database(db_error) => match db_error.kind() {
                ErrorKind::ForeignKeyViolation => format!(
                    "{}{}时发生外键约束冲突: {}",
                    operation_desc,
                    entity_desc,
                    db_error.constraint().unwrap_or("关联记录不存在")
                ),
                ErrorKind::CheckViolation => format!(
                    "{}{}时发生检查约束冲突: {}",
                    operation_desc,
                    entity_desc,
                    db_error.constraint().unwrap_or("数据不满足约束")
                ),
                ErrorKind::UniqueViolation => format!(
                    "{}{}时发生唯一约束冲突: {}",
                    operation_desc,
                    entity_desc,
                    db_error.constraint().unwrap_or("记录已存在")
                ),
                _ => format!("{}{}时发生数据库错误: {}", operation_desc, entity_desc, db_error),
            },
            SqlxError::PoolClosed => {
                format!("{}{}时数据库连接池已关闭", operation_desc, entity_desc)
            }
            SqlxError::PoolTimedOut => {
                format!("{}{}时数据库连接池超时", operation_desc, entity_desc)
            }
            SqlxError::Io(io_error) => {
                format!("{}{}时发生I/O错误: {}", operation_desc, entity_desc, io_error)
            }
            SqlxError::ColumnDecode { index, source } => format!(
                "{}{}时字段 {} 解码失败: {}",
                operation_desc, entity_desc, index, source
            ),
            _ => format!(
                "{}{}时发生未知数据库错误: {}",
                operation_desc, entity_desc, error
            ),
        }
    }

    /// Create a database error with job context
    #[instrument(skip_all, fields(
        operation = %context.operation,
        job_id = ?context.job_id,
        user_id = ?context.user_id,
        job_type = ?context.job_type,
        status = ?context.status,
        timestamp = %context.timestamp,
    ))]
    pub fn job_database_error(context: JobOperationContext, error: SqlxError) -> StreetwiseError {
        let error_msg = Self::describe(
            &context.operation.to_string(),
            &context.entity_description(),
            &error,
        );
        error!(error = %error, "{}", error_msg);
        StreetwiseError::database_error(error_msg)
    }

    /// Create a database error with notification context
    #[instrument(skip_all, fields(
        operation = %context.operation,
        notification_id = ?context.notification_id,
        user_id = ?context.user_id,
        job_id = ?context.job_id,
        timestamp = %context.timestamp,
    ))]
    pub fn notification_database_error(
        context: NotificationOperationContext,
        error: SqlxError,
    ) -> StreetwiseError {
        let error_msg = Self::describe(
            &context.operation.to_string(),
            &context.entity_description(),
            &error,
        );
        error!(error = %error, "{}", error_msg);
        StreetwiseError::database_error(error_msg)
    }

    /// Wrap a failure while building dynamic query arguments
    pub fn query_argument_error(
        context: JobOperationContext,
        error: impl fmt::Display,
    ) -> StreetwiseError {
        let error_msg = format!(
            "{}{}时构建查询参数失败: {}",
            context.operation,
            context.entity_description(),
            error
        );
        error!("{}", error_msg);
        StreetwiseError::Internal(error_msg)
    }

    /// Log successful repository operation for job operations
    #[instrument(skip_all, fields(
        operation = %context.operation,
        entity_desc = %entity_desc,
        timestamp = %context.timestamp,
    ))]
    pub fn log_operation_success_job(
        context: JobOperationContext,
        entity_desc: &str,
        additional_info: Option<&str>,
    ) {
        let base_msg = format!("{}{}成功", context.operation, entity_desc);

        if let Some(info) = additional_info {
            info!("{}: {}", base_msg, info);
        } else {
            info!("{}", base_msg);
        }
    }

    /// Log successful repository operation for notification operations
    pub fn log_operation_success_notification(
        context: NotificationOperationContext,
        additional_info: Option<&str>,
    ) {
        let base_msg = format!("{}{}成功", context.operation, context.entity_description());

        if let Some(info) = additional_info {
            debug!("{}: {}", base_msg, info);
        } else {
            debug!("{}", base_msg);
        }
    }
}

/// Macro for creating job operation context easily
#[macro_export]
macro_rules! job_context {
    ($operation:expr) => {
        $crate::error_handling::JobOperationContext::new($operation)
    };
    ($operation:expr, job_id = $job_id:expr) => {
        $crate::error_handling::JobOperationContext::new($operation).with_job_id($job_id)
    };
    ($operation:expr, user_id = $user_id:expr) => {
        $crate::error_handling::JobOperationContext::new($operation).with_user_id($user_id)
    };
    ($operation:expr, job_id = $job_id:expr, user_id = $user_id:expr) => {
        $crate::error_handling::JobOperationContext::new($operation)
            .with_job_id($job_id)
            .with_user_id($user_id)
    };
}

/// Macro for creating notification operation context easily
#[macro_export]
macro_rules! notification_context {
    ($operation:expr) => {
        $crate::error_handling::NotificationOperationContext::new($operation)
    };
    ($operation:expr, user_id = $user_id:expr) => {
        $crate::error_handling::NotificationOperationContext::new($operation).with_user_id($user_id)
    };
    ($operation:expr, id = $id:expr, user_id = $user_id:expr) => {
        $crate::error_handling::NotificationOperationContext::new($operation)
            .with_notification_id($id)
            .with_user_id($user_id)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display() {
        assert_eq!(RepositoryOperation::Create.to_string(), "创建");
        assert_eq!(RepositoryOperation::Transition.to_string(), "迁移状态");
        assert_eq!(RepositoryOperation::Cleanup.to_string(), "清理");
    }

    #[test]
    fn test_job_context_description() {
        let context = job_context!(RepositoryOperation::Read, job_id = 5);
        assert_eq!(context.entity_description(), "任务 (ID: 5)");

        let context = context.with_job_type("website_crawl");
        assert_eq!(context.entity_description(), "任务 'website_crawl' (ID: 5)");

        let context = job_context!(RepositoryOperation::Query, user_id = "user-a");
        assert_eq!(context.user_id.as_deref(), Some("user-a"));
        assert_eq!(context.entity_description(), "任务");
    }

    #[test]
    fn test_notification_context_description() {
        let context = notification_context!(RepositoryOperation::Delete, id = 3, user_id = "u1");
        assert_eq!(context.entity_description(), "通知 (ID: 3, 用户: u1)");

        let context = notification_context!(RepositoryOperation::Update, user_id = "u1");
        assert_eq!(context.entity_description(), "用户 u1 的通知");
    }

    #[test]
    fn test_pool_errors_are_described() {
        let context = job_context!(RepositoryOperation::Create);
        let err = RepositoryErrorHelpers::job_database_error(context, SqlxError::PoolTimedOut);
        match err {
            StreetwiseError::DatabaseOperation(msg) => {
                assert_eq!(msg, "创建任务时数据库连接池超时");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let context = notification_context!(RepositoryOperation::Read);
        let err =
            RepositoryErrorHelpers::notification_database_error(context, SqlxError::PoolClosed);
        assert!(matches!(err, StreetwiseError::DatabaseOperation(msg) if msg.contains("已关闭")));
    }
}
