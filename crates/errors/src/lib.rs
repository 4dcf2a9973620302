use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreetwiseError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务未找到: {id}")]
    JobNotFound { id: i64 },
    #[error("通知未找到: {id}")]
    NotificationNotFound { id: i64 },
    #[error("无权访问{resource}: {id}")]
    AccessDenied { resource: &'static str, id: i64 },
    #[error("任务 {id} 当前状态为 {status}，无法执行 {action}")]
    InvalidJobState {
        id: i64,
        status: String,
        action: &'static str,
    },
    #[error("任务 {id} 重试次数已用尽: {retry_count}/{max_retries}")]
    RetryLimitExceeded {
        id: i64,
        retry_count: i32,
        max_retries: i32,
    },
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type StreetwiseResult<T> = Result<T, StreetwiseError>;

impl StreetwiseError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }
    pub fn notification_not_found(id: i64) -> Self {
        Self::NotificationNotFound { id }
    }
    pub fn job_access_denied(id: i64) -> Self {
        Self::AccessDenied { resource: "任务", id }
    }
    pub fn notification_access_denied(id: i64) -> Self {
        Self::AccessDenied {
            resource: "通知",
            id,
        }
    }
    pub fn invalid_state<S: Into<String>>(id: i64, status: S, action: &'static str) -> Self {
        Self::InvalidJobState {
            id,
            status: status.into(),
            action,
        }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StreetwiseError::JobNotFound { .. } | StreetwiseError::NotificationNotFound { .. }
        )
    }
    /// 客户端请求本身有误（状态冲突、参数错误），重复请求不会成功
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            StreetwiseError::JobNotFound { .. }
                | StreetwiseError::NotificationNotFound { .. }
                | StreetwiseError::AccessDenied { .. }
                | StreetwiseError::InvalidJobState { .. }
                | StreetwiseError::RetryLimitExceeded { .. }
                | StreetwiseError::ValidationError(_)
        )
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StreetwiseError::Database(_) | StreetwiseError::DatabaseOperation(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            StreetwiseError::JobNotFound { .. } => "Job not found",
            StreetwiseError::NotificationNotFound { .. } => "Notification not found",
            StreetwiseError::AccessDenied { .. } => {
                "You do not have permission to access this resource"
            }
            StreetwiseError::InvalidJobState { action, .. } => match *action {
                "cancel" => "Job cannot be cancelled in its current state",
                "retry" => "Only failed jobs can be retried",
                _ => "Job is not in a valid state for this operation",
            },
            StreetwiseError::RetryLimitExceeded { .. } => "Maximum retry attempts exceeded",
            StreetwiseError::ValidationError(_) => "Invalid request data",
            _ => "An unexpected error occurred",
        }
    }
}

impl From<serde_json::Error> for StreetwiseError {
    fn from(err: serde_json::Error) -> Self {
        StreetwiseError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for StreetwiseError {
    fn from(err: anyhow::Error) -> Self {
        StreetwiseError::Internal(err.to_string())
    }
}
