use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Map, Value};
use streetwise_errors::StreetwiseError;
use tracing::{error, warn};

use crate::auth::AuthError;

const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("业务错误: {0}")]
    Streetwise(#[from] StreetwiseError),

    #[error("验证错误: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("请求体错误: {0}")]
    Json(#[from] JsonRejection),

    #[error("查询参数错误: {0}")]
    Query(#[from] QueryRejection),

    #[error("路径参数错误: {0}")]
    Path(#[from] PathRejection),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("认证错误: {0}")]
    Authentication(#[from] AuthError),

    #[error("未找到资源")]
    NotFound,

    #[error("不支持的请求方法")]
    MethodNotAllowed,

    #[error("请求处理超时")]
    Timeout,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    /// (状态码, 错误类型, 对外消息, 详情)
    fn parts(&self) -> (StatusCode, &'static str, String, Option<Value>) {
        match self {
            ApiError::Streetwise(err) => streetwise_parts(err),
            ApiError::Validation(errors) => {
                let mut details = Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| match &e.message {
                            Some(message) => message.to_string(),
                            None => e.code.to_string(),
                        })
                        .collect();
                    details.insert(field.to_string(), json!(messages.join(", ")));
                }
                (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "Invalid request data".to_string(),
                    Some(Value::Object(details)),
                )
            }
            ApiError::Json(rejection) => (
                StatusCode::BAD_REQUEST,
                "INVALID_BODY",
                rejection.body_text(),
                None,
            ),
            ApiError::Query(rejection) => (
                StatusCode::BAD_REQUEST,
                "INVALID_QUERY",
                rejection.body_text(),
                None,
            ),
            ApiError::Path(rejection) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PATH",
                rejection.body_text(),
                None,
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), None),
            ApiError::Authentication(AuthError::InsufficientPermissions) => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "You do not have permission to perform this action".to_string(),
                None,
            ),
            ApiError::Authentication(auth_error) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                auth_error.to_string(),
                None,
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "The requested resource does not exist".to_string(),
                None,
            ),
            ApiError::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                "METHOD_NOT_ALLOWED",
                "The requested method is not supported for this resource".to_string(),
                None,
            ),
            ApiError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "REQUEST_TIMEOUT",
                "The request took too long to process".to_string(),
                None,
            ),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                INTERNAL_ERROR_MESSAGE.to_string(),
                None,
            ),
        }
    }
}

fn streetwise_parts(err: &StreetwiseError) -> (StatusCode, &'static str, String, Option<Value>) {
    let message = err.user_message().to_string();
    match err {
        StreetwiseError::JobNotFound { .. } => {
            (StatusCode::NOT_FOUND, "JOB_NOT_FOUND", message, None)
        }
        StreetwiseError::NotificationNotFound { .. } => {
            (StatusCode::NOT_FOUND, "NOTIFICATION_NOT_FOUND", message, None)
        }
        StreetwiseError::AccessDenied { .. } => (StatusCode::FORBIDDEN, "FORBIDDEN", message, None),
        StreetwiseError::InvalidJobState { status, .. } => (
            StatusCode::BAD_REQUEST,
            "INVALID_STATE",
            message,
            Some(json!({ "status": status })),
        ),
        StreetwiseError::RetryLimitExceeded {
            retry_count,
            max_retries,
            ..
        } => (
            StatusCode::BAD_REQUEST,
            "RETRY_LIMIT_EXCEEDED",
            message,
            Some(json!({ "retryCount": retry_count, "maxRetries": max_retries })),
        ),
        StreetwiseError::ValidationError(detail) => {
            // 领域校验消息格式为 "field: reason"
            let mut details = Map::new();
            match detail.split_once(": ") {
                Some((field, reason)) => details.insert(field.to_string(), json!(reason)),
                None => details.insert("request".to_string(), json!(detail)),
            };
            (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                message,
                Some(Value::Object(details)),
            )
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            INTERNAL_ERROR_MESSAGE.to_string(),
            None,
        ),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message, details) = self.parts();

        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        } else {
            warn!(status = status.as_u16(), error_type, "请求被拒绝: {}", self);
        }

        let mut error_body = json!({
            "message": message,
            "type": error_type,
            "code": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = details {
            error_body["details"] = details;
        }

        let body = Json(json!({
            "success": false,
            "error": error_body,
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
