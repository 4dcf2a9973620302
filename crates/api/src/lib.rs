//! # StreetWise API
//!
//! 后台任务生命周期服务的 HTTP 接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! ### 任务
//! - `GET /api/jobs` - 当前用户的任务列表，支持 `status`、`type`、`limit`、`offset`
//! - `POST /api/jobs` - 创建任务
//! - `GET /api/jobs/{id}` - 任务详情
//! - `DELETE /api/jobs/{id}` - 取消任务
//! - `POST /api/jobs/{id}` 或 `POST /api/jobs/{id}/retry` - 重试失败的任务
//!
//! ### 通知
//! - `GET /api/jobs/notifications` - 通知列表，附带未读数
//! - `POST /api/jobs/notifications` - 创建通知
//! - `POST /api/jobs/notifications?action=mark-all-read` - 全部标记为已读
//! - `PATCH /api/jobs/notifications/{id}` - 标记已读/未读
//! - `DELETE /api/jobs/notifications/{id}` - 删除通知
//!
//! ### Worker
//! - `POST /api/worker/jobs/claim` 以及 `/api/worker/jobs/{id}/{start,progress,complete,fail}`
//!
//! 除 `/health` 外的所有接口都需要认证（Bearer JWT 或 `X-API-Key`）。
//! 成功响应统一为 `{ success: true, data, message?, timestamp }`，
//! 失败响应为 `{ success: false, error: { message, type, code, timestamp, details? } }`。

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::{extract::DefaultBodyLimit, Router};
use tower::ServiceBuilder;

use streetwise_config::ApiConfig;

use middleware::{cors_layer, request_logging, trace_layer, with_request_timeout};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, config: &ApiConfig) -> Router {
    let max_body_bytes = (config.max_request_size_mb as usize).saturating_mul(1024 * 1024);

    let mut app = with_request_timeout(
        create_routes(state).layer(DefaultBodyLimit::max(max_body_bytes)),
        Duration::from_secs(config.request_timeout_seconds),
    );

    if config.cors_enabled {
        app = app.layer(cors_layer(config));
    }

    app.layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
