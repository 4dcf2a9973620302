use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;

use streetwise_application::{JobService, NotificationService};
use streetwise_infrastructure::DatabaseManager;

use crate::auth::{auth_middleware, AuthState};
use crate::handlers::{
    health::health_check,
    jobs::{cancel_job, create_job, get_job, list_jobs, retry_job},
    method_not_allowed, not_found,
    notifications::{
        delete_notification, list_notifications, post_notifications, update_notification,
    },
    worker::{claim_job, complete_job, fail_job, report_progress, start_job},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub job_service: Arc<dyn JobService>,
    pub notification_service: Arc<dyn NotificationService>,
    pub database: DatabaseManager,
    pub auth: Arc<AuthState>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    let protected = Router::new()
        // 任务
        .route("/api/jobs", get(list_jobs).post(create_job))
        .route(
            "/api/jobs/notifications",
            get(list_notifications).post(post_notifications),
        )
        .route(
            "/api/jobs/notifications/{id}",
            patch(update_notification).delete(delete_notification),
        )
        .route(
            "/api/jobs/{id}",
            get(get_job).delete(cancel_job).post(retry_job),
        )
        .route("/api/jobs/{id}/retry", post(retry_job))
        // Worker 回调
        .route("/api/worker/jobs/claim", post(claim_job))
        .route("/api/worker/jobs/{id}/start", post(start_job))
        .route("/api/worker/jobs/{id}/progress", post(report_progress))
        .route("/api/worker/jobs/{id}/complete", post(complete_job))
        .route("/api/worker/jobs/{id}/fail", post(fail_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(not_found)
        .with_state(state)
}
