use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use tracing::warn;

use crate::routes::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let (status, database) = match state.database.health_check().await {
        Ok(()) => (StatusCode::OK, "up"),
        Err(e) => {
            warn!("健康检查失败: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "down")
        }
    };

    (
        status,
        Json(json!({
            "status": if status.is_success() { "ok" } else { "degraded" },
            "database": database,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "service": "streetwise",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
