//! 外部 Worker 回调接口，需要 `JobExecute` 权限

use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use tracing::info;

use streetwise_domain::entities::JobType;

use crate::{
    auth::{AuthenticatedUser, Permission},
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimBody {
    #[serde(default)]
    pub job_types: Vec<JobType>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
    pub current_step: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressBody {
    pub progress: i32,
    pub current_step: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub result: Value,
}

#[derive(Debug, Deserialize)]
pub struct FailBody {
    pub error: String,
}

/// 空请求体按默认值处理
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))
}

/// 领取下一个排队任务，没有可执行任务时 data 为 null
pub async fn claim_job(
    State(state): State<AppState>,
    worker: AuthenticatedUser,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    worker.require_permission(Permission::JobExecute)?;
    let body: ClaimBody = optional_body(&body)?;

    let job = state.job_service.claim_next_job(body.job_types).await?;
    if let Some(job) = &job {
        info!(job_id = job.id, worker = %worker.user_id, "任务已被领取");
    }
    Ok(success(job))
}

pub async fn start_job(
    State(state): State<AppState>,
    worker: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    worker.require_permission(Permission::JobExecute)?;
    let Path(id) = id?;
    let body: StartBody = optional_body(&body)?;

    let job = state.job_service.start_job(id, body.current_step).await?;
    Ok(success(job))
}

pub async fn report_progress(
    State(state): State<AppState>,
    worker: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<ProgressBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    worker.require_permission(Permission::JobExecute)?;
    let Path(id) = id?;
    let Json(body) = payload?;

    let job = state
        .job_service
        .report_progress(id, body.progress, body.current_step)
        .await?;
    Ok(success(job))
}

pub async fn complete_job(
    State(state): State<AppState>,
    worker: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CompleteBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    worker.require_permission(Permission::JobExecute)?;
    let Path(id) = id?;
    let Json(body) = payload?;

    let job = state.job_service.complete_job(id, body.result).await?;
    Ok(success(job))
}

pub async fn fail_job(
    State(state): State<AppState>,
    worker: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<FailBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    worker.require_permission(Permission::JobExecute)?;
    let Path(id) = id?;
    let Json(body) = payload?;

    let job = state.job_service.fail_job(id, body.error).await?;
    Ok(success(job))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_body() {
        let empty: ClaimBody = optional_body(&Bytes::new()).unwrap();
        assert!(empty.job_types.is_empty());

        let body: ClaimBody =
            optional_body(&Bytes::from_static(br#"{"jobTypes":["website_crawl"]}"#)).unwrap();
        assert_eq!(body.job_types, vec![JobType::WebsiteCrawl]);

        assert!(optional_body::<StartBody>(&Bytes::from_static(b"{oops")).is_err());
    }
}
