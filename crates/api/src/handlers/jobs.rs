use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use streetwise_application::{CreateJobRequest, JobListQuery};
use streetwise_domain::entities::{Job, JobStatus, JobType};
use streetwise_errors::StreetwiseError;

use crate::{
    auth::{AuthenticatedUser, Permission},
    error::ApiResult,
    response::{created, success, success_with_message, Pagination},
    routes::AppState,
};

/// 任务列表查询参数
#[derive(Debug, Deserialize)]
pub struct JobQueryParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// 任务创建请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobBody {
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub priority: Option<i32>,
    pub input: Option<Value>,
    pub metadata: Option<Value>,
    pub max_retries: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub pagination: Pagination,
}

/// 读取后的归属校验：他人的任务返回 403
pub fn ensure_owner(job: &Job, user: &AuthenticatedUser) -> Result<(), StreetwiseError> {
    if job.is_owned_by(&user.user_id) {
        Ok(())
    } else {
        Err(StreetwiseError::job_access_denied(job.id))
    }
}

/// 获取任务列表
pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    params: Result<Query<JobQueryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::JobRead)?;
    let Query(params) = params?;

    let query = JobListQuery {
        status: params
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()?,
        job_type: params
            .job_type
            .as_deref()
            .map(str::parse::<JobType>)
            .transpose()?,
        limit: params.limit,
        offset: params.offset,
    };

    let page = state.job_service.list_jobs(&user.user_id, query).await?;
    let pagination = Pagination::new(page.limit, page.offset, page.total, page.jobs.len());
    Ok(success(JobListResponse {
        jobs: page.jobs,
        pagination,
    }))
}

/// 创建任务
pub async fn create_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    payload: Result<Json<CreateJobBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::JobWrite)?;
    let Json(body) = payload?;

    let request = CreateJobRequest {
        job_type: body.job_type,
        priority: body.priority,
        input: body.input,
        metadata: body.metadata,
        max_retries: body.max_retries,
    };
    let job = state.job_service.create_job(&user.user_id, request).await?;
    Ok(created(job))
}

/// 获取单个任务
pub async fn get_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::JobRead)?;
    let Path(id) = id?;

    let job = state.job_service.get_job(id).await?;
    ensure_owner(&job, &user)?;
    Ok(success(job))
}

/// 取消任务
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::JobWrite)?;
    let Path(id) = id?;

    let job = state.job_service.cancel_job(id, &user.user_id).await?;
    Ok(success_with_message(job, "Job cancelled successfully"))
}

/// 重试失败的任务
pub async fn retry_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::JobWrite)?;
    let Path(id) = id?;

    let job = state.job_service.retry_job(id, &user.user_id).await?;
    Ok(success_with_message(job, "Job queued for retry"))
}
