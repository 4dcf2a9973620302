use axum::{
    body::Bytes,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use streetwise_application::NotificationListQuery;
use streetwise_domain::entities::{NewNotification, Notification};

use crate::{
    auth::{AuthenticatedUser, Permission},
    error::{ApiError, ApiResult},
    response::{created, success, Pagination},
    routes::AppState,
};

pub const MARK_ALL_READ_ACTION: &str = "mark-all-read";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQueryParams {
    #[serde(default)]
    pub unread_only: bool,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationActionParams {
    pub action: Option<String>,
}

/// 通知创建请求，缺失的必填字段按空串处理并由校验报告字段名
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationBody {
    #[serde(rename = "type", default)]
    #[validate(length(min = 1, max = 64, message = "type is required"))]
    pub notification_type: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "title is required"))]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, max = 2000, message = "message is required"))]
    pub message: String,
    pub job_id: Option<i64>,
    #[serde(default)]
    pub auto_dismiss: bool,
    #[validate(length(max = 2048))]
    pub action_url: Option<String>,
    #[validate(length(max = 100))]
    pub action_text: Option<String>,
}

impl CreateNotificationBody {
    fn into_new_notification(self, user_id: &str) -> NewNotification {
        let mut notification =
            NewNotification::new(user_id, self.notification_type, self.title, self.message);
        notification.job_id = self.job_id;
        notification.auto_dismiss = self.auto_dismiss;
        notification.action_url = self.action_url;
        notification.action_text = self.action_text;
        notification
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNotificationBody {
    pub is_read: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: i64,
    pub pagination: Pagination,
}

/// 获取通知列表
pub async fn list_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    params: Result<Query<NotificationQueryParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::NotificationRead)?;
    let Query(params) = params?;

    let page = state
        .notification_service
        .list_notifications(
            &user.user_id,
            NotificationListQuery {
                unread_only: params.unread_only,
                limit: params.limit,
                offset: params.offset,
            },
        )
        .await?;

    let pagination = Pagination::new(
        page.limit,
        page.offset,
        page.total,
        page.notifications.len(),
    );
    Ok(success(NotificationListResponse {
        notifications: page.notifications,
        unread_count: page.unread_count,
        pagination,
    }))
}

/// 创建通知，或在 `?action=mark-all-read` 时将全部通知标记为已读
pub async fn post_notifications(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    params: Result<Query<NotificationActionParams>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Response> {
    user.require_permission(Permission::NotificationWrite)?;
    let Query(params) = params?;

    match params.action.as_deref() {
        Some(MARK_ALL_READ_ACTION) => {
            let updated = state
                .notification_service
                .mark_all_read(&user.user_id)
                .await?;
            Ok(success(json!({ "updated": updated })).into_response())
        }
        Some(other) => Err(ApiError::bad_request(format!("Unknown action: {other}"))),
        None => {
            let payload: CreateNotificationBody = serde_json::from_slice(&body)
                .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {e}")))?;
            payload.validate()?;

            let notification = state
                .notification_service
                .create_notification(payload.into_new_notification(&user.user_id))
                .await?;
            Ok(created(notification).into_response())
        }
    }
}

/// 标记通知已读/未读
pub async fn update_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<UpdateNotificationBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::NotificationWrite)?;
    let Path(id) = id?;
    let Json(body) = payload?;

    let notification = state
        .notification_service
        .mark_read(id, &user.user_id, body.is_read)
        .await?;
    Ok(success(notification))
}

/// 删除通知
pub async fn delete_notification(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    user.require_permission(Permission::NotificationWrite)?;
    let Path(id) = id?;

    state
        .notification_service
        .delete_notification(id, &user.user_id)
        .await?;
    Ok(success(json!({ "id": id, "deleted": true })))
}
