use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use streetwise_config::NotificationsConfig;
use streetwise_domain::{
    entities::{NewNotification, Notification, NotificationFilter, NotificationPage},
    notifications::JobNotificationTemplates,
    repositories::{JobRepository, NotificationRepository},
};
use streetwise_errors::{StreetwiseError, StreetwiseResult};

use crate::interfaces::{NotificationListQuery, NotificationService};

/// 根据配置生成任务终态通知模板
pub fn job_notification_templates(config: &NotificationsConfig) -> JobNotificationTemplates {
    if !config.job_notifications_enabled {
        return JobNotificationTemplates::disabled();
    }
    JobNotificationTemplates {
        enabled: true,
        auto_dismiss_after: auto_dismiss_after(config.auto_dismiss_seconds),
    }
}

/// 0 或超出时间范围的配置都视为不自动消失
fn auto_dismiss_after(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        return None;
    }
    i64::try_from(seconds).ok().and_then(Duration::try_seconds)
}

pub struct NotificationManager {
    notification_repository: Arc<dyn NotificationRepository>,
    job_repository: Arc<dyn JobRepository>,
    config: NotificationsConfig,
}

impl NotificationManager {
    pub fn new(
        notification_repository: Arc<dyn NotificationRepository>,
        job_repository: Arc<dyn JobRepository>,
        config: NotificationsConfig,
    ) -> Self {
        Self {
            notification_repository,
            job_repository,
            config,
        }
    }

    /// 更新语句未命中时区分不存在与不属于该用户
    async fn classify_miss(&self, id: i64, user_id: &str) -> StreetwiseError {
        match self.notification_repository.get_by_id(id).await {
            Ok(Some(notification)) if !notification.is_owned_by(user_id) => {
                warn!(notification_id = id, user_id, "拒绝访问其他用户的通知");
                StreetwiseError::notification_access_denied(id)
            }
            Ok(_) => StreetwiseError::notification_not_found(id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl NotificationService for NotificationManager {
    async fn list_notifications(
        &self,
        user_id: &str,
        query: NotificationListQuery,
    ) -> StreetwiseResult<NotificationPage> {
        let limit = query
            .limit
            .unwrap_or(self.config.default_page_size)
            .clamp(1, self.config.max_page_size);
        let offset = query.offset.unwrap_or(0).max(0);
        let filter = NotificationFilter::new(user_id, query.unread_only, limit, offset);

        let notifications = self.notification_repository.list(&filter).await?;
        let total = self.notification_repository.count(&filter).await?;
        let unread_count = self.notification_repository.count_unread(user_id).await?;

        debug!(
            user_id,
            returned = notifications.len(),
            total,
            unread_count,
            "查询通知列表"
        );
        Ok(NotificationPage {
            notifications,
            unread_count,
            total,
            limit,
            offset,
        })
    }

    #[instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn create_notification(
        &self,
        mut notification: NewNotification,
    ) -> StreetwiseResult<Notification> {
        notification.validate()?;

        if notification.auto_dismiss && notification.dismiss_at.is_none() {
            notification.dismiss_at = auto_dismiss_after(self.config.auto_dismiss_seconds)
                .and_then(|after| Utc::now().checked_add_signed(after));
        }

        if let Some(job_id) = notification.job_id {
            let job = self
                .job_repository
                .get_by_id(job_id)
                .await?
                .ok_or_else(|| StreetwiseError::job_not_found(job_id))?;
            if !job.is_owned_by(&notification.user_id) {
                return Err(StreetwiseError::job_access_denied(job_id));
            }
        }

        let created = self.notification_repository.create(&notification).await?;
        counter!(
            "streetwise_notifications_created_total",
            "type" => created.notification_type.clone()
        )
        .increment(1);
        info!(notification_id = created.id, "通知创建成功");
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn mark_read(
        &self,
        id: i64,
        user_id: &str,
        is_read: bool,
    ) -> StreetwiseResult<Notification> {
        match self
            .notification_repository
            .set_read(id, user_id, is_read)
            .await?
        {
            Some(notification) => Ok(notification),
            None => Err(self.classify_miss(id, user_id).await),
        }
    }

    #[instrument(skip(self))]
    async fn mark_all_read(&self, user_id: &str) -> StreetwiseResult<u64> {
        let updated = self.notification_repository.mark_all_read(user_id).await?;
        info!(updated, "全部通知已标记为已读");
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn delete_notification(&self, id: i64, user_id: &str) -> StreetwiseResult<()> {
        if self.notification_repository.delete(id, user_id).await? {
            Ok(())
        } else {
            Err(self.classify_miss(id, user_id).await)
        }
    }
}
