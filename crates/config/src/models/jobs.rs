use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 任务生命周期配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub default_max_retries: i32,
    pub default_priority: i32,
    /// 是否自动将长时间无进度的运行中任务标记为失败
    pub stale_detection_enabled: bool,
    pub stale_job_timeout_seconds: u64,
    pub stale_check_interval_seconds: u64,
    pub stale_batch_size: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            default_priority: 0,
            stale_detection_enabled: true,
            stale_job_timeout_seconds: 1800,
            stale_check_interval_seconds: 60,
            stale_batch_size: 100,
        }
    }
}

impl ConfigValidator for JobsConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(
            self.default_max_retries as i64,
            0,
            10,
            "jobs.default_max_retries",
        )?;
        ValidationUtils::validate_range(
            self.default_priority as i64,
            -100,
            100,
            "jobs.default_priority",
        )?;
        if self.stale_detection_enabled {
            ValidationUtils::validate_range(
                self.stale_job_timeout_seconds as i64,
                60,
                7 * 24 * 3600,
                "jobs.stale_job_timeout_seconds",
            )?;
            ValidationUtils::validate_timeout_seconds(self.stale_check_interval_seconds)?;
            ValidationUtils::validate_count(self.stale_batch_size as usize, "jobs.stale_batch_size")?;
        }
        Ok(())
    }
}

/// 自动消失通知最长保留一年
pub const MAX_AUTO_DISMISS_SECONDS: i64 = 365 * 24 * 3600;

/// 通知配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// 任务进入终态时是否生成通知
    pub job_notifications_enabled: bool,
    pub default_page_size: i64,
    pub max_page_size: i64,
    /// 自动消失通知的存活时间，0 表示交由客户端决定
    pub auto_dismiss_seconds: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            job_notifications_enabled: true,
            default_page_size: 20,
            max_page_size: 50,
            auto_dismiss_seconds: 24 * 3600,
        }
    }
}

impl ConfigValidator for NotificationsConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_range(self.max_page_size, 1, 50, "notifications.max_page_size")?;
        ValidationUtils::validate_range(
            self.default_page_size,
            1,
            self.max_page_size,
            "notifications.default_page_size",
        )?;
        ValidationUtils::validate_range(
            i64::try_from(self.auto_dismiss_seconds).unwrap_or(i64::MAX),
            0,
            MAX_AUTO_DISMISS_SECONDS,
            "notifications.auto_dismiss_seconds",
        )?;
        Ok(())
    }
}

/// 数据清理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    /// completed / cancelled 任务保留天数
    pub finished_job_retention_days: i64,
    pub failed_job_retention_days: i64,
    pub read_notification_retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 3600,
            finished_job_retention_days: 30,
            failed_job_retention_days: 90,
            read_notification_retention_days: 30,
        }
    }
}

impl ConfigValidator for CleanupConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.enabled {
            ValidationUtils::validate_timeout_seconds(self.interval_seconds)?;
            for (days, field) in [
                (self.finished_job_retention_days, "cleanup.finished_job_retention_days"),
                (self.failed_job_retention_days, "cleanup.failed_job_retention_days"),
                (
                    self.read_notification_retention_days,
                    "cleanup.read_notification_retention_days",
                ),
            ] {
                ValidationUtils::validate_range(days, 1, 3650, field)?;
            }
        }
        Ok(())
    }
}
