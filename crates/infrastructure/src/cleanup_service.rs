use chrono::{Duration, Utc};
use metrics::counter;
use std::sync::Arc;
use streetwise_config::CleanupConfig;
use streetwise_domain::entities::JobStatus;
use streetwise_domain::repositories::{JobRepository, NotificationRepository};
use streetwise_errors::StreetwiseResult;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

const FINISHED_STATUSES: [JobStatus; 2] = [JobStatus::Completed, JobStatus::Cancelled];
const FAILED_STATUSES: [JobStatus; 1] = [JobStatus::Failed];

/// 数据清理服务
///
/// 定期删除过期的终态任务和通知，防止数据库无限增长
pub struct CleanupService {
    job_repository: Arc<dyn JobRepository>,
    notification_repository: Arc<dyn NotificationRepository>,
    config: CleanupConfig,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl CleanupService {
    pub fn new(
        job_repository: Arc<dyn JobRepository>,
        notification_repository: Arc<dyn NotificationRepository>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            job_repository,
            notification_repository,
            config,
            shutdown_tx: None,
            cleanup_handle: None,
        }
    }

    /// 启动清理服务
    pub async fn start(&mut self) -> StreetwiseResult<()> {
        if !self.config.enabled {
            info!("Cleanup service is disabled");
            return Ok(());
        }

        info!("Starting cleanup service with config: {:?}", self.config);

        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();
        self.shutdown_tx = Some(shutdown_tx);

        let job_repository = self.job_repository.clone();
        let notification_repository = self.notification_repository.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut cleanup_interval =
                interval(std::time::Duration::from_secs(config.interval_seconds));

            loop {
                tokio::select! {
                    _ = cleanup_interval.tick() => {
                        if let Err(e) = Self::perform_cleanup(
                            &job_repository,
                            &notification_repository,
                            &config,
                        ).await {
                            error!("Cleanup failed: {}", e);
                        }
                    }
                    _ = &mut shutdown_rx => {
                        info!("Cleanup service shutdown requested");
                        break;
                    }
                }
            }

            info!("Cleanup service stopped");
        });

        self.cleanup_handle = Some(handle);
        info!("Cleanup service started successfully");
        Ok(())
    }

    /// 停止清理服务
    pub async fn stop(&mut self) -> StreetwiseResult<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        if let Some(handle) = self.cleanup_handle.take() {
            if let Err(e) = handle.await {
                warn!("Error waiting for cleanup service to stop: {}", e);
            }
        }

        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.cleanup_handle.is_some()
    }

    /// 执行一次清理操作
    pub async fn cleanup_once(&self) -> StreetwiseResult<CleanupStats> {
        if !self.config.enabled {
            return Ok(CleanupStats::default());
        }

        Self::perform_cleanup(
            &self.job_repository,
            &self.notification_repository,
            &self.config,
        )
        .await
    }

    async fn perform_cleanup(
        job_repository: &Arc<dyn JobRepository>,
        notification_repository: &Arc<dyn NotificationRepository>,
        config: &CleanupConfig,
    ) -> StreetwiseResult<CleanupStats> {
        let start_time = std::time::Instant::now();
        let now = Utc::now();
        let mut stats = CleanupStats::default();

        debug!("Starting cleanup operation");

        let finished_cutoff = now - Duration::days(config.finished_job_retention_days);
        stats.finished_jobs_cleaned = job_repository
            .delete_finished_before(&FINISHED_STATUSES, finished_cutoff)
            .await?;

        let failed_cutoff = now - Duration::days(config.failed_job_retention_days);
        stats.failed_jobs_cleaned = job_repository
            .delete_finished_before(&FAILED_STATUSES, failed_cutoff)
            .await?;

        stats.dismissed_notifications_cleaned =
            notification_repository.delete_dismissed(now).await?;

        let read_cutoff = now - Duration::days(config.read_notification_retention_days);
        stats.read_notifications_cleaned = notification_repository
            .delete_read_before(read_cutoff)
            .await?;

        stats.duration = start_time.elapsed();
        stats.total_cleaned = stats.finished_jobs_cleaned
            + stats.failed_jobs_cleaned
            + stats.dismissed_notifications_cleaned
            + stats.read_notifications_cleaned;

        for (kind, count) in [
            ("finished_jobs", stats.finished_jobs_cleaned),
            ("failed_jobs", stats.failed_jobs_cleaned),
            ("dismissed_notifications", stats.dismissed_notifications_cleaned),
            ("read_notifications", stats.read_notifications_cleaned),
        ] {
            counter!("streetwise_cleanup_deleted_total", "kind" => kind).increment(count);
        }

        if stats.has_cleanup() {
            info!(
                "Cleanup completed: {} records cleaned in {:?} (finished jobs: {}, failed jobs: {}, dismissed notifications: {}, read notifications: {})",
                stats.total_cleaned,
                stats.duration,
                stats.finished_jobs_cleaned,
                stats.failed_jobs_cleaned,
                stats.dismissed_notifications_cleaned,
                stats.read_notifications_cleaned
            );
        } else {
            debug!("Cleanup completed: nothing to clean");
        }

        Ok(stats)
    }
}

/// 清理统计信息
#[derive(Debug, Default)]
pub struct CleanupStats {
    pub finished_jobs_cleaned: u64,
    pub failed_jobs_cleaned: u64,
    pub dismissed_notifications_cleaned: u64,
    pub read_notifications_cleaned: u64,
    pub total_cleaned: u64,
    pub duration: std::time::Duration,
}

impl CleanupStats {
    /// 是否有清理操作
    pub fn has_cleanup(&self) -> bool {
        self.total_cleaned > 0
    }
}
