use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::interfaces::JobService;

/// 超时任务检测器
///
/// 按固定间隔调用 `JobService::expire_stale_jobs`，直到收到关闭信号。
pub struct StaleJobDetector {
    job_service: Arc<dyn JobService>,
    check_interval: Duration,
}

impl StaleJobDetector {
    pub fn new(job_service: Arc<dyn JobService>, check_interval: Duration) -> Self {
        Self {
            job_service,
            check_interval,
        }
    }

    /// 执行一轮检测，返回标记为失败的任务数
    pub async fn run_once(&self) -> usize {
        match self.job_service.expire_stale_jobs().await {
            Ok(0) => {
                debug!("没有超时任务");
                0
            }
            Ok(expired) => {
                info!("已将 {} 个超时任务标记为失败", expired);
                expired
            }
            Err(e) => {
                error!("超时任务检测失败: {}", e);
                0
            }
        }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "启动超时任务检测器，检测间隔 {} 秒",
            self.check_interval.as_secs()
        );
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("超时任务检测器收到关闭信号");
                    break;
                }
            }
        }
    }

    pub fn spawn(self, shutdown_rx: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown_rx))
    }
}
