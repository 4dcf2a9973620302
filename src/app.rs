use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

use streetwise_api::{auth::AuthState, create_app, AppState};
use streetwise_application::{
    job_notification_templates, JobManager, JobService, NotificationManager, NotificationService,
    StaleJobDetector,
};
use streetwise_config::AppConfig;
use streetwise_infrastructure::{CleanupService, DatabaseManager};

use crate::shutdown::ShutdownManager;

/// 收到关闭信号后等待应用退出的最长时间
const GRACEFUL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 主应用程序：数据库、服务层与 HTTP 接口
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    job_service: Arc<dyn JobService>,
    notification_service: Arc<dyn NotificationService>,
}

impl Application {
    /// 连接数据库、执行迁移并装配服务
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化应用程序");

        let database = DatabaseManager::from_config(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        database.migrate().await.context("数据库迁移失败")?;

        let notifier = Arc::new(job_notification_templates(&config.notifications));
        let job_service: Arc<dyn JobService> = Arc::new(JobManager::new(
            database.job_repository(),
            notifier,
            config.jobs.clone(),
        ));
        let notification_service: Arc<dyn NotificationService> =
            Arc::new(NotificationManager::new(
                database.notification_repository(),
                database.job_repository(),
                config.notifications.clone(),
            ));

        Ok(Self {
            config,
            database,
            job_service,
            notification_service,
        })
    }

    /// 构建带中间件的 HTTP 路由
    pub fn router(&self) -> Router {
        let state = AppState {
            job_service: Arc::clone(&self.job_service),
            notification_service: Arc::clone(&self.notification_service),
            database: self.database.clone(),
            auth: Arc::new(AuthState::from_config(&self.config.api.auth)),
        };
        create_app(state, &self.config.api)
    }

    /// 在配置的地址上运行，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定API地址失败: {}", self.config.api.bind_address))?;
        self.serve(listener, shutdown_rx).await
    }

    /// 运行应用直到 `signal` 完成，然后优雅关闭
    ///
    /// 应用在收到信号前退出（例如端口被占用）时直接返回其错误。
    pub async fn run_until<S>(self, shutdown: ShutdownManager, signal: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let shutdown_rx = shutdown.subscribe().await;
        let mut app_handle = tokio::spawn(async move { self.run(shutdown_rx).await });

        tokio::select! {
            joined = &mut app_handle => {
                let result = joined.context("应用任务异常终止")?;
                return match result {
                    Ok(()) => Err(anyhow!("应用在收到关闭信号前退出")),
                    Err(e) => {
                        error!("应用运行失败: {e:#}");
                        Err(e)
                    }
                };
            }
            _ = signal => {
                info!("收到关闭信号，开始优雅关闭...");
            }
        }

        shutdown.shutdown().await;

        match tokio::time::timeout(GRACEFUL_SHUTDOWN_TIMEOUT, app_handle).await {
            Ok(joined) => {
                joined.context("应用任务异常终止")??;
                info!("应用已优雅关闭");
                Ok(())
            }
            Err(_) => {
                warn!("应用关闭超时，强制退出");
                Ok(())
            }
        }
    }

    /// 在给定监听器上运行 HTTP 服务及后台任务
    pub async fn serve(
        &self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        if self.config.observability.metrics_enabled {
            self.install_metrics_exporter()?;
        }

        if !self.config.api.auth.enabled {
            warn!("API认证已关闭，所有请求将以开发用户身份处理");
        }

        let detector_handle = if self.config.jobs.stale_detection_enabled {
            let detector = StaleJobDetector::new(
                Arc::clone(&self.job_service),
                Duration::from_secs(self.config.jobs.stale_check_interval_seconds),
            );
            Some(detector.spawn(shutdown_rx.resubscribe()))
        } else {
            info!("超时任务检测已关闭");
            None
        };

        let mut cleanup = CleanupService::new(
            self.database.job_repository(),
            self.database.notification_repository(),
            self.config.cleanup.clone(),
        );
        cleanup.start().await.context("启动清理服务失败")?;

        let local_addr = listener.local_addr().context("读取监听地址失败")?;
        info!("API服务器启动在: {}", local_addr);

        let mut server_shutdown_rx = shutdown_rx.resubscribe();
        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(async move {
                let _ = server_shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败");

        if let Err(e) = cleanup.stop().await {
            error!("停止清理服务失败: {e}");
        }
        if let Some(handle) = detector_handle {
            if let Err(e) = handle.await {
                error!("超时任务检测器退出异常: {e}");
            }
        }
        self.database.close().await;
        info!("应用程序已停止");

        result
    }

    fn install_metrics_exporter(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .observability
            .metrics_bind_address
            .parse()
            .with_context(|| {
                format!(
                    "无效的指标监听地址: {}",
                    self.config.observability.metrics_bind_address
                )
            })?;

        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus指标导出器失败")?;
        info!("Prometheus指标导出器监听在: {}", addr);
        Ok(())
    }
}
