//! Test helper utilities and common testing patterns
//!
//! This module provides utilities for setting up test environments:
//! a migrated in-memory database and configs tuned for tests.

use std::sync::Arc;

use streetwise_config::{AppConfig, AuthConfig, CleanupConfig, JobsConfig, NotificationsConfig};
use streetwise_domain::repositories::{JobRepository, NotificationRepository};
use streetwise_infrastructure::DatabaseManager;

/// JWT secret used by test configs, long enough to pass validation
pub const TEST_JWT_SECRET: &str = "streetwise-test-secret-0123456789abcdef";

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// App config for tests: in-memory database, auth on with a fixed secret,
    /// no background services
    pub fn app_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        config.database.min_connections = 1;
        config.api.bind_address = "127.0.0.1:18080".to_string();
        config.api.auth = AuthConfig {
            enabled: true,
            jwt_secret: TEST_JWT_SECRET.to_string(),
            jwt_expiration_hours: 1,
            api_keys: Vec::new(),
        };
        config.jobs = JobsConfig {
            stale_detection_enabled: false,
            ..Default::default()
        };
        config.notifications = NotificationsConfig::default();
        config.cleanup = CleanupConfig {
            enabled: false,
            ..Default::default()
        };
        config.observability.metrics_enabled = false;
        config
    }
}

/// Migrated in-memory SQLite database
///
/// The pool holds a single connection, so every repository handed out by
/// this struct sees the same data for as long as it is alive.
pub struct TestDatabase {
    pub manager: DatabaseManager,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let manager = DatabaseManager::new("sqlite::memory:", 1)
            .await
            .expect("Failed to open in-memory database");
        manager
            .migrate()
            .await
            .expect("Failed to run migrations");
        Self { manager }
    }

    pub fn jobs(&self) -> Arc<dyn JobRepository> {
        self.manager.job_repository()
    }

    pub fn notifications(&self) -> Arc<dyn NotificationRepository> {
        self.manager.notification_repository()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streetwise_config::ConfigValidator;

    #[test]
    fn test_app_config_is_valid() {
        assert!(TestEnv::app_config().validate().is_ok());
    }

    #[tokio::test]
    async fn test_database_is_migrated() {
        let db = TestDatabase::new().await;
        assert!(db.manager.health_check().await.is_ok());
        assert!(db.jobs().get_by_id(1).await.unwrap().is_none());
    }
}
