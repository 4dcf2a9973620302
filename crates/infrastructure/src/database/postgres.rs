//! PostgreSQL 仓储

use sqlx::{PgPool, Postgres};

use super::job_repository::impl_job_repository;
use super::notification_repository::impl_notification_repository;

/// 并发领取时跳过已被其他事务锁定的候选行
const CLAIM_LOCK_CLAUSE: &str = "FOR UPDATE SKIP LOCKED";

impl_notification_repository!(PostgresNotificationRepository, PgPool, Postgres);

impl_job_repository!(
    PostgresJobRepository,
    pool = PgPool,
    database = Postgres,
    insert_notification = insert_notification,
    claim_lock = CLAIM_LOCK_CLAUSE,
);
