//! SQLite 仓储

use sqlx::{Sqlite, SqlitePool};

use super::job_repository::impl_job_repository;
use super::notification_repository::impl_notification_repository;

impl_notification_repository!(SqliteNotificationRepository, SqlitePool, Sqlite);

impl_job_repository!(
    SqliteJobRepository,
    pool = SqlitePool,
    database = Sqlite,
    insert_notification = insert_notification,
    claim_lock = "",
);
