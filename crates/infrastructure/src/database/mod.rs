mod job_repository;
pub mod manager;
pub mod migrations;
mod notification_repository;
pub mod postgres;
pub mod query_builder;
pub mod sqlite;

pub use manager::{DatabaseManager, DatabasePool, DatabaseType};
pub use postgres::{PostgresJobRepository, PostgresNotificationRepository};
pub use sqlite::{SqliteJobRepository, SqliteNotificationRepository};
