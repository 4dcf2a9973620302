//! 数据库表结构
//!
//! 两种后端各自维护一组幂等的 DDL 语句，逐条执行。

use sqlx::{PgPool, SqlitePool};
use streetwise_errors::{StreetwiseError, StreetwiseResult};
use tracing::{debug, info};

const SQLITE_SCHEMA: &[(&str, &str)] = &[
    (
        "创建后台任务表",
        r#"
        CREATE TABLE IF NOT EXISTS background_jobs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            job_type TEXT NOT NULL CHECK (job_type IN
                ('website_crawl', 'performance_analysis', 'competitor_analysis', 'content_generation')),
            status TEXT NOT NULL DEFAULT 'queued' CHECK (status IN
                ('queued', 'running', 'completed', 'failed', 'cancelled')),
            priority INTEGER NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            current_step TEXT,
            input TEXT NOT NULL DEFAULT '{}',
            result TEXT,
            error TEXT,
            metadata TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
            max_retries INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
            next_retry_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT
        )
        "#,
    ),
    (
        "创建任务通知表",
        r#"
        CREATE TABLE IF NOT EXISTS job_notifications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            job_id INTEGER,
            notification_type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            auto_dismiss BOOLEAN NOT NULL DEFAULT FALSE,
            action_url TEXT,
            action_text TEXT,
            created_at TEXT NOT NULL,
            read_at TEXT,
            dismiss_at TEXT,
            FOREIGN KEY (job_id) REFERENCES background_jobs (id) ON DELETE SET NULL
        )
        "#,
    ),
    (
        "创建任务用户索引",
        "CREATE INDEX IF NOT EXISTS idx_background_jobs_user ON background_jobs(user_id, created_at)",
    ),
    (
        "创建任务领取索引",
        "CREATE INDEX IF NOT EXISTS idx_background_jobs_claim ON background_jobs(status, priority, created_at)",
    ),
    (
        "创建通知用户索引",
        "CREATE INDEX IF NOT EXISTS idx_job_notifications_user ON job_notifications(user_id, is_read, created_at)",
    ),
    (
        "创建通知任务索引",
        "CREATE INDEX IF NOT EXISTS idx_job_notifications_job ON job_notifications(job_id)",
    ),
];

const POSTGRES_SCHEMA: &[(&str, &str)] = &[
    (
        "创建后台任务表",
        r#"
        CREATE TABLE IF NOT EXISTS background_jobs (
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL,
            job_type TEXT NOT NULL CHECK (job_type IN
                ('website_crawl', 'performance_analysis', 'competitor_analysis', 'content_generation')),
            status TEXT NOT NULL DEFAULT 'queued' CHECK (status IN
                ('queued', 'running', 'completed', 'failed', 'cancelled')),
            priority INTEGER NOT NULL DEFAULT 0,
            progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            current_step TEXT,
            input JSONB NOT NULL DEFAULT '{}'::jsonb,
            result JSONB,
            error TEXT,
            metadata JSONB,
            retry_count INTEGER NOT NULL DEFAULT 0 CHECK (retry_count >= 0),
            max_retries INTEGER NOT NULL DEFAULT 3 CHECK (max_retries >= 0),
            next_retry_at TIMESTAMPTZ,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ
        )
        "#,
    ),
    (
        "创建任务通知表",
        r#"
        CREATE TABLE IF NOT EXISTS job_notifications (
            id BIGSERIAL PRIMARY KEY,
            user_id TEXT NOT NULL,
            job_id BIGINT REFERENCES background_jobs (id) ON DELETE SET NULL,
            notification_type TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read BOOLEAN NOT NULL DEFAULT FALSE,
            auto_dismiss BOOLEAN NOT NULL DEFAULT FALSE,
            action_url TEXT,
            action_text TEXT,
            created_at TIMESTAMPTZ NOT NULL,
            read_at TIMESTAMPTZ,
            dismiss_at TIMESTAMPTZ
        )
        "#,
    ),
    (
        "创建任务用户索引",
        "CREATE INDEX IF NOT EXISTS idx_background_jobs_user ON background_jobs(user_id, created_at DESC)",
    ),
    (
        "创建任务领取索引",
        "CREATE INDEX IF NOT EXISTS idx_background_jobs_claim ON background_jobs(status, priority DESC, created_at)",
    ),
    (
        "创建通知用户索引",
        "CREATE INDEX IF NOT EXISTS idx_job_notifications_user ON job_notifications(user_id, is_read, created_at DESC)",
    ),
    (
        "创建通知任务索引",
        "CREATE INDEX IF NOT EXISTS idx_job_notifications_job ON job_notifications(job_id)",
    ),
];

fn migration_error(step: &str, error: sqlx::Error) -> StreetwiseError {
    StreetwiseError::database_error(format!("{step}失败: {error}"))
}

/// 运行 SQLite 数据库迁移
pub async fn run_sqlite_migrations(pool: &SqlitePool) -> StreetwiseResult<()> {
    debug!("运行SQLite数据库迁移");
    for (step, sql) in SQLITE_SCHEMA {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| migration_error(step, e))?;
    }
    info!("SQLite数据库迁移完成");
    Ok(())
}

/// 运行 PostgreSQL 数据库迁移
pub async fn run_postgres_migrations(pool: &PgPool) -> StreetwiseResult<()> {
    debug!("运行PostgreSQL数据库迁移");
    for (step, sql) in POSTGRES_SCHEMA {
        sqlx::query(sql)
            .execute(pool)
            .await
            .map_err(|e| migration_error(step, e))?;
    }
    info!("PostgreSQL数据库迁移完成");
    Ok(())
}
