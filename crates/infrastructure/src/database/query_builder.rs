//! Job query builder - dynamic SQL construction shared by the PostgreSQL and SQLite
//! repositories.
//!
//! Both backends accept `$N` positional parameters, so the generated SQL is
//! identical apart from the optional row-locking clause used when claiming jobs.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::error::BoxDynError;
use sqlx::{Arguments, Database, Encode, Type};
use streetwise_domain::entities::{JobFilter, JobStatus, JobType};
use streetwise_domain::transitions::JobTransition;

pub const JOB_COLUMNS: &str = "id, user_id, job_type, status, priority, progress, current_step, \
     input, result, error, metadata, retry_count, max_retries, next_retry_at, created_at, \
     updated_at, started_at, completed_at";

pub const NOTIFICATION_COLUMNS: &str = "id, user_id, job_id, notification_type, title, message, \
     is_read, auto_dismiss, action_url, action_text, created_at, read_at, dismiss_at";

/// A bound value for a dynamically built job query
#[derive(Debug, Clone, PartialEq)]
pub enum JobQueryParam {
    Text(String),
    Int64(i64),
    Status(JobStatus),
    JobType(JobType),
    Json(Value),
    Timestamp(DateTime<Utc>),
}

/// Convert collected params into backend-specific query arguments
pub fn into_arguments<'q, DB>(
    params: Vec<JobQueryParam>,
) -> Result<<DB as Database>::Arguments<'q>, BoxDynError>
where
    DB: Database,
    String: Encode<'q, DB> + Type<DB>,
    i64: Encode<'q, DB> + Type<DB>,
    JobStatus: Encode<'q, DB> + Type<DB>,
    JobType: Encode<'q, DB> + Type<DB>,
    Value: Encode<'q, DB> + Type<DB>,
    DateTime<Utc>: Encode<'q, DB> + Type<DB>,
{
    let mut args = <DB as Database>::Arguments::<'q>::default();
    for param in params {
        match param {
            JobQueryParam::Text(value) => args.add(value)?,
            JobQueryParam::Int64(value) => args.add(value)?,
            JobQueryParam::Status(value) => args.add(value)?,
            JobQueryParam::JobType(value) => args.add(value)?,
            JobQueryParam::Json(value) => args.add(value)?,
            JobQueryParam::Timestamp(value) => args.add(value)?,
        }
    }
    Ok(args)
}

/// Accumulates SQL text and positional params together
struct SqlWriter {
    sql: String,
    params: Vec<JobQueryParam>,
}

impl SqlWriter {
    fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    fn bind(&mut self, param: JobQueryParam) -> &mut Self {
        self.params.push(param);
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
        self
    }

    fn bind_list<I>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = JobQueryParam>,
    {
        self.push("(");
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.bind(value);
        }
        self.push(")")
    }

    fn finish(self) -> (String, Vec<JobQueryParam>) {
        (self.sql, self.params)
    }
}

pub struct JobQueryBuilder;

impl JobQueryBuilder {
    fn push_filter(writer: &mut SqlWriter, filter: &JobFilter) {
        writer.push(" WHERE 1=1");
        if let Some(user_id) = &filter.user_id {
            writer
                .push(" AND user_id = ")
                .bind(JobQueryParam::Text(user_id.clone()));
        }
        if let Some(status) = filter.status {
            writer
                .push(" AND status = ")
                .bind(JobQueryParam::Status(status));
        }
        if let Some(job_type) = filter.job_type {
            writer
                .push(" AND job_type = ")
                .bind(JobQueryParam::JobType(job_type));
        }
    }

    /// SELECT with filter, newest first
    pub fn build_list_query(filter: &JobFilter) -> (String, Vec<JobQueryParam>) {
        let mut writer = SqlWriter::new(format!("SELECT {JOB_COLUMNS} FROM background_jobs"));
        Self::push_filter(&mut writer, filter);
        writer.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.limit {
            writer.push(" LIMIT ").bind(JobQueryParam::Int64(limit));
            if let Some(offset) = filter.offset {
                writer.push(" OFFSET ").bind(JobQueryParam::Int64(offset));
            }
        }
        writer.finish()
    }

    /// COUNT(*) with the same filter, ignoring pagination
    pub fn build_count_query(filter: &JobFilter) -> (String, Vec<JobQueryParam>) {
        let mut writer = SqlWriter::new("SELECT COUNT(*) FROM background_jobs");
        Self::push_filter(&mut writer, filter);
        writer.finish()
    }

    /// Conditional UPDATE ... RETURNING for a state transition
    pub fn build_transition_query(
        id: i64,
        owner: Option<&str>,
        transition: &JobTransition,
        now: DateTime<Utc>,
    ) -> (String, Vec<JobQueryParam>) {
        let mut writer = SqlWriter::new("UPDATE background_jobs SET status = ");
        writer.bind(JobQueryParam::Status(transition.target()));
        writer
            .push(", updated_at = ")
            .bind(JobQueryParam::Timestamp(now));

        match transition {
            JobTransition::Start { current_step } => {
                writer
                    .push(", started_at = ")
                    .bind(JobQueryParam::Timestamp(now));
                if let Some(step) = current_step {
                    writer
                        .push(", current_step = ")
                        .bind(JobQueryParam::Text(step.clone()));
                }
            }
            JobTransition::Complete { result } => {
                writer
                    .push(", progress = 100, result = ")
                    .bind(JobQueryParam::Json(result.clone()))
                    .push(", completed_at = ")
                    .bind(JobQueryParam::Timestamp(now));
            }
            JobTransition::Fail { error } | JobTransition::Expire { error, .. } => {
                writer
                    .push(", error = ")
                    .bind(JobQueryParam::Text(error.clone()))
                    .push(", completed_at = ")
                    .bind(JobQueryParam::Timestamp(now));
            }
            JobTransition::Cancel => {
                writer
                    .push(", completed_at = ")
                    .bind(JobQueryParam::Timestamp(now));
            }
            JobTransition::Retry => {
                writer
                    .push(
                        ", retry_count = retry_count + 1, progress = 0, current_step = NULL, \
                         error = NULL, result = NULL, started_at = NULL, completed_at = NULL, \
                         next_retry_at = ",
                    )
                    .bind(JobQueryParam::Timestamp(now));
            }
        }

        writer.push(" WHERE id = ").bind(JobQueryParam::Int64(id));
        writer.push(" AND status IN ").bind_list(
            transition
                .allowed_from()
                .iter()
                .map(|status| JobQueryParam::Status(*status)),
        );
        if let Some(owner) = owner {
            writer
                .push(" AND user_id = ")
                .bind(JobQueryParam::Text(owner.to_string()));
        }
        match transition {
            JobTransition::Retry => {
                writer.push(" AND retry_count < max_retries");
            }
            JobTransition::Expire { stale_before, .. } => {
                writer
                    .push(" AND updated_at < ")
                    .bind(JobQueryParam::Timestamp(*stale_before));
            }
            _ => {}
        }
        writer.push(&format!(" RETURNING {JOB_COLUMNS}"));
        writer.finish()
    }

    /// Atomically move the next claimable queued job to running
    ///
    /// `lock_clause` is appended to the candidate sub-select (e.g. `FOR UPDATE SKIP LOCKED`).
    pub fn build_claim_query(
        job_types: &[JobType],
        now: DateTime<Utc>,
        lock_clause: &str,
    ) -> (String, Vec<JobQueryParam>) {
        let mut writer = SqlWriter::new("UPDATE background_jobs SET status = ");
        writer.bind(JobQueryParam::Status(JobStatus::Running));
        writer
            .push(", started_at = ")
            .bind(JobQueryParam::Timestamp(now))
            .push(", updated_at = ")
            .bind(JobQueryParam::Timestamp(now));
        writer
            .push(" WHERE status = ")
            .bind(JobQueryParam::Status(JobStatus::Queued));
        writer.push(" AND id = (SELECT id FROM background_jobs WHERE status = ");
        writer.bind(JobQueryParam::Status(JobStatus::Queued));
        writer
            .push(" AND (next_retry_at IS NULL OR next_retry_at <= ")
            .bind(JobQueryParam::Timestamp(now))
            .push(")");
        if !job_types.is_empty() {
            writer
                .push(" AND job_type IN ")
                .bind_list(job_types.iter().map(|t| JobQueryParam::JobType(*t)));
        }
        writer.push(" ORDER BY priority DESC, created_at ASC, id ASC LIMIT 1");
        if !lock_clause.is_empty() {
            writer.push(" ").push(lock_clause);
        }
        writer.push(&format!(") RETURNING {JOB_COLUMNS}"));
        writer.finish()
    }

    /// DELETE finished jobs older than the cutoff
    pub fn build_delete_finished_query(
        statuses: &[JobStatus],
        before: DateTime<Utc>,
    ) -> (String, Vec<JobQueryParam>) {
        let mut writer = SqlWriter::new("DELETE FROM background_jobs WHERE status IN ");
        writer.bind_list(statuses.iter().map(|s| JobQueryParam::Status(*s)));
        writer
            .push(" AND completed_at IS NOT NULL AND completed_at < ")
            .bind(JobQueryParam::Timestamp(before));
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_query_with_all_filters() {
        let filter = JobFilter {
            user_id: Some("user-a".to_string()),
            status: Some(JobStatus::Failed),
            job_type: Some(JobType::WebsiteCrawl),
            limit: Some(20),
            offset: Some(40),
        };
        let (sql, params) = JobQueryBuilder::build_list_query(&filter);
        assert!(sql.contains("user_id = $1"));
        assert!(sql.contains("status = $2"));
        assert!(sql.contains("job_type = $3"));
        assert!(sql.contains("ORDER BY created_at DESC, id DESC LIMIT $4 OFFSET $5"));
        assert_eq!(params.len(), 5);
        assert_eq!(params[3], JobQueryParam::Int64(20));
    }

    #[test]
    fn test_count_query_ignores_pagination() {
        let filter = JobFilter {
            user_id: Some("user-a".to_string()),
            limit: Some(20),
            offset: Some(40),
            ..Default::default()
        };
        let (sql, params) = JobQueryBuilder::build_count_query(&filter);
        assert!(sql.starts_with("SELECT COUNT(*)"));
        assert!(!sql.contains("LIMIT"));
        assert_eq!(params, vec![JobQueryParam::Text("user-a".to_string())]);
    }

    #[test]
    fn test_cancel_transition_is_conditional_on_active_states() {
        let now = Utc::now();
        let (sql, params) =
            JobQueryBuilder::build_transition_query(7, Some("user-a"), &JobTransition::Cancel, now);
        assert!(sql.contains("WHERE id = $4 AND status IN ($5, $6) AND user_id = $7"));
        assert!(sql.contains("RETURNING id, user_id"));
        assert_eq!(params[0], JobQueryParam::Status(JobStatus::Cancelled));
        assert_eq!(params[4], JobQueryParam::Status(JobStatus::Queued));
        assert_eq!(params[5], JobQueryParam::Status(JobStatus::Running));
    }

    #[test]
    fn test_retry_transition_checks_budget() {
        let (sql, _) =
            JobQueryBuilder::build_transition_query(1, None, &JobTransition::Retry, Utc::now());
        assert!(sql.contains("retry_count = retry_count + 1"));
        assert!(sql.contains("progress = 0"));
        assert!(sql.contains("error = NULL"));
        assert!(sql.contains("AND retry_count < max_retries"));
        assert!(!sql.contains("user_id ="));
    }

    #[test]
    fn test_expire_transition_requires_staleness() {
        let stale_before = Utc::now();
        let transition = JobTransition::Expire {
            error: "timed out".into(),
            stale_before,
        };
        let (sql, params) =
            JobQueryBuilder::build_transition_query(1, None, &transition, Utc::now());
        assert!(sql.contains("AND updated_at < $"));
        assert_eq!(
            params.last(),
            Some(&JobQueryParam::Timestamp(stale_before))
        );
    }

    #[test]
    fn test_complete_transition_stores_result() {
        let transition = JobTransition::Complete {
            result: json!({"pages": 12}),
        };
        let (sql, params) =
            JobQueryBuilder::build_transition_query(1, None, &transition, Utc::now());
        assert!(sql.contains("progress = 100"));
        assert!(params.contains(&JobQueryParam::Json(json!({"pages": 12}))));
    }

    #[test]
    fn test_claim_query_with_types_and_lock() {
        let (sql, params) = JobQueryBuilder::build_claim_query(
            &[JobType::WebsiteCrawl, JobType::PerformanceAnalysis],
            Utc::now(),
            "FOR UPDATE SKIP LOCKED",
        );
        assert!(sql.contains("job_type IN ($7, $8)"));
        assert!(sql.contains("LIMIT 1 FOR UPDATE SKIP LOCKED)"));
        assert_eq!(params.len(), 8);

        let (sql, _) = JobQueryBuilder::build_claim_query(&[], Utc::now(), "");
        assert!(!sql.contains("job_type IN"));
        assert!(!sql.contains("FOR UPDATE"));
    }

    #[test]
    fn test_delete_finished_query() {
        let (sql, params) = JobQueryBuilder::build_delete_finished_query(
            &[JobStatus::Completed, JobStatus::Cancelled],
            Utc::now(),
        );
        assert!(sql.contains("status IN ($1, $2)"));
        assert!(sql.contains("completed_at < $3"));
        assert_eq!(params.len(), 3);
    }
}
