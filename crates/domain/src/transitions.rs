//! 任务状态迁移
//!
//! 每个迁移对应仓储层的一条条件更新语句：只有当前状态属于 `allowed_from()`
//! 时才会生效，否则影响行数为 0。

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::entities::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    /// Worker 开始处理
    Start { current_step: Option<String> },
    /// Worker 写入结果
    Complete { result: Value },
    /// Worker 报告失败
    Fail { error: String },
    /// 超时未更新进度的运行中任务，仅当 `updated_at < stale_before` 时生效
    Expire {
        error: String,
        stale_before: DateTime<Utc>,
    },
    /// 用户取消
    Cancel,
    /// 用户重试，要求 `retry_count < max_retries`
    Retry,
}

impl JobTransition {
    pub fn action(&self) -> &'static str {
        match self {
            JobTransition::Start { .. } => "start",
            JobTransition::Complete { .. } => "complete",
            JobTransition::Fail { .. } => "fail",
            JobTransition::Expire { .. } => "expire",
            JobTransition::Cancel => "cancel",
            JobTransition::Retry => "retry",
        }
    }

    pub fn target(&self) -> JobStatus {
        match self {
            JobTransition::Start { .. } => JobStatus::Running,
            JobTransition::Complete { .. } => JobStatus::Completed,
            JobTransition::Fail { .. } | JobTransition::Expire { .. } => JobStatus::Failed,
            JobTransition::Cancel => JobStatus::Cancelled,
            JobTransition::Retry => JobStatus::Queued,
        }
    }

    pub fn allowed_from(&self) -> &'static [JobStatus] {
        match self {
            JobTransition::Start { .. } => &[JobStatus::Queued],
            JobTransition::Complete { .. }
            | JobTransition::Fail { .. }
            | JobTransition::Expire { .. } => &[JobStatus::Running],
            JobTransition::Cancel => &[JobStatus::Queued, JobStatus::Running],
            JobTransition::Retry => &[JobStatus::Failed],
        }
    }

    pub fn is_allowed_from(&self, status: JobStatus) -> bool {
        self.allowed_from().contains(&status)
    }

    pub fn is_terminal(&self) -> bool {
        self.target().is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn all_transitions() -> Vec<JobTransition> {
        vec![
            JobTransition::Start { current_step: None },
            JobTransition::Complete {
                result: json!({}),
            },
            JobTransition::Fail {
                error: "boom".into(),
            },
            JobTransition::Expire {
                error: "timeout".into(),
                stale_before: Utc::now(),
            },
            JobTransition::Cancel,
            JobTransition::Retry,
        ]
    }

    #[test]
    fn test_transitions_follow_state_machine() {
        for transition in all_transitions() {
            for from in transition.allowed_from() {
                assert!(
                    from.can_transition_to(transition.target()),
                    "{} from {} should be a valid edge",
                    transition.action(),
                    from
                );
            }
        }
    }

    #[test]
    fn test_cancel_only_from_active_states() {
        let cancel = JobTransition::Cancel;
        for status in JobStatus::ALL {
            assert_eq!(cancel.is_allowed_from(status), status.can_cancel());
        }
    }

    #[test]
    fn test_terminal_targets() {
        assert!(JobTransition::Cancel.is_terminal());
        assert!(JobTransition::Fail {
            error: "x".into()
        }
        .is_terminal());
        assert!(!JobTransition::Retry.is_terminal());
        assert!(!JobTransition::Start { current_step: None }.is_terminal());
    }
}
