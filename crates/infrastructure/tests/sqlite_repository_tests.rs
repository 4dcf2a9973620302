use chrono::{Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use streetwise_domain::{
    entities::{JobFilter, JobStatus, JobType, NewJob, NotificationFilter},
    notifications::{JobNotificationTemplates, JOB_CANCELLED, JOB_COMPLETED, JOB_FAILED},
    repositories::{JobRepository, NotificationRepository},
    transitions::JobTransition,
};
use streetwise_testing_utils::{
    JobBuilder, NoopNotifier, NotificationBuilder, RecordingNotifier, TestDatabase,
};

struct TestRepos {
    _db: TestDatabase,
    jobs: Arc<dyn JobRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

async fn setup() -> TestRepos {
    let db = TestDatabase::new().await;
    TestRepos {
        jobs: db.jobs(),
        notifications: db.notifications(),
        _db: db,
    }
}

fn templates() -> JobNotificationTemplates {
    JobNotificationTemplates::default()
}

#[tokio::test]
async fn test_create_job_defaults() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(
            &JobBuilder::new()
                .with_type(JobType::CompetitorAnalysis)
                .with_priority(5)
                .with_input(json!({"competitors": ["a.com", "b.com"]}))
                .build_new(),
        )
        .await
        .unwrap();

    assert!(job.id > 0);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress, 0);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.max_retries, 3);
    assert_eq!(job.priority, 5);
    assert_eq!(job.input["competitors"][1], "b.com");
    assert!(job.started_at.is_none());
    assert!(job.completed_at.is_none());

    let loaded = repos.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(loaded, job);
    assert!(repos.jobs.get_by_id(job.id + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_jobs_pages_are_disjoint_and_counted() {
    let repos = setup().await;
    for _ in 0..5 {
        repos
            .jobs
            .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
            .await
            .unwrap();
    }
    repos
        .jobs
        .create(&NewJob::new("user-b", JobType::WebsiteCrawl))
        .await
        .unwrap();

    let mut filter = JobFilter::for_user("user-a");
    filter.limit = Some(2);
    filter.offset = Some(0);
    let first = repos.jobs.list(&filter).await.unwrap();
    filter.offset = Some(2);
    let second = repos.jobs.list(&filter).await.unwrap();

    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(first.iter().all(|a| second.iter().all(|b| a.id != b.id)));
    assert!(first[0].id > first[1].id);
    assert!(first[1].id > second[0].id);
    assert_eq!(repos.jobs.count(&filter).await.unwrap(), 5);

    filter.status = Some(JobStatus::Running);
    assert_eq!(repos.jobs.count(&filter).await.unwrap(), 0);
}

#[tokio::test]
async fn test_cancel_writes_notification_in_same_transition() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::ContentGeneration))
        .await
        .unwrap();

    let outcome = repos
        .jobs
        .transition(job.id, Some("user-a"), &JobTransition::Cancel, &templates())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.job.status, JobStatus::Cancelled);
    assert!(outcome.job.completed_at.is_some());
    let notification = outcome.notification.unwrap();
    assert_eq!(notification.notification_type, JOB_CANCELLED);
    assert_eq!(notification.job_id, Some(job.id));
    assert_eq!(notification.user_id, "user-a");
    assert!(!notification.is_read);

    // 终态任务不能再次取消
    let again = repos
        .jobs
        .transition(job.id, Some("user-a"), &JobTransition::Cancel, &templates())
        .await
        .unwrap();
    assert!(again.is_none());
    assert_eq!(repos.notifications.count_unread("user-a").await.unwrap(), 1);
}

#[tokio::test]
async fn test_transition_respects_owner() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
        .await
        .unwrap();

    let result = repos
        .jobs
        .transition(job.id, Some("user-b"), &JobTransition::Cancel, &templates())
        .await
        .unwrap();
    assert!(result.is_none());

    let unchanged = repos.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, JobStatus::Queued);
    assert_eq!(repos.notifications.count_unread("user-b").await.unwrap(), 0);
}

#[tokio::test]
async fn test_retry_budget_is_enforced() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::PerformanceAnalysis))
        .await
        .unwrap();

    for attempt in 1..=3 {
        let claimed = repos.jobs.claim_next(&[]).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        repos
            .jobs
            .transition(
                job.id,
                None,
                &JobTransition::Fail {
                    error: "lighthouse timeout".into(),
                },
                &templates(),
            )
            .await
            .unwrap()
            .unwrap();

        let retried = repos
            .jobs
            .transition(job.id, Some("user-a"), &JobTransition::Retry, &templates())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.job.status, JobStatus::Queued);
        assert_eq!(retried.job.retry_count, attempt);
        assert_eq!(retried.job.progress, 0);
        assert!(retried.job.error.is_none());
        assert!(retried.job.next_retry_at.is_some());
        assert!(retried.notification.is_none());
    }

    repos.jobs.claim_next(&[]).await.unwrap().unwrap();
    let failed = repos
        .jobs
        .transition(
            job.id,
            None,
            &JobTransition::Fail {
                error: "still broken".into(),
            },
            &templates(),
        )
        .await
        .unwrap()
        .unwrap();
    let notification = failed.notification.unwrap();
    assert_eq!(notification.notification_type, JOB_FAILED);
    assert_eq!(notification.action_text.as_deref(), Some("View details"));

    let rejected = repos
        .jobs
        .transition(job.id, Some("user-a"), &JobTransition::Retry, &templates())
        .await
        .unwrap();
    assert!(rejected.is_none());
    let job = repos.jobs.get_by_id(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.retry_count, 3);
}

#[tokio::test]
async fn test_claim_orders_by_priority_then_age() {
    let repos = setup().await;
    let low = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
        .await
        .unwrap();
    let high = repos
        .jobs
        .create(&JobBuilder::new().with_priority(10).build_new())
        .await
        .unwrap();
    let other_type = repos
        .jobs
        .create(
            &JobBuilder::new()
                .with_type(JobType::ContentGeneration)
                .with_priority(50)
                .build_new(),
        )
        .await
        .unwrap();

    let first = repos
        .jobs
        .claim_next(&[JobType::WebsiteCrawl])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.id, high.id);
    assert_eq!(first.status, JobStatus::Running);
    assert!(first.started_at.is_some());

    let second = repos
        .jobs
        .claim_next(&[JobType::WebsiteCrawl])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.id, low.id);
    assert!(repos
        .jobs
        .claim_next(&[JobType::WebsiteCrawl])
        .await
        .unwrap()
        .is_none());

    let any = repos.jobs.claim_next(&[]).await.unwrap().unwrap();
    assert_eq!(any.id, other_type.id);
}

#[tokio::test]
async fn test_progress_only_moves_forward_while_running() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
        .await
        .unwrap();

    assert!(repos
        .jobs
        .update_progress(job.id, 10, None)
        .await
        .unwrap()
        .is_none());

    repos.jobs.claim_next(&[]).await.unwrap().unwrap();
    let updated = repos
        .jobs
        .update_progress(job.id, 60, Some("crawling pages"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.progress, 60);
    assert_eq!(updated.current_step.as_deref(), Some("crawling pages"));

    let regressed = repos
        .jobs
        .update_progress(job.id, 30, None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(regressed.progress, 60);
    assert_eq!(regressed.current_step.as_deref(), Some("crawling pages"));

    let completed = repos
        .jobs
        .transition(
            job.id,
            None,
            &JobTransition::Complete {
                result: json!({"pagesCrawled": 42}),
            },
            &templates(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.job.progress, 100);
    assert_eq!(completed.job.result, Some(json!({"pagesCrawled": 42})));
    let notification = completed.notification.unwrap();
    assert_eq!(notification.notification_type, JOB_COMPLETED);
    assert!(notification.auto_dismiss);
    assert!(notification.dismiss_at.is_some());
}

#[tokio::test]
async fn test_expire_only_applies_to_stale_jobs() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
        .await
        .unwrap();
    let running = repos.jobs.claim_next(&[]).await.unwrap().unwrap();

    let fresh = JobTransition::Expire {
        error: "Job timed out".into(),
        stale_before: running.updated_at - Duration::minutes(30),
    };
    assert!(repos
        .jobs
        .transition(job.id, None, &fresh, &templates())
        .await
        .unwrap()
        .is_none());

    let cutoff = Utc::now() + Duration::seconds(1);
    let stale = repos.jobs.find_stale_running(cutoff, 10).await.unwrap();
    assert_eq!(stale.len(), 1);

    let expire = JobTransition::Expire {
        error: "Job timed out".into(),
        stale_before: cutoff,
    };
    let outcome = repos
        .jobs
        .transition(job.id, None, &expire, &templates())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.job.status, JobStatus::Failed);
    assert_eq!(outcome.job.error.as_deref(), Some("Job timed out"));
    assert_eq!(
        outcome.notification.unwrap().action_text.as_deref(),
        Some("Retry job")
    );
}

#[tokio::test]
async fn test_notification_listing_and_unread_filter() {
    let repos = setup().await;
    let mut ids = Vec::new();
    for i in 0..5 {
        let created = repos
            .notifications
            .create(
                &NotificationBuilder::new()
                    .with_title(&format!("Notice {i}"))
                    .build_new(),
            )
            .await
            .unwrap();
        ids.push(created.id);
    }
    repos
        .notifications
        .create(&NotificationBuilder::new().with_user("user-b").build_new())
        .await
        .unwrap();

    repos
        .notifications
        .set_read(ids[0], "user-a", true)
        .await
        .unwrap()
        .unwrap();
    repos
        .notifications
        .set_read(ids[1], "user-a", true)
        .await
        .unwrap()
        .unwrap();

    let filter = NotificationFilter::new("user-a", true, 50, 0);
    let unread = repos.notifications.list(&filter).await.unwrap();
    assert_eq!(unread.len(), 3);
    assert!(unread.iter().all(|n| !n.is_read));
    assert_eq!(unread[0].id, ids[4]);
    assert_eq!(repos.notifications.count(&filter).await.unwrap(), 3);

    let page = NotificationFilter::new("user-a", false, 2, 2);
    let listed = repos.notifications.list(&page).await.unwrap();
    assert_eq!(
        listed.iter().map(|n| n.id).collect::<Vec<_>>(),
        vec![ids[2], ids[1]]
    );
    assert_eq!(repos.notifications.count(&page).await.unwrap(), 5);
    assert_eq!(repos.notifications.count_unread("user-a").await.unwrap(), 3);
}

#[tokio::test]
async fn test_set_read_round_trip_and_ownership() {
    let repos = setup().await;
    let created = repos
        .notifications
        .create(&NotificationBuilder::new().build_new())
        .await
        .unwrap();

    assert!(repos
        .notifications
        .set_read(created.id, "user-b", true)
        .await
        .unwrap()
        .is_none());

    let read = repos
        .notifications
        .set_read(created.id, "user-a", true)
        .await
        .unwrap()
        .unwrap();
    assert!(read.is_read);
    let first_read_at = read.read_at.unwrap();

    let read_again = repos
        .notifications
        .set_read(created.id, "user-a", true)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read_again.read_at, Some(first_read_at));

    let unread = repos
        .notifications
        .set_read(created.id, "user-a", false)
        .await
        .unwrap()
        .unwrap();
    assert!(!unread.is_read);
    assert!(unread.read_at.is_none());
}

#[tokio::test]
async fn test_mark_all_read_is_idempotent() {
    let repos = setup().await;
    for _ in 0..3 {
        repos
            .notifications
            .create(&NotificationBuilder::new().build_new())
            .await
            .unwrap();
    }

    assert_eq!(repos.notifications.mark_all_read("user-a").await.unwrap(), 3);
    assert_eq!(repos.notifications.mark_all_read("user-a").await.unwrap(), 0);
    assert_eq!(repos.notifications.count_unread("user-a").await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_notification_scoped_to_owner() {
    let repos = setup().await;
    let created = repos
        .notifications
        .create(&NotificationBuilder::new().build_new())
        .await
        .unwrap();

    assert!(!repos
        .notifications
        .delete(created.id, "user-b")
        .await
        .unwrap());
    assert!(repos
        .notifications
        .delete(created.id, "user-a")
        .await
        .unwrap());
    assert!(repos
        .notifications
        .get_by_id(created.id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_deleting_job_keeps_its_notifications() {
    let repos = setup().await;
    let job = repos
        .jobs
        .create(&NewJob::new("user-a", JobType::WebsiteCrawl))
        .await
        .unwrap();
    let outcome = repos
        .jobs
        .transition(job.id, Some("user-a"), &JobTransition::Cancel, &templates())
        .await
        .unwrap()
        .unwrap();
    let notification_id = outcome.notification.unwrap().id;

    let deleted = repos
        .jobs
        .delete_finished_before(&[JobStatus::Cancelled], Utc::now() + Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let orphan = repos
        .notifications
        .get_by_id(notification_id)
        .await
        .unwrap()
        .unwrap();
    assert!(orphan.job_id.is_none());
}

#[tokio::test]
async fn test_notifier_decides_whether_a_notification_is_written() {
    let repos = setup().await;
    let quiet = repos
        .jobs
        .create(&JobBuilder::new().build_new())
        .await
        .unwrap();
    let outcome = repos
        .jobs
        .transition(quiet.id, Some("user-a"), &JobTransition::Cancel, &NoopNotifier)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.job.status, JobStatus::Cancelled);
    assert!(outcome.notification.is_none());
    assert_eq!(repos.notifications.count_unread("user-a").await.unwrap(), 0);

    let recorder = RecordingNotifier::new();
    let job = repos
        .jobs
        .create(&JobBuilder::new().with_user("user-b").build_new())
        .await
        .unwrap();
    repos.jobs.claim_next(&[]).await.unwrap().unwrap();
    repos
        .jobs
        .transition(
            job.id,
            None,
            &JobTransition::Fail {
                error: "dns failure".into(),
            },
            &recorder,
        )
        .await
        .unwrap()
        .unwrap();
    repos
        .jobs
        .transition(job.id, Some("user-b"), &JobTransition::Retry, &recorder)
        .await
        .unwrap()
        .unwrap();

    // 未满足条件的迁移不会触发通知组装
    assert!(repos
        .jobs
        .transition(job.id, Some("user-b"), &JobTransition::Retry, &recorder)
        .await
        .unwrap()
        .is_none());

    assert_eq!(
        recorder.seen(),
        vec![(job.id, JobStatus::Failed), (job.id, JobStatus::Queued)]
    );
    assert_eq!(repos.notifications.count_unread("user-b").await.unwrap(), 1);
}
