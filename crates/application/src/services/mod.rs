pub mod job_manager;
pub mod notification_manager;
pub mod stale_job_detector;

pub use job_manager::JobManager;
pub use notification_manager::{job_notification_templates, NotificationManager};
pub use stale_job_detector::StaleJobDetector;
