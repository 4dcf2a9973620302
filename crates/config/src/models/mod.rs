pub mod api;
pub mod app_config;
pub mod database;
pub mod jobs;
pub mod observability;

pub use api::*;
pub use app_config::*;
pub use database::*;
pub use jobs::*;
pub use observability::*;
