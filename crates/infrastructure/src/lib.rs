pub mod cleanup_service;
pub mod database;
pub mod error_handling;

pub use cleanup_service::{CleanupService, CleanupStats};
pub use database::*;
