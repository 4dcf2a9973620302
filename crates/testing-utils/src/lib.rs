//! # StreetWise Testing Utils
//!
//! Shared testing utilities for the StreetWise job service: entity
//! builders, notifier test doubles and an in-memory database fixture.
//!
//! ```toml
//! [dev-dependencies]
//! streetwise-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
