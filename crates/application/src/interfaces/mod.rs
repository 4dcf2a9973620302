pub mod service_interfaces;

pub use service_interfaces::*;
