pub mod entities;
pub mod notifications;
pub mod repositories;
pub mod transitions;

// SQLx 类型转换实现
pub mod sqlx_impls;

pub use entities::*;
pub use notifications::*;
pub use repositories::*;
pub use streetwise_errors::{StreetwiseError, StreetwiseResult};
pub use transitions::*;
