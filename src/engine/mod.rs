pub mod access;
pub mod interceptor;
pub mod lifecycle;

pub use access::{decide_with, AccessEngine};
pub use interceptor::{FailMode, NavigationInterceptor};
pub use lifecycle::{UnblockManager, DEFAULT_EXEMPTION_DURATION};
