//! Common utilities
//!
//! - [`retry`] - Exponential backoff around fallible async operations
//! - [`throttle`] - Byte-rate limiting for download streams

pub mod retry;
pub mod throttle;

pub use retry::{with_retry, with_retry_if, RetryPolicy};
pub use throttle::ThrottledReader;
