//! Deferred retry scheduling
//!
//! Scheduled retries are held in a single timer queue owned by the
//! [`RetryWorker`], never as one sleeping task per pending delay. The worker
//! follows the usual lifecycle rules:
//! - Explicit lifecycle management (start/stop)
//! - Join handles for spawned tasks
//! - Cancellation token support
//! - Timeout wrapping on shutdown

pub mod error;
pub mod retry_worker;

pub use error::{SchedulerError, SchedulerResult};
pub use retry_worker::{retry_queue, RetryInbox, RetryQueue, RetryWorker, RetryWorkerConfig};
