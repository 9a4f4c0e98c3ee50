//! Background job system with retry, backoff, and dead-letter handling.
//!
//! Jobs are typed (`JobKind`) and routed to registered handlers; a failed job
//! retries with backoff until its policy runs out, then parks in the
//! dead-letter queue for inspection and replay. The scheduler enqueues the
//! recurring scans from the schedule table; handlers are plain closures over
//! the engine and notification service.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
