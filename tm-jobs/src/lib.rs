//! Minute-bucketed reminder jobs.
//!
//! Reminders that fire in the same minute share one backend job. The job id
//! is derived from the bucket, so concurrent creators converge on the same
//! job without coordination.

mod backend;
mod bucket;
mod error;
mod scheduler;

pub use backend::{InMemoryJobBackend, JobReferences, ScheduleOutcome, ScheduledJob, SchedulingBackend};
pub use bucket::{JobId, bucket_key, bucket_start};
pub use error::{Result, SchedulingError};
pub use scheduler::{DEFAULT_JOB_NAMESPACE, DeleteOutcome, JobBucketScheduler};
