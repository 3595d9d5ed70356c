use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulingError>;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("scheduling backend {operation} failed for job {job_id}: {message}")]
    Backend {
        operation: &'static str,
        job_id: String,
        message: String,
    },

    #[error("could not count reminders referencing job {job_id}: {message}")]
    ReferenceCheck { job_id: String, message: String },

    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}
