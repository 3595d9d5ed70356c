use crate::backend::{JobReferences, ScheduleOutcome, SchedulingBackend};
use crate::bucket::{JobId, bucket_start};
use crate::error::{Result, SchedulingError};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_JOB_NAMESPACE: &str = "reminders";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// At least one reminder still points at the job.
    Retained { references: usize },
    Deleted,
    /// Nothing referenced the job and the backend no longer had it.
    AlreadyGone,
}

/// Maps reminder instants onto shared per-minute jobs.
///
/// Creation is check-then-act without a lock: the deterministic id turns a
/// lost race into a duplicate, which counts as success. Deletion only
/// happens after a successful reference query reports zero; when in doubt
/// the job is left behind.
#[derive(Clone)]
pub struct JobBucketScheduler {
    backend: Arc<dyn SchedulingBackend>,
    namespace: String,
}

impl JobBucketScheduler {
    pub fn new(backend: Arc<dyn SchedulingBackend>) -> Self {
        Self::with_namespace(backend, DEFAULT_JOB_NAMESPACE)
    }

    pub fn with_namespace(backend: Arc<dyn SchedulingBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[tracing::instrument(level = "debug", skip_all, fields(requested_at = %target))]
    pub async fn get_or_create_job(
        &self,
        target: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<JobId> {
        let bucket = bucket_start(target);
        let job_id = JobId::for_instant(bucket);

        let exists = race(cancel, "job lookup", self.backend.exists(&job_id))
            .await?
            .map_err(|e| backend_error("exists", &job_id, e))?;
        if exists {
            tracing::debug!(job_id = %job_id, bucket = %bucket, "reusing bucket job");
            return Ok(job_id);
        }

        let scheduled = race(
            cancel,
            "job scheduling",
            self.backend.schedule(&self.namespace, &job_id, bucket),
        )
        .await?;
        match scheduled {
            Ok(ScheduleOutcome::Created) => {
                tracing::info!(
                    job_id = %job_id,
                    bucket = %bucket,
                    namespace = %self.namespace,
                    "scheduled bucket job"
                );
            }
            Ok(ScheduleOutcome::AlreadyScheduled) => {
                tracing::debug!(job_id = %job_id, bucket = %bucket, "bucket job created concurrently");
            }
            Err(schedule_err) => {
                // A concurrent creator may have won and the backend rejected ours.
                let exists_now = race(cancel, "job lookup", self.backend.exists(&job_id))
                    .await?
                    .unwrap_or(false);
                if !exists_now {
                    return Err(backend_error("schedule", &job_id, schedule_err));
                }
                tracing::debug!(
                    job_id = %job_id,
                    error = %schedule_err,
                    "schedule failed but job exists; treating as duplicate"
                );
            }
        }
        Ok(job_id)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(job_id = %job_id))]
    pub async fn delete_job_if_unused(
        &self,
        job_id: &JobId,
        references: &dyn JobReferences,
        cancel: &CancellationToken,
    ) -> Result<DeleteOutcome> {
        let count = race(cancel, "reference check", references.reference_count(job_id))
            .await?
            .map_err(|e| SchedulingError::ReferenceCheck {
                job_id: job_id.to_string(),
                message: format!("{e:#}"),
            })?;
        if count > 0 {
            tracing::debug!(references = count, "bucket job still referenced");
            return Ok(DeleteOutcome::Retained { references: count });
        }

        let removed = race(cancel, "job deletion", self.backend.delete(job_id))
            .await?
            .map_err(|e| backend_error("delete", job_id, e))?;
        if removed {
            tracing::info!("deleted unused bucket job");
            Ok(DeleteOutcome::Deleted)
        } else {
            tracing::debug!("bucket job already gone");
            Ok(DeleteOutcome::AlreadyGone)
        }
    }
}

async fn race<T>(
    cancel: &CancellationToken,
    operation: &'static str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<anyhow::Result<T>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(SchedulingError::Cancelled { operation }),
        out = fut => Ok(out),
    }
}

fn backend_error(operation: &'static str, job_id: &JobId, err: anyhow::Error) -> SchedulingError {
    SchedulingError::Backend {
        operation,
        job_id: job_id.to_string(),
        message: format!("{err:#}"),
    }
}
