use crate::bucket::JobId;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Created,
    /// Someone else scheduled the same bucket first.
    AlreadyScheduled,
}

/// Where bucket jobs actually live (a job queue, a cron service, memory).
#[async_trait]
pub trait SchedulingBackend: Send + Sync {
    async fn exists(&self, job_id: &JobId) -> Result<bool>;

    async fn schedule(
        &self,
        namespace: &str,
        job_id: &JobId,
        trigger_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome>;

    /// Returns whether a job was removed.
    async fn delete(&self, job_id: &JobId) -> Result<bool>;
}

/// Live view of how many reminders still point at a job.
#[async_trait]
pub trait JobReferences: Send + Sync {
    async fn reference_count(&self, job_id: &JobId) -> Result<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledJob {
    pub job_id: JobId,
    pub namespace: String,
    pub trigger_at: DateTime<Utc>,
}

/// Process-local backend. Jobs are fired by polling [`take_due`].
///
/// [`take_due`]: InMemoryJobBackend::take_due
#[derive(Debug, Default)]
pub struct InMemoryJobBackend {
    jobs: DashMap<JobId, ScheduledJob>,
}

impl InMemoryJobBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, job_id: &JobId) -> Option<ScheduledJob> {
        self.jobs.get(job_id).map(|entry| entry.value().clone())
    }

    /// Removes and returns every job due at or before `now`, oldest first.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledJob> {
        let due_ids: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| entry.value().trigger_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        let mut due: Vec<ScheduledJob> = due_ids
            .iter()
            .filter_map(|id| self.jobs.remove(id).map(|(_, job)| job))
            .collect();
        due.sort_by_key(|job| job.trigger_at);
        due
    }
}

#[async_trait]
impl SchedulingBackend for InMemoryJobBackend {
    async fn exists(&self, job_id: &JobId) -> Result<bool> {
        Ok(self.jobs.contains_key(job_id))
    }

    async fn schedule(
        &self,
        namespace: &str,
        job_id: &JobId,
        trigger_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome> {
        match self.jobs.entry(job_id.clone()) {
            Entry::Occupied(_) => Ok(ScheduleOutcome::AlreadyScheduled),
            Entry::Vacant(slot) => {
                slot.insert(ScheduledJob {
                    job_id: job_id.clone(),
                    namespace: namespace.to_string(),
                    trigger_at,
                });
                Ok(ScheduleOutcome::Created)
            }
        }
    }

    async fn delete(&self, job_id: &JobId) -> Result<bool> {
        Ok(self.jobs.remove(job_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn second_schedule_reports_duplicate() {
        let backend = InMemoryJobBackend::new();
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).single().expect("instant");
        let id = JobId::for_instant(at);
        assert_eq!(
            backend.schedule("reminders", &id, at).await.expect("first"),
            ScheduleOutcome::Created
        );
        assert_eq!(
            backend.schedule("reminders", &id, at).await.expect("second"),
            ScheduleOutcome::AlreadyScheduled
        );
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn take_due_drains_in_trigger_order() {
        let backend = InMemoryJobBackend::new();
        let base = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).single().expect("instant");
        for minutes in [5, 1, 30] {
            let at = base + Duration::minutes(minutes);
            backend
                .schedule("reminders", &JobId::for_instant(at), at)
                .await
                .expect("schedule");
        }

        let due = backend.take_due(base + Duration::minutes(10));
        let triggers: Vec<_> = due.iter().map(|job| job.trigger_at).collect();
        assert_eq!(triggers, vec![base + Duration::minutes(1), base + Duration::minutes(5)]);
        assert_eq!(backend.len(), 1);
        assert!(backend.take_due(base).is_empty());
    }
}
