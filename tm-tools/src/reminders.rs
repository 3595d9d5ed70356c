use crate::error::{Result, ToolError};
use crate::store::{Reminder, ReminderReferences, ReminderStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tm_jobs::{DeleteOutcome, JobBucketScheduler, JobId, bucket_start};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub struct NewReminder {
    pub owner: String,
    pub message: String,
    pub fire_at: DateTime<Utc>,
    pub todo_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct ReminderRemoval {
    pub reminder: Reminder,
    /// `None` when the bucket job could not be cleaned up; the job is left
    /// in place rather than risk deleting one still in use.
    pub job: Option<DeleteOutcome>,
}

/// Reminder records plus their shared bucket jobs.
#[derive(Clone)]
pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
    scheduler: JobBucketScheduler,
}

impl ReminderService {
    pub fn new(store: Arc<dyn ReminderStore>, scheduler: JobBucketScheduler) -> Self {
        Self { store, scheduler }
    }

    pub fn store(&self) -> &Arc<dyn ReminderStore> {
        &self.store
    }

    /// The record is written before the bucket job is ensured, so a
    /// concurrent removal in the same minute either counts it or runs
    /// before the job is re-created. A failed schedule removes the record.
    pub async fn create(
        &self,
        new: NewReminder,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Reminder> {
        if new.fire_at < now - chrono::Duration::minutes(1) {
            return Err(ToolError::InvalidArguments(format!(
                "reminder time {} is in the past",
                new.fire_at.to_rfc3339()
            )));
        }
        let reminder = self
            .store
            .create(Reminder {
                id: Uuid::new_v4(),
                owner: new.owner,
                message: new.message,
                fire_at: new.fire_at,
                job_id: JobId::for_instant(bucket_start(new.fire_at)),
                todo_id: new.todo_id,
                created_at: now,
            })
            .await?;

        if let Err(e) = self.scheduler.get_or_create_job(reminder.fire_at, cancel).await {
            if let Err(cleanup) = self.store.delete(reminder.id).await {
                tracing::warn!(
                    reminder_id = %reminder.id,
                    error = %cleanup,
                    "reminder record left behind after failed schedule"
                );
            }
            return Err(e.into());
        }
        tracing::info!(
            reminder_id = %reminder.id,
            job_id = %reminder.job_id,
            fire_at = %reminder.fire_at,
            "reminder created"
        );
        Ok(reminder)
    }

    pub async fn get_owned(&self, owner: &str, id: Uuid) -> Result<Reminder> {
        match self.store.get(id).await? {
            Some(reminder) if reminder.owner == owner => Ok(reminder),
            _ => Err(ToolError::NotFound(format!("reminder {id}"))),
        }
    }

    /// Removes the record first so the reference count no longer includes
    /// it, then drops the bucket job if nothing else uses it.
    pub async fn remove(
        &self,
        owner: &str,
        id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<ReminderRemoval> {
        let reminder = self.get_owned(owner, id).await?;
        if !self.store.delete(id).await? {
            return Err(ToolError::NotFound(format!("reminder {id}")));
        }
        let references = ReminderReferences::new(self.store.clone());
        let job = match self
            .scheduler
            .delete_job_if_unused(&reminder.job_id, &references, cancel)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!(
                    reminder_id = %id,
                    job_id = %reminder.job_id,
                    error = %e,
                    "reminder deleted but bucket job cleanup failed"
                );
                None
            }
        };
        Ok(ReminderRemoval { reminder, job })
    }

    /// Detaches the reminder from its to-do; the reminder keeps firing.
    pub async fn unlink(&self, owner: &str, id: Uuid) -> Result<Reminder> {
        let mut reminder = self.get_owned(owner, id).await?;
        reminder.todo_id = None;
        Ok(self.store.update(reminder).await?)
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<Reminder>> {
        Ok(self.store.list(owner).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryReminderStore;
    use async_trait::async_trait;
    use chrono::{Duration, DurationRound};
    use std::sync::Mutex;
    use tm_jobs::InMemoryJobBackend;
    use tokio::sync::oneshot;

    /// Holds the next `create` until released.
    #[derive(Default)]
    struct GatedStore {
        inner: InMemoryReminderStore,
        gate: Mutex<Option<(oneshot::Sender<()>, oneshot::Receiver<()>)>>,
    }

    impl GatedStore {
        /// Returns (entered, release).
        fn arm(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
            let (entered_tx, entered_rx) = oneshot::channel();
            let (release_tx, release_rx) = oneshot::channel();
            *self.gate.lock().expect("gate lock") = Some((entered_tx, release_rx));
            (entered_rx, release_tx)
        }
    }

    #[async_trait]
    impl ReminderStore for GatedStore {
        async fn create(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
            let gate = self.gate.lock().expect("gate lock").take();
            if let Some((entered, release)) = gate {
                let _ = entered.send(());
                let _ = release.await;
            }
            self.inner.create(reminder).await
        }

        async fn get(&self, id: Uuid) -> anyhow::Result<Option<Reminder>> {
            self.inner.get(id).await
        }

        async fn update(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
            self.inner.update(reminder).await
        }

        async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
            self.inner.delete(id).await
        }

        async fn list(&self, owner: &str) -> anyhow::Result<Vec<Reminder>> {
            self.inner.list(owner).await
        }

        async fn get_by_job_id(&self, job_id: &tm_jobs::JobId) -> anyhow::Result<Vec<Reminder>> {
            self.inner.get_by_job_id(job_id).await
        }
    }

    fn service() -> (ReminderService, Arc<InMemoryJobBackend>) {
        let backend = Arc::new(InMemoryJobBackend::new());
        let scheduler = JobBucketScheduler::new(backend.clone());
        (
            ReminderService::new(Arc::new(InMemoryReminderStore::new()), scheduler),
            backend,
        )
    }

    fn next_hour() -> DateTime<Utc> {
        (Utc::now() + Duration::hours(1))
            .duration_trunc(Duration::minutes(1))
            .expect("truncate")
    }

    fn new(owner: &str, fire_at: DateTime<Utc>) -> NewReminder {
        NewReminder {
            owner: owner.to_string(),
            message: "water the plants".to_string(),
            fire_at,
            todo_id: None,
        }
    }

    #[tokio::test]
    async fn shared_bucket_survives_until_last_reminder_removed() {
        let (service, backend) = service();
        let cancel = CancellationToken::new();
        let at = next_hour();

        let first = service.create(new("ana", at), Utc::now(), &cancel).await.expect("first");
        let second = service
            .create(new("ana", at + Duration::seconds(30)), Utc::now(), &cancel)
            .await
            .expect("second");
        assert_eq!(first.job_id, second.job_id);
        assert_eq!(backend.len(), 1);

        let removal = service.remove("ana", first.id, &cancel).await.expect("remove first");
        assert_eq!(removal.job, Some(DeleteOutcome::Retained { references: 1 }));
        assert_eq!(backend.len(), 1);

        let removal = service.remove("ana", second.id, &cancel).await.expect("remove second");
        assert_eq!(removal.job, Some(DeleteOutcome::Deleted));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn other_owners_cannot_touch_a_reminder() {
        let (service, _) = service();
        let cancel = CancellationToken::new();
        let reminder = service.create(new("ana", next_hour()), Utc::now(), &cancel).await.expect("create");
        let err = service
            .remove("bo", reminder.id, &cancel)
            .await
            .expect_err("foreign reminder");
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn past_reminders_are_rejected() {
        let (service, backend) = service();
        let err = service
            .create(
                new("ana", Utc::now() - Duration::hours(2)),
                Utc::now(),
                &CancellationToken::new(),
            )
            .await
            .expect_err("past");
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn removal_racing_a_create_in_the_same_minute_keeps_a_job() {
        let backend = Arc::new(InMemoryJobBackend::new());
        let store = Arc::new(GatedStore::default());
        let service = ReminderService::new(store.clone(), JobBucketScheduler::new(backend.clone()));
        let cancel = CancellationToken::new();
        let at = next_hour();

        let first = service.create(new("ana", at), Utc::now(), &cancel).await.expect("first");
        assert_eq!(backend.len(), 1);

        let (entered, release) = store.arm();
        let racing = {
            let service = service.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                service
                    .create(new("bo", at + Duration::seconds(40)), Utc::now(), &cancel)
                    .await
            })
        };
        entered.await.expect("second create reached the store");

        let removal = service.remove("ana", first.id, &cancel).await.expect("remove first");
        assert_eq!(removal.job, Some(DeleteOutcome::Deleted));
        release.send(()).expect("release");

        let second = racing.await.expect("join").expect("second");
        assert_eq!(second.job_id, first.job_id);
        assert!(backend.get(&second.job_id).is_some(), "live reminder lost its job");
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn failed_schedule_removes_the_record() {
        let store = Arc::new(InMemoryReminderStore::new());
        let service = ReminderService::new(
            store.clone(),
            JobBucketScheduler::new(Arc::new(InMemoryJobBackend::new())),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = service
            .create(new("ana", next_hour()), Utc::now(), &cancel)
            .await
            .expect_err("cancelled schedule");
        assert!(matches!(err, ToolError::Cancelled));
        assert!(store.list("ana").await.expect("list").is_empty());
    }
}
