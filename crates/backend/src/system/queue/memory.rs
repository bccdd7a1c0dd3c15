use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

use super::job::{JobOptions, JobRecord, JobState};
use super::{JobQueue, STALLED_REASON};
use crate::shared::error::AppError;

/// Очередь в памяти процесса (тесты и запуск без БД)
pub struct InMemoryJobQueue {
    name: String,
    lock_duration: Duration,
    jobs: Mutex<Vec<JobRecord>>,
}

impl InMemoryJobQueue {
    pub fn new(name: impl Into<String>, lock_duration: Duration) -> Self {
        Self {
            name: name.into(),
            lock_duration,
            jobs: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<JobRecord>>, AppError> {
        self.jobs
            .lock()
            .map_err(|_| AppError::Unknown("job queue mutex poisoned".to_string()))
    }

    fn not_found(id: &str) -> AppError {
        AppError::NotFound(format!("Job with ID {} not found", id))
    }

    /// Применяет переход к задаче по id, удаляя ее, если политика хранения это требует
    fn transition(
        &self,
        id: &str,
        apply: impl FnOnce(&mut JobRecord) -> Result<(), AppError>,
    ) -> Result<JobRecord, AppError> {
        let mut jobs = self.lock()?;
        let index = jobs
            .iter()
            .position(|j| j.id == id)
            .ok_or_else(|| Self::not_found(id))?;
        apply(&mut jobs[index])?;
        let job = jobs[index].clone();
        if job.state == JobState::Failed && job.options.remove_on_fail {
            jobs.remove(index);
        }
        Ok(job)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        let job = JobRecord::new(&self.name, name, payload, options, now);
        self.lock()?.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, AppError> {
        Ok(self.lock()?.iter().find(|j| j.id == id).cloned())
    }

    async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<JobRecord>, AppError> {
        let mut result: Vec<JobRecord> = self
            .lock()?
            .iter()
            .filter(|j| states.contains(&j.state))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<JobRecord>, AppError> {
        let mut jobs = self.lock()?;
        if jobs.iter().any(|j| j.state == JobState::Active) {
            return Ok(None);
        }
        let next = jobs
            .iter_mut()
            .filter(|j| j.is_ready(now))
            .min_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(next.map(|job| {
            job.claim(now, self.lock_duration);
            job.clone()
        }))
    }

    async fn report_progress(
        &self,
        id: &str,
        token: &str,
        percent: u8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let lock_duration = self.lock_duration;
        self.transition(id, |job| {
            job.report_progress(token, percent, now, lock_duration)
        })
        .map(|_| ())
    }

    async fn complete(
        &self,
        id: &str,
        token: &str,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        self.transition(id, |job| job.complete(token, result, now))
    }

    async fn fail(
        &self,
        id: &str,
        token: &str,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError> {
        self.transition(id, |job| job.fail(Some(token), reason, retryable, now))
    }

    async fn recover_stalled(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, AppError> {
        let stalled: Vec<String> = self
            .lock()?
            .iter()
            .filter(|j| j.is_stalled(now))
            .map(|j| j.id.clone())
            .collect();

        let mut recovered = Vec::with_capacity(stalled.len());
        for id in stalled {
            recovered.push(self.transition(&id, |job| job.fail(None, STALLED_REASON, true, now))?);
        }
        Ok(recovered)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut jobs = self.lock()?;
        let before = jobs.len();
        jobs.retain(|j| !j.is_expired(now));
        Ok((before - jobs.len()) as u64)
    }

    async fn remove(&self, id: &str) -> Result<bool, AppError> {
        let mut jobs = self.lock()?;
        let before = jobs.len();
        jobs.retain(|j| j.id != id);
        Ok(jobs.len() != before)
    }
}
