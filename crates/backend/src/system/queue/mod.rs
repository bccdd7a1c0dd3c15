//! Durable job queue with retries and backoff.
//!
//! Each queue instance is bound to one queue name and runs at most one
//! active job at a time. Time is passed in explicitly so callers (and
//! tests) control when delayed jobs become due.

pub mod job;
pub mod memory;
pub mod sqlite;
pub mod worker;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::shared::error::AppError;

pub use job::{Backoff, JobOptions, JobRecord, JobState};
pub use memory::InMemoryJobQueue;
pub use sqlite::SqliteJobQueue;
pub use worker::{JobContext, JobProcessor, ProgressSink, QueueWorker};

#[async_trait]
pub trait JobQueue: Send + Sync {
    fn queue_name(&self) -> &str;

    /// Ставит задачу в waiting
    async fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        options: JobOptions,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError>;

    async fn get_job(&self, id: &str) -> Result<Option<JobRecord>, AppError>;

    /// Задачи в указанных состояниях, новые первыми
    async fn get_jobs(&self, states: &[JobState]) -> Result<Vec<JobRecord>, AppError>;

    /// Атомарно захватывает самую старую готовую задачу.
    ///
    /// Возвращает `None`, если готовых задач нет или другая задача уже active.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<JobRecord>, AppError>;

    async fn report_progress(
        &self,
        id: &str,
        token: &str,
        percent: u8,
        now: DateTime<Utc>,
    ) -> Result<(), AppError>;

    async fn complete(
        &self,
        id: &str,
        token: &str,
        result: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError>;

    async fn fail(
        &self,
        id: &str,
        token: &str,
        reason: &str,
        retryable: bool,
        now: DateTime<Utc>,
    ) -> Result<JobRecord, AppError>;

    /// Переводит зависшие active-задачи через обычный путь fail
    async fn recover_stalled(&self, now: DateTime<Utc>) -> Result<Vec<JobRecord>, AppError>;

    /// Удаляет завершенные задачи с истекшим сроком хранения
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    async fn remove(&self, id: &str) -> Result<bool, AppError>;
}

pub(crate) const STALLED_REASON: &str = "job stalled";
