use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn};

use super::job::JobRecord;
use super::JobQueue;
use crate::shared::error::AppError;

/// Обработчик задач одного типа (по имени задачи)
#[async_trait]
pub trait JobProcessor: Send + Sync {
    fn job_name(&self) -> &'static str;

    /// Выполняет задачу; результат сохраняется как return value
    async fn process(&self, job: &JobRecord, ctx: &JobContext)
        -> Result<serde_json::Value, AppError>;
}

/// Получатель отчетов о прогрессе (0..=100)
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, percent: u8);
}

/// Контекст выполнения: часы задачи и отчет о прогрессе.
///
/// Отчеты уходят в отдельную задачу записи и не ждут хранилища.
pub struct JobContext {
    progress: mpsc::UnboundedSender<(u8, DateTime<Utc>)>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl JobContext {
    /// Контекст и задача записи прогресса, которая пишет отчеты по порядку
    fn start(
        queue: Arc<dyn JobQueue>,
        job_id: String,
        token: String,
        started_at: DateTime<Utc>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<(u8, DateTime<Utc>)>();
        let writer = tokio::spawn(async move {
            while let Some((percent, at)) = rx.recv().await {
                tracing::debug!("Job {} progress {}%", job_id, percent);
                if let Err(e) = queue.report_progress(&job_id, &token, percent, at).await {
                    warn!("Failed to record progress {}% for job {}: {}", percent, job_id, e);
                }
            }
        });
        let ctx = Self {
            progress: tx,
            started_at,
            started: Instant::now(),
        };
        (ctx, writer)
    }

    /// Время на часах воркера: момент захвата плюс прошедшее время
    pub fn now(&self) -> DateTime<Utc> {
        self.started_at + Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero())
    }

    /// Ставит отчет в очередь записи; ошибка записи не прерывает задачу
    pub fn report_progress(&self, percent: u8) {
        if self.progress.send((percent, self.now())).is_err() {
            warn!("Progress writer is gone, dropping {}% report", percent);
        }
    }
}

#[async_trait]
impl ProgressSink for JobContext {
    async fn report(&self, percent: u8) {
        self.report_progress(percent);
    }
}

/// Фоновый воркер очереди. Обрабатывает задачи строго по одной.
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    processors: HashMap<String, Arc<dyn JobProcessor>>,
    poll_interval: std::time::Duration,
}

impl QueueWorker {
    pub fn new(queue: Arc<dyn JobQueue>, poll_interval: std::time::Duration) -> Self {
        Self {
            queue,
            processors: HashMap::new(),
            poll_interval,
        }
    }

    /// Регистрирует обработчик по имени задачи.
    pub fn register(&mut self, processor: Arc<dyn JobProcessor>) {
        self.processors
            .insert(processor.job_name().to_string(), processor);
    }

    /// Запускает цикл опроса очереди.
    pub async fn run_loop(&self) {
        info!(
            "Queue worker for '{}' started with poll interval {:?}",
            self.queue.queue_name(),
            self.poll_interval
        );
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.process_next(Utc::now()).await {
                error!("Error processing queue '{}': {}", self.queue.queue_name(), e);
            }
        }
    }

    /// Один такт: восстановить зависшие, удалить устаревшие, выполнить следующую.
    ///
    /// Возвращает итоговую запись задачи, если задача была выполнена.
    pub async fn process_next(&self, now: DateTime<Utc>) -> Result<Option<JobRecord>, AppError> {
        // Сбой обслуживания не мешает взять следующую задачу
        match self.queue.recover_stalled(now).await {
            Ok(recovered) => {
                for job in recovered {
                    warn!("Job {} stalled and was moved to {}", job.id, job.state);
                }
            }
            Err(e) => warn!("Stalled job recovery failed: {}", e),
        }
        match self.queue.purge_expired(now).await {
            Ok(0) => {}
            Ok(purged) => info!("Removed {} expired completed jobs", purged),
            Err(e) => warn!("Purging expired jobs failed: {}", e),
        }

        let Some(job) = self.queue.claim_next(now).await? else {
            return Ok(None);
        };
        let token = job.lock_token.clone().ok_or_else(|| {
            AppError::Unknown(format!("claimed job {} has no lock token", job.id))
        })?;
        let (ctx, writer) =
            JobContext::start(Arc::clone(&self.queue), job.id.clone(), token.clone(), now);

        info!(
            "Processing job {} ({}), attempt {} of {}",
            job.id,
            job.name,
            job.attempts_made + 1,
            job.options.attempts
        );

        let outcome = match self.processors.get(&job.name) {
            Some(processor) => processor.process(&job, &ctx).await,
            None => Err(AppError::Configuration(format!(
                "No processor registered for job '{}'",
                job.name
            ))),
        };

        // Все отчеты о прогрессе записаны до финального перехода
        let finished_at = ctx.now();
        drop(ctx);
        if let Err(e) = writer.await {
            warn!("Progress writer for job {} stopped abnormally: {}", job.id, e);
        }

        let finished = match outcome {
            Ok(result) => {
                let record = self.queue.complete(&job.id, &token, result, finished_at).await?;
                info!("Job {} completed", record.id);
                record
            }
            Err(e) => {
                let record = self
                    .queue
                    .fail(&job.id, &token, &e.to_string(), e.is_retryable(), finished_at)
                    .await?;
                match record.delay_until {
                    Some(retry_at) => warn!(
                        "Job {} failed (attempt {}), retrying at {}: {}",
                        record.id, record.attempts_made, retry_at, e
                    ),
                    None => error!(
                        "Job {} failed permanently after {} attempts: {}",
                        record.id, record.attempts_made, e
                    ),
                }
                record
            }
        };
        Ok(Some(finished))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::queue::contract_tests::{import_options, now_ms};
    use crate::system::queue::{InMemoryJobQueue, JobState};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Падает заданное число раз, затем успешно завершается
    struct FlakyProcessor {
        failures: u32,
        calls: AtomicU32,
        error: AppError,
    }

    #[async_trait]
    impl JobProcessor for FlakyProcessor {
        fn job_name(&self) -> &'static str {
            "import-products"
        }

        async fn process(
            &self,
            _job: &JobRecord,
            ctx: &JobContext,
        ) -> Result<serde_json::Value, AppError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.report_progress(50);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(serde_json::json!({"call": call}))
        }
    }

    fn setup(failures: u32, error: AppError) -> (Arc<InMemoryJobQueue>, QueueWorker) {
        let queue = Arc::new(InMemoryJobQueue::new("product-import", Duration::seconds(30)));
        let mut worker = QueueWorker::new(queue.clone(), std::time::Duration::from_millis(10));
        worker.register(Arc::new(FlakyProcessor {
            failures,
            calls: AtomicU32::new(0),
            error,
        }));
        (queue, worker)
    }

    async fn enqueue(queue: &InMemoryJobQueue, name: &str, now: DateTime<Utc>) -> JobRecord {
        queue
            .enqueue(name, serde_json::json!({}), import_options(), now)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_idle_tick_returns_none() {
        let (_, worker) = setup(0, AppError::Unknown("x".into()));
        assert!(worker.process_next(Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (queue, worker) = setup(1, AppError::ExternalFetch("timeout".into()));
        let t0 = now_ms();
        let job = enqueue(&queue, "import-products", t0).await;

        let first = worker.process_next(t0).await.unwrap().unwrap();
        assert_eq!(first.state, JobState::Delayed);
        assert_eq!(first.failed_reason.as_deref(), Some("External fetch error: timeout"));

        // Еще идет задержка
        assert!(worker.process_next(t0).await.unwrap().is_none());

        let second = worker
            .process_next(t0 + Duration::seconds(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.id, job.id);
        assert_eq!(second.state, JobState::Completed);
        assert_eq!(second.attempts_made, 2);
        assert_eq!(second.return_value, Some(serde_json::json!({"call": 1})));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_at_once() {
        let (queue, worker) = setup(5, AppError::Configuration("missing url".into()));
        enqueue(&queue, "import-products", now_ms()).await;

        let record = worker.process_next(now_ms()).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_unknown_job_name_fails() {
        let (queue, worker) = setup(0, AppError::Unknown("x".into()));
        enqueue(&queue, "reindex", now_ms()).await;

        let record = worker.process_next(now_ms()).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Failed);
        assert!(record
            .failed_reason
            .unwrap()
            .contains("No processor registered for job 'reindex'"));
    }

    /// Сообщает прогресс и ждет, пока запись дойдет до очереди
    struct ObservingProcessor {
        queue: Arc<InMemoryJobQueue>,
    }

    #[async_trait]
    impl JobProcessor for ObservingProcessor {
        fn job_name(&self) -> &'static str {
            "import-products"
        }

        async fn process(
            &self,
            job: &JobRecord,
            ctx: &JobContext,
        ) -> Result<serde_json::Value, AppError> {
            for percent in [10, 20, 30] {
                ctx.report_progress(percent);
            }
            for _ in 0..200 {
                let stored = self.queue.get_job(&job.id).await?.map(|j| j.progress);
                if stored == Some(30) {
                    return Ok(serde_json::json!({"seen": 30}));
                }
                time::sleep(std::time::Duration::from_millis(5)).await;
            }
            Err(AppError::Unknown("progress never reached the queue".into()))
        }
    }

    #[tokio::test]
    async fn test_progress_is_written_in_background() {
        let queue = Arc::new(InMemoryJobQueue::new("product-import", Duration::seconds(30)));
        let mut worker = QueueWorker::new(queue.clone(), std::time::Duration::from_millis(10));
        worker.register(Arc::new(ObservingProcessor {
            queue: queue.clone(),
        }));
        enqueue(&queue, "import-products", now_ms()).await;

        let record = worker.process_next(now_ms()).await.unwrap().unwrap();
        assert_eq!(record.state, JobState::Completed);
        assert_eq!(record.return_value, Some(serde_json::json!({"seen": 30})));
        assert_eq!(record.progress, 100);
    }
}
