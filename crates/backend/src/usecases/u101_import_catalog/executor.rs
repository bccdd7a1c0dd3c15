use super::catalog_api_client::CatalogSource;
use super::processor::IMPORT_JOB_NAME;
use super::status;
use crate::shared::config::QueueConfig;
use crate::shared::error::AppError;
use crate::system::queue::{Backoff, JobOptions, JobQueue, JobRecord};
use chrono::Utc;
use contracts::usecases::u101_import_catalog::{
    ImportJobState, ImportResponse, ImportStartStatus, ImportStatus,
};
use std::sync::Arc;

/// Параметры задачи импорта: попытки, backoff и срок хранения из конфига
pub fn import_job_options(config: &QueueConfig) -> JobOptions {
    JobOptions {
        attempts: config.attempts,
        backoff: Backoff::Exponential {
            delay: config.backoff_delay_ms,
        },
        remove_on_complete: Some(config.remove_on_complete_secs),
        remove_on_fail: false,
    }
}

/// Executor для UseCase импорта каталога
#[derive(Clone)]
pub struct ImportExecutor {
    source: Arc<dyn CatalogSource>,
    queue: Arc<dyn JobQueue>,
    options: JobOptions,
}

impl ImportExecutor {
    pub fn new(source: Arc<dyn CatalogSource>, queue: Arc<dyn JobQueue>, options: JobOptions) -> Self {
        Self {
            source,
            queue,
            options,
        }
    }

    /// Пробный запрос к каталогу, затем постановка задачи в очередь.
    /// При ошибке пробного запроса задача не создается.
    pub async fn start_import(&self) -> Result<ImportResponse, AppError> {
        let probe = self.source.fetch_catalog().await?;

        let now = Utc::now();
        let job = self
            .queue
            .enqueue(
                IMPORT_JOB_NAME,
                serde_json::json!({ "timestamp": now.to_rfc3339() }),
                self.options.clone(),
                now,
            )
            .await?;
        tracing::info!(
            "Import job {} enqueued (catalog reports {} items)",
            job.id,
            probe.total
        );

        Ok(ImportResponse {
            job_id: job.id,
            status: ImportStartStatus::Started,
            started_at: now,
            total_items: probe.total,
            skip: probe.skip,
            limit: probe.limit,
            items: probe.products,
        })
    }

    pub async fn get_import_status(&self, job_id: &str) -> Result<ImportStatus, AppError> {
        let job = self
            .queue
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job with ID {} not found", job_id)))?;
        Ok(status::project(&job, Utc::now()))
    }

    /// waiting, active, delayed
    pub async fn get_active_imports(&self) -> Result<Vec<ImportStatus>, AppError> {
        self.list(&ImportJobState::ACTIVE_SET).await
    }

    /// completed, failed
    pub async fn get_import_history(&self) -> Result<Vec<ImportStatus>, AppError> {
        self.list(&ImportJobState::HISTORY_SET).await
    }

    async fn list(&self, states: &[ImportJobState]) -> Result<Vec<ImportStatus>, AppError> {
        let now = Utc::now();
        let jobs: Vec<JobRecord> = self.queue.get_jobs(&status::queue_states(states)).await?;
        Ok(jobs.iter().map(|job| status::project(job, now)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_product::store::testing::InMemoryProductStore;
    use crate::system::queue::contract_tests::now_ms;
    use crate::system::queue::{InMemoryJobQueue, QueueWorker};
    use crate::usecases::u101_import_catalog::processor::tests::{item, FakeSource};
    use crate::usecases::u101_import_catalog::ImportCatalogProcessor;
    use chrono::Duration;

    struct Harness {
        source: Arc<FakeSource>,
        store: Arc<InMemoryProductStore>,
        executor: ImportExecutor,
        worker: QueueWorker,
    }

    fn harness(source: FakeSource) -> Harness {
        let source = Arc::new(source);
        let store = Arc::new(InMemoryProductStore::new());
        let queue = Arc::new(InMemoryJobQueue::new("product-import", Duration::seconds(30)));
        let options = JobOptions {
            attempts: 3,
            backoff: Backoff::Exponential { delay: 1000 },
            remove_on_complete: Some(24 * 3600),
            remove_on_fail: false,
        };
        let executor = ImportExecutor::new(source.clone(), queue.clone(), options);
        let mut worker = QueueWorker::new(queue, std::time::Duration::from_millis(10));
        worker.register(Arc::new(ImportCatalogProcessor::new(source.clone(), store.clone())));
        Harness {
            source,
            store,
            executor,
            worker,
        }
    }

    #[test]
    fn test_job_options_from_config() {
        let config = crate::shared::config::parse_config("").unwrap().queue;
        let options = import_job_options(&config);
        assert_eq!(options.attempts, 3);
        assert_eq!(options.backoff, Backoff::Exponential { delay: 1000 });
        assert_eq!(options.remove_on_complete, Some(86400));
        assert!(!options.remove_on_fail);
    }

    #[tokio::test]
    async fn test_start_import_returns_probe_totals() {
        let h = harness(FakeSource::with_items(vec![item(1, "A", 1.0), item(2, "B", 2.0)]));

        let response = h.executor.start_import().await.unwrap();
        assert_eq!(response.status, ImportStartStatus::Started);
        assert_eq!(response.total_items, 2);
        assert_eq!(response.items.len(), 2);

        let status = h.executor.get_import_status(&response.job_id).await.unwrap();
        assert_eq!(status.status, ImportJobState::Waiting);
        assert_eq!(h.executor.get_active_imports().await.unwrap().len(), 1);
        assert!(h.store.external_ids().is_empty());
    }

    #[tokio::test]
    async fn test_probe_failure_enqueues_nothing() {
        let h = harness(FakeSource::failing(AppError::ExternalFetch("timeout".into())));

        let err = h.executor.start_import().await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFetch(_)));
        assert!(h.executor.get_active_imports().await.unwrap().is_empty());
        assert!(h.executor.get_import_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let h = harness(FakeSource::with_items(Vec::new()));
        let err = h.executor.get_import_status("nope").await.unwrap_err();
        assert_eq!(err, AppError::NotFound("Job with ID nope not found".into()));
    }

    #[tokio::test]
    async fn test_completed_import_reports_counts() {
        let h = harness(FakeSource::with_items(vec![item(1, "A", 1.0), item(2, "B", 2.0)]));
        let response = h.executor.start_import().await.unwrap();

        h.worker.process_next(Utc::now()).await.unwrap().unwrap();

        let status = h.executor.get_import_status(&response.job_id).await.unwrap();
        assert_eq!(status.status, ImportJobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.processed_items, 2);
        assert_eq!(status.total_items, 2);
        assert_eq!(status.deleted_items, 0);
        assert!(status.finished_at.is_some());
        assert_eq!(h.store.external_ids(), vec![1, 2]);

        let history = h.executor.get_import_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(h.executor.get_active_imports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_timeouts_exhaust_retries() {
        let h = harness(FakeSource::with_items(vec![item(1, "A", 1.0)]));
        let response = h.executor.start_import().await.unwrap();
        h.source.set_error(AppError::ExternalFetch("request timed out".into()));

        let t0 = now_ms();
        let first = h.worker.process_next(t0).await.unwrap().unwrap();
        let retry_at = first.delay_until.unwrap();
        assert!(retry_at - t0 >= Duration::milliseconds(1000));
        assert!(h.worker.process_next(t0).await.unwrap().is_none());

        let t1 = retry_at;
        let second = h.worker.process_next(t1).await.unwrap().unwrap();
        let retry_at = second.delay_until.unwrap();
        assert!(retry_at - t1 >= Duration::milliseconds(2000));

        let status = h.executor.get_import_status(&response.job_id).await.unwrap();
        assert_eq!(status.status, ImportJobState::Delayed);

        let third = h.worker.process_next(retry_at).await.unwrap().unwrap();
        assert_eq!(third.attempts_made, 3);

        let status = h.executor.get_import_status(&response.job_id).await.unwrap();
        assert_eq!(status.status, ImportJobState::Failed);
        assert_eq!(
            status.error.as_deref(),
            Some("External fetch error: request timed out")
        );
        assert!(status.finished_at.is_some());
        assert!(h.store.external_ids().is_empty());
    }
}
