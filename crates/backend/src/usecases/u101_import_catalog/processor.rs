use async_trait::async_trait;
use contracts::domain::a001_product::ProductFields;
use contracts::usecases::u101_import_catalog::ImportResult;
use std::collections::HashSet;
use std::sync::Arc;

use super::catalog_api_client::CatalogSource;
use super::change_detection::{has_changes, to_product_fields};
use crate::domain::a001_product::ProductStore;
use crate::shared::error::AppError;
use crate::system::queue::{JobContext, JobProcessor, JobRecord, ProgressSink};

/// Имя задачи сверки каталога в очереди
pub const IMPORT_JOB_NAME: &str = "import-products";

// ============================================================================
// Batch report
// ============================================================================

/// Итог обработки одного товара
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Товар уже удален кем-то другим
    Vanished,
    Failed { external_id: i64, message: String },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchReport {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub failures: Vec<String>,
}

impl BatchReport {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Deleted => self.deleted += 1,
            ItemOutcome::Vanished => {}
            ItemOutcome::Failed {
                external_id,
                message,
            } => self
                .failures
                .push(format!("Product {}: {}", external_id, message)),
        }
    }

    pub fn into_result(self, processed_items: u64, total_items: u64) -> ImportResult {
        ImportResult {
            processed_items,
            total_items,
            deleted_items: self.deleted,
            errors: self.failures,
        }
    }
}

/// floor(processed / total * 100)
pub fn progress_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (processed.min(total) * 100 / total) as u8
}

// ============================================================================
// Reconciler
// ============================================================================

/// Сверка локального каталога с внешним снимком (fetch, diff, apply)
pub struct CatalogReconciler {
    source: Arc<dyn CatalogSource>,
    store: Arc<dyn ProductStore>,
}

impl CatalogReconciler {
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn ProductStore>) -> Self {
        Self { source, store }
    }

    /// Один полный проход сверки.
    ///
    /// Ошибка загрузки снимка, списка id или создания/обновления товара
    /// прерывает проход целиком; ошибки удаления собираются в отчет.
    pub async fn reconcile(&self, progress: &dyn ProgressSink) -> Result<ImportResult, AppError> {
        let snapshot = self.source.fetch_catalog().await?;
        let total = snapshot.products.len() as u64;
        tracing::info!(
            "Catalog snapshot fetched: {} items (remote total {})",
            total,
            snapshot.total
        );

        let stored_ids = self.store.list_all_external_ids().await?;
        let remote_ids: HashSet<i64> = snapshot.products.iter().map(|p| p.id).collect();

        let mut report = BatchReport::default();

        for external_id in stored_ids.into_iter().filter(|id| !remote_ids.contains(id)) {
            let outcome = self.delete_item(external_id).await;
            if let ItemOutcome::Failed { message, .. } = &outcome {
                tracing::warn!("Failed to delete product {}: {}", external_id, message);
            }
            report.record(outcome);
        }

        let mut processed = 0u64;
        for item in &snapshot.products {
            let fields = to_product_fields(item);
            let outcome = self.upsert_item(&fields).await?;
            report.record(outcome);

            processed += 1;
            progress.report(progress_percent(processed, total)).await;
        }

        tracing::info!(
            "Reconciliation finished: {} created, {} updated, {} unchanged, {} deleted, {} failed",
            report.created,
            report.updated,
            report.unchanged,
            report.deleted,
            report.failures.len()
        );
        Ok(report.into_result(processed, total))
    }

    async fn delete_item(&self, external_id: i64) -> ItemOutcome {
        let failed = |e: AppError| ItemOutcome::Failed {
            external_id,
            message: e.to_string(),
        };

        let product = match self.store.find_by_external_id(external_id).await {
            Ok(Some(product)) => product,
            Ok(None) => return ItemOutcome::Vanished,
            Err(e) => return failed(e),
        };
        match self.store.remove(product.id).await {
            Ok(()) => ItemOutcome::Deleted,
            Err(AppError::NotFound(_)) => ItemOutcome::Vanished,
            Err(e) => failed(e),
        }
    }

    async fn upsert_item(&self, fields: &ProductFields) -> Result<ItemOutcome, AppError> {
        match self.store.find_by_external_id(fields.external_id).await? {
            None => {
                self.store.create(fields).await?;
                Ok(ItemOutcome::Created)
            }
            Some(existing) if has_changes(&existing, fields) => {
                self.store.update(existing.id, fields).await?;
                Ok(ItemOutcome::Updated)
            }
            Some(_) => Ok(ItemOutcome::Unchanged),
        }
    }
}

/// Обработчик задачи `import-products`
pub struct ImportCatalogProcessor {
    reconciler: CatalogReconciler,
}

impl ImportCatalogProcessor {
    pub fn new(source: Arc<dyn CatalogSource>, store: Arc<dyn ProductStore>) -> Self {
        Self {
            reconciler: CatalogReconciler::new(source, store),
        }
    }
}

#[async_trait]
impl JobProcessor for ImportCatalogProcessor {
    fn job_name(&self) -> &'static str {
        IMPORT_JOB_NAME
    }

    async fn process(
        &self,
        job: &JobRecord,
        ctx: &JobContext,
    ) -> Result<serde_json::Value, AppError> {
        tracing::info!("Starting catalog reconciliation for job {}", job.id);
        let result = self.reconciler.reconcile(ctx).await?;
        serde_json::to_value(&result).map_err(|e| AppError::Unknown(e.to_string()))
    }
}
