use std::net::SocketAddr;
use std::sync::Arc;

use backend::domain::a001_product::{ProductStore, SeaOrmProductStore};
use backend::shared::{config, data::db};
use backend::system::queue::{JobQueue, QueueWorker, SqliteJobQueue};
use backend::usecases::u101_import_catalog::{
    import_job_options, CatalogApiClient, CatalogSource, ImportCatalogProcessor, ImportExecutor,
};
use backend::{routes, system, AppState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    system::tracing::initialize()?;

    // Конфигурация (config.toml рядом с exe + переменные окружения)
    let config = config::load_config()?;

    let db_path = config::get_database_path(&config);
    let conn = db::initialize_database(&db_path)
        .await
        .map_err(|e| anyhow::anyhow!("db init failed: {e}"))?;

    let source: Arc<dyn CatalogSource> = Arc::new(CatalogApiClient::new(&config.external_api)?);
    let products: Arc<dyn ProductStore> = Arc::new(SeaOrmProductStore::new(conn.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(
        conn,
        config.queue.name.clone(),
        chrono::Duration::seconds(config.queue.lock_duration_secs),
    ));

    // Воркер очереди: одна задача за раз
    let mut worker = QueueWorker::new(
        queue.clone(),
        std::time::Duration::from_millis(config.queue.poll_interval_ms),
    );
    worker.register(Arc::new(ImportCatalogProcessor::new(
        source.clone(),
        products.clone(),
    )));
    tokio::spawn(async move {
        worker.run_loop().await;
    });

    let state = AppState {
        import: ImportExecutor::new(source, queue, import_job_options(&config.queue)),
        products,
        expose_stack: !config.server.is_production(),
    };
    let app = routes::configure_routes(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(
        "Catalog sync listening on http://{} (catalog: {})",
        addr,
        config.external_api.url
    );
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
