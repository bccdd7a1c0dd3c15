use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{handlers, system, AppState};

/// Конфигурация всех роутов приложения
pub fn configure_routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        // ========================================
        // UseCase u101: Import catalog
        // ========================================
        .route("/import", post(handlers::u101_import_catalog::start_import))
        .route(
            "/import/status/:job_id",
            get(handlers::u101_import_catalog::get_status),
        )
        .route(
            "/import/active",
            get(handlers::u101_import_catalog::list_active),
        )
        .route(
            "/import/history",
            get(handlers::u101_import_catalog::list_history),
        )
        // ========================================
        // A001 Product (read-only)
        // ========================================
        .route("/products", get(handlers::a001_product::list))
        .route("/products/:id", get(handlers::a001_product::get_by_id))
        .fallback(handlers::fallback)
        .layer(middleware::from_fn(system::middleware::request_logger))
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::a001_product::service::new_product;
    use crate::domain::a001_product::store::testing::InMemoryProductStore;
    use crate::domain::a001_product::ProductStore;
    use crate::system::queue::{InMemoryJobQueue, JobQueue, QueueWorker};
    use crate::usecases::u101_import_catalog::change_detection::to_product_fields;
    use crate::usecases::u101_import_catalog::processor::tests::{item, FakeSource};
    use crate::usecases::u101_import_catalog::{
        import_job_options, ImportCatalogProcessor, ImportExecutor,
    };
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        worker: QueueWorker,
        store: Arc<InMemoryProductStore>,
    }

    fn app(source: FakeSource, expose_stack: bool) -> TestApp {
        let source = Arc::new(source);
        let store = Arc::new(InMemoryProductStore::new());
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new(
            "product-import",
            chrono::Duration::seconds(30),
        ));
        let config = crate::shared::config::parse_config("").unwrap();
        let executor = ImportExecutor::new(
            source.clone(),
            queue.clone(),
            import_job_options(&config.queue),
        );
        let mut worker = QueueWorker::new(queue, std::time::Duration::from_millis(10));
        worker.register(Arc::new(ImportCatalogProcessor::new(source, store.clone())));

        let state = AppState {
            import: executor,
            products: store.clone(),
            expose_stack,
        };
        TestApp {
            router: configure_routes(state),
            worker,
            store,
        }
    }

    async fn call(router: &Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health() {
        let app = app(FakeSource::with_items(Vec::new()), false);
        let response = app
            .router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_import_flow() {
        let app = app(
            FakeSource::with_items(vec![item(1, "Phone", 199.99), item(2, "Case", 9.99)]),
            false,
        );

        let (status, body) = call(&app.router, "POST", "/import").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "started");
        assert_eq!(body["totalItems"], 2);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        let job_id = body["jobId"].as_str().unwrap().to_string();

        let (_, active) = call(&app.router, "GET", "/import/active").await;
        assert_eq!(active.as_array().unwrap().len(), 1);
        assert_eq!(active[0]["status"], "waiting");

        app.worker.process_next(chrono::Utc::now()).await.unwrap();

        let (status, body) = call(&app.router, "GET", &format!("/import/status/{}", job_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["progress"], 100);
        assert_eq!(body["processedItems"], 2);
        assert_eq!(body["totalItems"], 2);
        assert_eq!(body["deletedItems"], 0);
        assert!(body.get("finishedAt").is_some());
        assert!(body.get("error").is_none());

        let (_, history) = call(&app.router, "GET", "/import/history").await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(app.store.external_ids(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let app = app(FakeSource::with_items(Vec::new()), false);
        let (status, body) = call(&app.router, "GET", "/import/status/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Job with ID missing not found");
        assert_eq!(body["context"], "Import Status");
        assert!(body["timestamp"].is_string());
        assert!(body.get("stack").is_none());
    }

    #[tokio::test]
    async fn test_probe_failure_is_502_with_stack_in_development() {
        let app = app(
            FakeSource::failing(crate::shared::error::AppError::ExternalFetch(
                "request timed out".into(),
            )),
            true,
        );
        let (status, body) = call(&app.router, "POST", "/import").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["context"], "Failed to start import job");
        assert!(body["stack"].is_string());

        let (_, active) = call(&app.router, "GET", "/import/active").await;
        assert!(active.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_products_list_and_get() {
        let app = app(FakeSource::with_items(Vec::new()), false);
        let product = app
            .store
            .create(&to_product_fields(&item(3, "Lamp", 19.99)))
            .await
            .unwrap();
        app.store
            .seed(new_product(&to_product_fields(&item(4, "Desk", 99.0))));

        let (status, body) = call(&app.router, "GET", "/products?search=Lamp&page=1&limit=5").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["meta"]["total"], 1);
        assert_eq!(body["data"][0]["title"], "Lamp");

        let (status, body) = call(
            &app.router,
            "GET",
            &format!("/products/{}", product.id.value()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["externalId"], 3);
        assert_eq!(body["price"], "19.99");

        let (status, _) = call(&app.router, "GET", "/products/not-a-uuid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_query_is_400_json() {
        let app = app(FakeSource::with_items(Vec::new()), false);
        let (status, body) = call(&app.router, "GET", "/products?page=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["context"], "HTTP");
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Failed to deserialize query string"));
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_is_404_json() {
        let app = app(FakeSource::with_items(Vec::new()), false);
        let (status, body) = call(&app.router, "GET", "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Cannot GET /nope");
        assert_eq!(body["context"], "HTTP");
        assert!(body["timestamp"].is_string());
    }
}
