use async_trait::async_trait;
use contracts::usecases::u101_import_catalog::CatalogSnapshot;
use std::time::Duration;

use crate::shared::config::ExternalApiConfig;
use crate::shared::error::AppError;

/// Источник полного снимка внешнего каталога
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_catalog(&self) -> Result<CatalogSnapshot, AppError>;
}

/// HTTP-клиент внешнего каталога (DummyJSON-совместимый `GET /products`)
pub struct CatalogApiClient {
    client: reqwest::Client,
    url: String,
}

impl CatalogApiClient {
    pub fn new(config: &ExternalApiConfig) -> Result<Self, AppError> {
        if config.url.trim().is_empty() {
            return Err(AppError::Configuration(
                "external catalog URL is not configured".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl CatalogSource for CatalogApiClient {
    async fn fetch_catalog(&self) -> Result<CatalogSnapshot, AppError> {
        tracing::debug!("GET {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            tracing::error!("Catalog request failed with status {}: {}", status, preview);
            return Err(AppError::ExternalFetch(format!(
                "catalog request failed with status {}",
                status
            )));
        }

        let body = response.text().await?;
        serde_json::from_str::<CatalogSnapshot>(&body).map_err(|e| {
            let preview: String = body.chars().take(500).collect();
            tracing::error!("Failed to parse catalog response: {}. Body: {}", e, preview);
            AppError::ExternalFetch(format!("Failed to parse catalog JSON: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(url: String, timeout_ms: u64) -> ExternalApiConfig {
        ExternalApiConfig {
            url,
            timeout_ms,
            max_redirects: 5,
        }
    }

    fn catalog_body() -> serde_json::Value {
        serde_json::json!({
            "products": [
                {"id": 1, "title": "Phone", "description": "A phone", "price": 199.99,
                 "discountPercentage": 5.5, "rating": 4.2, "stock": 10,
                 "brand": "Acme", "category": "smartphones", "thumbnail": "t.png",
                 "images": ["a.png"]}
            ],
            "total": 1,
            "skip": 0,
            "limit": 30
        })
    }

    #[tokio::test]
    async fn test_fetch_catalog_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_json(catalog_body()))
            .mount(&server)
            .await;

        let client =
            CatalogApiClient::new(&config(format!("{}/products", server.uri()), 5000)).unwrap();
        let snapshot = client.fetch_catalog().await.unwrap();
        assert_eq!(snapshot.total, 1);
        assert_eq!(snapshot.products[0].title, "Phone");
        assert_eq!(snapshot.products[0].price, 199.99);
    }

    #[tokio::test]
    async fn test_non_success_status_is_external_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let client =
            CatalogApiClient::new(&config(format!("{}/products", server.uri()), 5000)).unwrap();
        let err = client.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFetch(ref m) if m.contains("503")));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_timeout_is_external_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(catalog_body())
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            CatalogApiClient::new(&config(format!("{}/products", server.uri()), 50)).unwrap();
        let err = client.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFetch(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_external_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client =
            CatalogApiClient::new(&config(format!("{}/products", server.uri()), 5000)).unwrap();
        let err = client.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFetch(ref m) if m.contains("parse")));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_external_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/products"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/moved", server.uri()).as_str()),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/moved"))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/products", server.uri()).as_str()),
            )
            .mount(&server)
            .await;

        let client =
            CatalogApiClient::new(&config(format!("{}/products", server.uri()), 5000)).unwrap();
        let err = client.fetch_catalog().await.unwrap_err();
        assert!(matches!(err, AppError::ExternalFetch(ref m) if m.contains("redirect")));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_empty_url_is_configuration_error() {
        let err = CatalogApiClient::new(&config(String::new(), 5000))
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Configuration(_)));
    }
}
