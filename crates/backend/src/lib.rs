pub mod domain;
pub mod handlers;
pub mod routes;
pub mod shared;
pub mod system;
pub mod usecases;

use std::sync::Arc;

use domain::a001_product::ProductStore;
use shared::error::{ApiError, AppError};
use usecases::u101_import_catalog::ImportExecutor;

/// Контекст ошибок, возникших до вызова обработчика
pub const HTTP_CONTEXT: &str = "HTTP";

/// Общее состояние HTTP-слоя
#[derive(Clone)]
pub struct AppState {
    pub import: ImportExecutor,
    pub products: Arc<dyn ProductStore>,
    /// Показывать цепочку причин в ответах с ошибкой (не production)
    pub expose_stack: bool,
}

impl AppState {
    pub fn error(&self, error: impl Into<AppError>, context: &str) -> ApiError {
        ApiError::new(error, context).with_stack(self.expose_stack)
    }

    /// Отказ экстрактора axum (путь, query) в общем формате ошибки
    pub fn rejection(&self, message: String) -> ApiError {
        self.error(AppError::BadRequest(message), HTTP_CONTEXT)
    }
}
