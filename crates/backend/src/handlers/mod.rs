use axum::extract::State;
use axum::http::{Method, Uri};

use crate::shared::error::{ApiError, AppError};
use crate::{AppState, HTTP_CONTEXT};

// Aggregate handlers
pub mod a001_product;

// UseCase handlers
pub mod u101_import_catalog;

/// Ответ для неизвестного маршрута
pub async fn fallback(State(state): State<AppState>, method: Method, uri: Uri) -> ApiError {
    state.error(
        AppError::NotFound(format!("Cannot {} {}", method, uri.path())),
        HTTP_CONTEXT,
    )
}
