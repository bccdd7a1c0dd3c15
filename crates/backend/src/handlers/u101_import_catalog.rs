use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    Json,
};
use contracts::usecases::u101_import_catalog::{ImportResponse, ImportStatus};

use crate::shared::error::ApiError;
use crate::AppState;

/// POST /import
pub async fn start_import(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ImportResponse>), ApiError> {
    match state.import.start_import().await {
        Ok(response) => Ok((StatusCode::CREATED, Json(response))),
        Err(e) => Err(state.error(e, "Failed to start import job")),
    }
}

/// GET /import/status/:job_id
pub async fn get_status(
    State(state): State<AppState>,
    job_id: Result<Path<String>, PathRejection>,
) -> Result<Json<ImportStatus>, ApiError> {
    let Path(job_id) = job_id.map_err(|e| state.rejection(e.body_text()))?;
    state
        .import
        .get_import_status(&job_id)
        .await
        .map(Json)
        .map_err(|e| state.error(e, "Import Status"))
}

/// GET /import/active
pub async fn list_active(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImportStatus>>, ApiError> {
    state
        .import
        .get_active_imports()
        .await
        .map(Json)
        .map_err(|e| state.error(e, "Failed to get active imports"))
}

/// GET /import/history
pub async fn list_history(
    State(state): State<AppState>,
) -> Result<Json<Vec<ImportStatus>>, ApiError> {
    state
        .import
        .get_import_history()
        .await
        .map(Json)
        .map_err(|e| state.error(e, "Failed to get import history"))
}
