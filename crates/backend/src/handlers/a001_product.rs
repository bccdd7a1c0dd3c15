use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use contracts::domain::a001_product::{Product, ProductId, ProductListResponse, ProductQuery};
use contracts::domain::common::AggregateId;

use crate::shared::error::{ApiError, AppError};
use crate::AppState;

/// GET /products?search=&page=&limit=
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ProductQuery>, QueryRejection>,
) -> Result<Json<ProductListResponse>, ApiError> {
    let Query(query) = query.map_err(|e| state.rejection(e.body_text()))?;
    state
        .products
        .find_all(&query)
        .await
        .map(Json)
        .map_err(|e| state.error(e, "Products"))
}

/// GET /products/:id
pub async fn get_by_id(
    State(state): State<AppState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = id.map_err(|e| state.rejection(e.body_text()))?;
    let product_id = ProductId::from_string(&id).map_err(|_| {
        state.error(
            AppError::NotFound(format!("Product with ID {} not found", id)),
            "Products",
        )
    })?;
    state
        .products
        .find_one(product_id)
        .await
        .map(Json)
        .map_err(|e| state.error(e, "Products"))
}
