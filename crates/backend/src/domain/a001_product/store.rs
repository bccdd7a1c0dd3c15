use async_trait::async_trait;
use contracts::domain::a001_product::{
    PageMeta, Product, ProductFields, ProductId, ProductListResponse, ProductQuery,
};
use contracts::domain::common::AggregateId;
use sea_orm::DatabaseConnection;

use super::{repository, service};
use crate::shared::error::AppError;

/// Контракт хранилища товаров, которым пользуются сверка и просмотр каталога.
///
/// `external_id` уникален среди всех товаров.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<Product>, AppError>;

    async fn create(&self, fields: &ProductFields) -> Result<Product, AppError>;

    /// Ошибка `NotFound`, если товара нет
    async fn update(&self, id: ProductId, fields: &ProductFields) -> Result<Product, AppError>;

    /// Ошибка `NotFound`, если товара нет
    async fn remove(&self, id: ProductId) -> Result<(), AppError>;

    async fn list_all_external_ids(&self) -> Result<Vec<i64>, AppError>;

    async fn find_all(&self, query: &ProductQuery) -> Result<ProductListResponse, AppError>;

    async fn find_one(&self, id: ProductId) -> Result<Product, AppError>;
}

fn not_found(id: ProductId) -> AppError {
    AppError::NotFound(format!("Product with ID {} not found", id.as_string()))
}

/// Хранилище товаров в SQLite (sea-orm)
#[derive(Clone)]
pub struct SeaOrmProductStore {
    conn: DatabaseConnection,
}

impl SeaOrmProductStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl ProductStore for SeaOrmProductStore {
    async fn find_by_external_id(&self, external_id: i64) -> Result<Option<Product>, AppError> {
        repository::get_by_external_id(&self.conn, external_id)
            .await
            .map_err(AppError::persistence)
    }

    async fn create(&self, fields: &ProductFields) -> Result<Product, AppError> {
        let product = service::new_product(fields);
        repository::insert(&self.conn, &product)
            .await
            .map_err(AppError::persistence)?;
        Ok(product)
    }

    async fn update(&self, id: ProductId, fields: &ProductFields) -> Result<Product, AppError> {
        let mut product = self.find_one(id).await?;
        service::apply_fields(&mut product, fields);
        repository::update(&self.conn, &product)
            .await
            .map_err(AppError::persistence)?;
        Ok(product)
    }

    async fn remove(&self, id: ProductId) -> Result<(), AppError> {
        let deleted = repository::delete(&self.conn, id.value())
            .await
            .map_err(AppError::persistence)?;
        if deleted {
            Ok(())
        } else {
            Err(not_found(id))
        }
    }

    async fn list_all_external_ids(&self) -> Result<Vec<i64>, AppError> {
        repository::list_external_ids(&self.conn)
            .await
            .map_err(AppError::persistence)
    }

    async fn find_all(&self, query: &ProductQuery) -> Result<ProductListResponse, AppError> {
        let (page, limit) = (query.page(), query.limit());
        let (data, total) = repository::list_paginated(&self.conn, query.search(), page, limit)
            .await
            .map_err(AppError::persistence)?;
        Ok(ProductListResponse {
            data,
            meta: PageMeta::new(total, page, limit),
        })
    }

    async fn find_one(&self, id: ProductId) -> Result<Product, AppError> {
        repository::get_by_id(&self.conn, id.value())
            .await
            .map_err(AppError::persistence)?
            .ok_or_else(|| not_found(id))
    }
}
