use chrono::Utc;
use contracts::domain::a001_product::{Product, ProductId};
use contracts::domain::common::EntityMetadata;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sea_orm::entity::prelude::*;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "a001_product")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub external_id: i64,
    pub title: String,
    pub description: String,
    pub price: String,
    pub discount_percentage: String,
    pub rating: String,
    pub stock: i64,
    pub brand: String,
    pub category: String,
    pub thumbnail: String,
    /// JSON-массив строк
    pub images: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Product {
    fn from(m: Model) -> Self {
        let metadata = EntityMetadata {
            created_at: m.created_at.unwrap_or_else(Utc::now),
            updated_at: m.updated_at.unwrap_or_else(Utc::now),
        };
        let uuid = Uuid::parse_str(&m.id).unwrap_or_else(|_| Uuid::new_v4());
        let images = serde_json::from_str(&m.images).unwrap_or_else(|e| {
            tracing::warn!("Product {} has malformed images column: {}", m.id, e);
            Vec::new()
        });

        Product {
            id: ProductId(uuid),
            external_id: m.external_id,
            title: m.title,
            description: m.description,
            price: m.price,
            discount_percentage: m.discount_percentage,
            rating: m.rating,
            stock: m.stock,
            brand: m.brand,
            category: m.category,
            thumbnail: m.thumbnail,
            images,
            metadata,
        }
    }
}

fn to_active(aggregate: &Product) -> anyhow::Result<ActiveModel> {
    Ok(ActiveModel {
        id: Set(aggregate.id.value().to_string()),
        external_id: Set(aggregate.external_id),
        title: Set(aggregate.title.clone()),
        description: Set(aggregate.description.clone()),
        price: Set(aggregate.price.clone()),
        discount_percentage: Set(aggregate.discount_percentage.clone()),
        rating: Set(aggregate.rating.clone()),
        stock: Set(aggregate.stock),
        brand: Set(aggregate.brand.clone()),
        category: Set(aggregate.category.clone()),
        thumbnail: Set(aggregate.thumbnail.clone()),
        images: Set(serde_json::to_string(&aggregate.images)?),
        created_at: Set(Some(aggregate.metadata.created_at)),
        updated_at: Set(Some(aggregate.metadata.updated_at)),
    })
}

pub async fn get_by_id(conn: &DatabaseConnection, id: Uuid) -> anyhow::Result<Option<Product>> {
    let result = Entity::find_by_id(id.to_string()).one(conn).await?;
    Ok(result.map(Into::into))
}

pub async fn get_by_external_id(
    conn: &DatabaseConnection,
    external_id: i64,
) -> anyhow::Result<Option<Product>> {
    let result = Entity::find()
        .filter(Column::ExternalId.eq(external_id))
        .one(conn)
        .await?;
    Ok(result.map(Into::into))
}

pub async fn list_external_ids(conn: &DatabaseConnection) -> anyhow::Result<Vec<i64>> {
    let ids: Vec<i64> = Entity::find()
        .select_only()
        .column(Column::ExternalId)
        .order_by_asc(Column::ExternalId)
        .into_tuple()
        .all(conn)
        .await?;
    Ok(ids)
}

/// Страница товаров, новые первыми; возвращает (товары, всего)
pub async fn list_paginated(
    conn: &DatabaseConnection,
    search: Option<&str>,
    page: u64,
    limit: u64,
) -> anyhow::Result<(Vec<Product>, u64)> {
    let mut query = Entity::find();
    if let Some(search) = search {
        query = query.filter(Column::Title.contains(search));
    }
    let paginator = query
        .order_by_desc(Column::CreatedAt)
        .order_by_desc(Column::ExternalId)
        .paginate(conn, limit);

    let total = paginator.num_items().await?;
    let items = paginator
        .fetch_page(page.saturating_sub(1))
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok((items, total))
}

pub async fn insert(conn: &DatabaseConnection, aggregate: &Product) -> anyhow::Result<Uuid> {
    let active = to_active(aggregate)?;
    active.insert(conn).await?;
    Ok(aggregate.id.value())
}

pub async fn update(conn: &DatabaseConnection, aggregate: &Product) -> anyhow::Result<()> {
    let mut active = to_active(aggregate)?;
    active.created_at = sea_orm::ActiveValue::NotSet;
    active.update(conn).await?;
    Ok(())
}

pub async fn delete(conn: &DatabaseConnection, id: Uuid) -> anyhow::Result<bool> {
    let result = Entity::delete_by_id(id.to_string()).exec(conn).await?;
    Ok(result.rows_affected > 0)
}
