use serde::{Deserialize, Serialize};

/// Снимок внешнего каталога: `GET <external_api.url>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub products: Vec<CatalogItem>,
    pub total: i64,
    pub skip: i64,
    pub limit: i64,
}

/// Товар внешнего каталога (не хранится как есть)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    /// Внешний идентификатор
    pub id: i64,
    pub title: String,
    pub description: String,
    pub price: f64,

    #[serde(rename = "discountPercentage")]
    pub discount_percentage: f64,

    pub rating: f64,
    pub stock: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,

    #[serde(default)]
    pub images: Vec<String>,
}
