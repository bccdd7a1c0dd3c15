use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::CatalogItem;

/// Ответ на запрос запуска импорта (`POST /import`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub job_id: String,
    pub status: ImportStartStatus,
    pub started_at: DateTime<Utc>,
    /// Итоги пробного запроса к внешнему каталогу
    pub total_items: i64,
    pub skip: i64,
    pub limit: i64,
    pub items: Vec<CatalogItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStartStatus {
    Started,
}
