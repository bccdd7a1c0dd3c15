use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Внешне видимое состояние задачи импорта
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportJobState {
    /// В очереди
    Waiting,
    /// Выполняется
    Active,
    /// Ожидает повторной попытки (backoff)
    Delayed,
    /// Завершена успешно
    Completed,
    /// Провалена, попытки исчерпаны
    Failed,
}

impl ImportJobState {
    pub const ACTIVE_SET: [ImportJobState; 3] = [
        ImportJobState::Waiting,
        ImportJobState::Active,
        ImportJobState::Delayed,
    ];
    pub const HISTORY_SET: [ImportJobState; 2] =
        [ImportJobState::Completed, ImportJobState::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportJobState::Waiting => "waiting",
            ImportJobState::Active => "active",
            ImportJobState::Delayed => "delayed",
            ImportJobState::Completed => "completed",
            ImportJobState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ImportJobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Итог сверки, сохраняемый в задаче после успешного завершения
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub processed_items: u64,
    pub total_items: u64,
    pub deleted_items: u64,
    /// Ошибки отдельных удалений (не прерывают пакет)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Статус задачи импорта (`GET /import/status/:jobId`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStatus {
    pub job_id: String,
    pub status: ImportJobState,
    pub progress: u8,
    pub processed_items: u64,
    pub total_items: u64,
    pub deleted_items: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Ошибки отдельных товаров из результата сверки
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
