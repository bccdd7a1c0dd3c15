use serde::{Deserialize, Serialize};

/// Тело ответа с ошибкой для всех HTTP-эндпоинтов
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
    /// Где произошла ошибка (например, "Import Status")
    pub context: String,
    /// RFC 3339
    pub timestamp: String,
    /// Цепочка причин, только вне production
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}
