use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use contracts::shared::error::ErrorResponse;
use thiserror::Error;

/// Ошибки каталога и импорта
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AppError {
    /// Не задан обязательный параметр запуска
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Сеть, таймаут или неуспешный ответ внешнего каталога
    #[error("External fetch error: {0}")]
    ExternalFetch(String),

    #[error("{0}")]
    NotFound(String),

    /// Запрос не разобран (путь, параметры)
    #[error("{0}")]
    BadRequest(String),

    /// Ошибка операции с хранилищем
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl AppError {
    /// Можно ли повторить попытку задачи после этой ошибки
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::ExternalFetch(_) | AppError::Persistence(_) | AppError::Unknown(_) => true,
            AppError::Configuration(_) | AppError::NotFound(_) | AppError::BadRequest(_) => false,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::ExternalFetch(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn persistence(e: impl std::fmt::Display) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::ExternalFetch(format!("request timed out: {}", e))
        } else if e.is_redirect() {
            AppError::ExternalFetch(format!("too many redirects: {}", e))
        } else {
            AppError::ExternalFetch(e.to_string())
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(e: sea_orm::DbErr) -> Self {
        AppError::Persistence(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<AppError>() {
            Ok(app) => app,
            Err(other) => AppError::Unknown(format!("{:#}", other)),
        }
    }
}

/// Ошибка HTTP-слоя: ошибка + контекст запроса
#[derive(Debug)]
pub struct ApiError {
    pub error: AppError,
    pub context: String,
    /// Показывать ли цепочку причин клиенту
    pub expose_stack: bool,
}

impl ApiError {
    pub fn new(error: impl Into<AppError>, context: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            context: context.into(),
            expose_stack: false,
        }
    }

    pub fn with_stack(mut self, expose: bool) -> Self {
        self.expose_stack = expose;
        self
    }

    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            message: self.error.to_string(),
            context: self.context.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            stack: self
                .expose_stack
                .then(|| format!("{}: {:?}", self.context, self.error)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.error.status_code();
        if status.is_server_error() {
            tracing::error!("[{}] {}", self.context, self.error);
        } else {
            tracing::warn!("[{}] {}", self.context, self.error);
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AppError::ExternalFetch("timeout".into()).is_retryable());
        assert!(AppError::Persistence("locked".into()).is_retryable());
        assert!(AppError::Unknown("?".into()).is_retryable());
        assert!(!AppError::Configuration("url".into()).is_retryable());
        assert!(!AppError::NotFound("job".into()).is_retryable());
        assert!(!AppError::BadRequest("page".into()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::ExternalFetch("x".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Persistence("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_anyhow_keeps_app_error() {
        let err = anyhow::Error::new(AppError::NotFound("Job with ID 7 not found".into()));
        assert_eq!(
            AppError::from(err),
            AppError::NotFound("Job with ID 7 not found".into())
        );
        let other = AppError::from(anyhow::anyhow!("boom"));
        assert!(matches!(other, AppError::Unknown(_)));
    }

    #[test]
    fn test_body_hides_stack_in_production() {
        let err = ApiError::new(AppError::NotFound("missing".into()), "Import Status");
        let body = err.body();
        assert_eq!(body.message, "missing");
        assert_eq!(body.context, "Import Status");
        assert!(body.stack.is_none());

        let err = ApiError::new(AppError::Unknown("boom".into()), "System").with_stack(true);
        assert!(err.body().stack.unwrap().contains("boom"));
    }
}
