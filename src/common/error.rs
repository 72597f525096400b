// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::GatewayError;

// Taxonomia de erros do motor de conciliação.
// "Já aplicado" NÃO é erro: é o `ReconcileOutcome::AlreadyApplied`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Payload inválido: {0}")]
    InvalidPayload(String),

    #[error("Não encontrado: {0}")]
    NotFound(String),

    // ConflictError: o chamador trata como "já feito"
    #[error("Já existe: {0}")]
    AlreadyExists(String),

    #[error("Estado inválido: {0}")]
    InvalidState(String),

    #[error("Pré-requisito ausente: {0}")]
    PrerequisiteMissing(String),

    #[error("Erro no gateway de pagamentos: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Erro de banco de dados: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Se o job que produziu este erro deve voltar para a fila (com backoff).
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Gateway(e) => e.is_retryable(),
            AppError::DatabaseError(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::InvalidPayload(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors.iter()
                        .map(|e| e.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| e.code.to_string()))
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                let body = Json(json!({
                    "error": "Um ou mais campos são inválidos.",
                    "details": details,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }
            AppError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::AlreadyExists(msg) => (StatusCode::CONFLICT, msg),
            AppError::InvalidState(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::PrerequisiteMissing(msg) => (StatusCode::PRECONDITION_FAILED, msg),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "Token de autenticação inválido ou ausente.".to_string()),
            AppError::Gateway(ref e) => {
                tracing::error!("Falha no gateway de pagamentos: {}", e);
                (StatusCode::BAD_GATEWAY, "O gateway de pagamentos não respondeu corretamente.".to_string())
            }

            // Todos os outros erros (DatabaseError, InternalServerError) viram 500.
            ref e => {
                tracing::error!("Erro Interno do Servidor: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Ocorreu um erro inesperado.".to_string())
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
