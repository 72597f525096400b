// src/middleware/webhook_token.rs

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::{common::error::AppError, config::AppState};

// Cabeçalhos com o token compartilhado de cada provedor
pub const GATEWAY_TOKEN_HEADER: &str = "asaas-access-token";
pub const ESIGN_TOKEN_HEADER: &str = "x-esign-token";

/// Comparação em tempo constante para não vazar o token por timing.
fn tokens_match(expected: &str, received: &str) -> bool {
    let (a, b) = (expected.as_bytes(), received.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn check_token(headers: &HeaderMap, header: &str, expected: &str) -> Result<(), AppError> {
    // Token não configurado: nenhum webhook é aceito
    if expected.is_empty() {
        tracing::warn!(header, "Webhook recebido, mas o token não está configurado");
        return Err(AppError::InvalidToken);
    }

    let received = headers.get(header).and_then(|v| v.to_str().ok()).unwrap_or_default();
    if tokens_match(expected, received) {
        Ok(())
    } else {
        tracing::warn!(header, "Webhook com token inválido");
        Err(AppError::InvalidToken)
    }
}

pub async fn gateway_token_guard(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_token(request.headers(), GATEWAY_TOKEN_HEADER, &app_state.config.gateway.webhook_token)?;
    Ok(next.run(request).await)
}

pub async fn esign_token_guard(
    State(app_state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_token(request.headers(), ESIGN_TOKEN_HEADER, &app_state.config.esign_webhook_token)?;
    Ok(next.run(request).await)
}
