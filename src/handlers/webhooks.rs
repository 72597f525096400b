// src/handlers/webhooks.rs

use axum::{body::Bytes, extract::State, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::{
    common::error::AppError,
    config::AppState,
    models::{
        job::Job,
        webhook::{GatewayEvent, SignatureEvent},
    },
};

// Corpo malformado é reconhecido com 200: o provedor não tem como corrigir
// e reenviaria para sempre.
fn ignored() -> Json<Value> {
    Json(json!({ "status": "ignored" }))
}

fn queued() -> Json<Value> {
    Json(json!({ "status": "queued" }))
}

// POST /webhooks/payment-gateway
#[utoipa::path(
    post,
    path = "/webhooks/payment-gateway",
    tag = "Webhooks",
    request_body(content = String, description = "Evento do gateway (JSON)", content_type = "application/json"),
    responses(
        (status = 200, description = "Evento enfileirado ou ignorado"),
        (status = 401, description = "Token do webhook inválido")
    ),
    security(("gateway_token" = []))
)]
pub async fn payment_gateway_webhook(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let event: GatewayEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook do gateway com corpo inválido; ignorado");
            return Ok(ignored());
        }
    };

    let key = event.dedupe_key_at(Utc::now());
    let event_name = event.event.clone();
    let fresh = app_state
        .queue
        .enqueue(&key, &Job::ProcessGatewayEvent { event })
        .await?;

    tracing::info!(event = %event_name, job_key = %key, duplicate = !fresh, "Webhook do gateway recebido");
    Ok(queued())
}

// POST /webhooks/esignature
#[utoipa::path(
    post,
    path = "/webhooks/esignature",
    tag = "Webhooks",
    request_body(content = String, description = "Evento da assinatura eletrônica (JSON)", content_type = "application/json"),
    responses(
        (status = 200, description = "Evento enfileirado ou ignorado"),
        (status = 401, description = "Token do webhook inválido")
    ),
    security(("esign_token" = []))
)]
pub async fn esignature_webhook(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let event: SignatureEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook de assinatura com corpo inválido; ignorado");
            return Ok(ignored());
        }
    };

    let key = event.dedupe_key();
    let envelope_id = event.envelope_id.clone();
    let fresh = app_state
        .queue
        .enqueue(&key, &Job::ProcessSignatureEvent { event })
        .await?;

    tracing::info!(%envelope_id, job_key = %key, duplicate = !fresh, "Webhook de assinatura recebido");
    Ok(queued())
}
