// src/handlers/contracts.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::{
        contract::{Contract, ContractStatus, NewContract},
        payment::PaymentOrder,
        sub_account::ContractArtifact,
    },
    services::{
        artifact_service::DocumentCollaborator,
        contract_service::{Activation, ActivationSource, Cancellation},
    },
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceContractPayload {
    #[schema(example = "UNDER_REVIEW")]
    pub to: ContractStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterArtifactPayload {
    #[schema(example = "contracts/2030/contrato-assinado.pdf")]
    pub storage_key: String,
}

// POST /api/contracts
#[utoipa::path(
    post,
    path = "/api/contracts",
    tag = "Contracts",
    request_body = NewContract,
    responses(
        (status = 201, description = "Contrato criado em rascunho", body = Contract),
        (status = 400, description = "Dados inválidos")
    )
)]
pub async fn create_contract(
    State(app_state): State<AppState>,
    Json(payload): Json<NewContract>,
) -> Result<impl IntoResponse, AppError> {
    let contract = app_state.contracts.create(payload).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

// GET /api/contracts/{id}
#[utoipa::path(
    get,
    path = "/api/contracts/{id}",
    tag = "Contracts",
    responses(
        (status = 200, description = "Contrato", body = Contract),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn get_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.contracts.get(id).await?))
}

// POST /api/contracts/{id}/advance
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/advance",
    tag = "Contracts",
    request_body = AdvanceContractPayload,
    responses(
        (status = 200, description = "Contrato avançou de etapa", body = Contract),
        (status = 422, description = "Transição não permitida")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn advance_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvanceContractPayload>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.contracts.advance(id, payload.to).await?))
}

// POST /api/contracts/{id}/activate
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/activate",
    tag = "Contracts",
    responses(
        (status = 200, description = "Contrato ativo com suas parcelas", body = Activation),
        (status = 422, description = "Contrato em estado terminal")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn activate_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let activation: Activation = app_state.contracts.activate(id, ActivationSource::Forced).await?;
    Ok(Json(activation))
}

// POST /api/contracts/{id}/cancel
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/cancel",
    tag = "Contracts",
    responses(
        (status = 200, description = "Contrato cancelado", body = Cancellation),
        (status = 422, description = "Contrato já encerrado")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn cancel_contract(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let cancellation: Cancellation = app_state.contracts.cancel(id).await?;
    Ok(Json(cancellation))
}

// GET /api/contracts/{id}/payment-orders
#[utoipa::path(
    get,
    path = "/api/contracts/{id}/payment-orders",
    tag = "Contracts",
    responses(
        (status = 200, description = "Parcelas do contrato", body = Vec<PaymentOrder>),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn list_payment_orders(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(app_state.contracts.payment_orders(id).await?))
}

// POST /api/contracts/{id}/artifacts
#[utoipa::path(
    post,
    path = "/api/contracts/{id}/artifacts",
    tag = "Contracts",
    request_body = RegisterArtifactPayload,
    responses(
        (status = 201, description = "Artefato registrado com validade", body = ContractArtifact),
        (status = 404, description = "Contrato não encontrado")
    ),
    params(("id" = Uuid, Path, description = "ID do contrato"))
)]
pub async fn register_artifact(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RegisterArtifactPayload>,
) -> Result<impl IntoResponse, AppError> {
    let artifact = app_state
        .artifacts
        .generate_contract_artifact(id, &payload.storage_key)
        .await?;
    Ok((StatusCode::CREATED, Json(artifact)))
}
