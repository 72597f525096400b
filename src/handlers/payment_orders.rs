// src/handlers/payment_orders.rs

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
    models::payment::{BillingType, Charge},
    services::payout_service::PayoutOutcome,
};

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueChargePayload {
    // Sem valor, usa a forma de cobrança do contrato
    #[serde(default)]
    pub billing_type: Option<BillingType>,
}

// POST /api/payment-orders/{id}/charge
#[utoipa::path(
    post,
    path = "/api/payment-orders/{id}/charge",
    tag = "Payment Orders",
    request_body = IssueChargePayload,
    responses(
        (status = 201, description = "Cobrança emitida no gateway", body = Charge),
        (status = 409, description = "Parcela já tem cobrança"),
        (status = 422, description = "Parcela não está pendente ou contrato inativo"),
        (status = 412, description = "Proprietário sem subconta ou inquilino sem cliente no gateway")
    ),
    params(("id" = Uuid, Path, description = "ID da parcela"))
)]
pub async fn issue_charge(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<IssueChargePayload>>,
) -> Result<impl IntoResponse, AppError> {
    let billing_type = payload.and_then(|Json(p)| p.billing_type);
    let charge = app_state.charges.issue_charge(id, billing_type).await?;
    Ok((StatusCode::CREATED, Json(charge)))
}

// POST /api/payment-orders/{id}/payout/retry
#[utoipa::path(
    post,
    path = "/api/payment-orders/{id}/payout/retry",
    tag = "Payment Orders",
    responses(
        (status = 200, description = "Resultado da nova tentativa de repasse", body = PayoutOutcome),
        (status = 409, description = "Já há repasse em andamento"),
        (status = 422, description = "Parcela não está paga")
    ),
    params(("id" = Uuid, Path, description = "ID da parcela"))
)]
pub async fn retry_payout(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let outcome: PayoutOutcome = app_state.payouts.retry_payout(id).await?;
    Ok(Json(outcome))
}
