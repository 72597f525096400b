// src/handlers/landlords.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::AppState,
    models::sub_account::PayeeSubAccount,
    services::sub_account_service::LandlordProfile,
};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayoutKeyPayload {
    #[schema(example = "proprietario@exemplo.com")]
    pub payout_key: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub landlord_id: Uuid,
    #[schema(example = "1405.00")]
    pub balance: Decimal,
}

// POST /api/landlords/{id}/sub-account
#[utoipa::path(
    post,
    path = "/api/landlords/{id}/sub-account",
    tag = "Landlords",
    request_body = LandlordProfile,
    responses(
        (status = 200, description = "Subconta do proprietário (criada ou existente)", body = PayeeSubAccount),
        (status = 502, description = "Falha no gateway")
    ),
    params(("id" = Uuid, Path, description = "ID do proprietário"))
)]
pub async fn provision_sub_account(
    State(app_state): State<AppState>,
    Path(landlord_id): Path<Uuid>,
    Json(payload): Json<LandlordProfile>,
) -> Result<impl IntoResponse, AppError> {
    let account = app_state.sub_accounts.ensure_sub_account(landlord_id, &payload).await?;
    Ok(Json(account))
}

// PUT /api/landlords/{id}/payout-key
#[utoipa::path(
    put,
    path = "/api/landlords/{id}/payout-key",
    tag = "Landlords",
    request_body = PayoutKeyPayload,
    responses(
        (status = 200, description = "Chave de repasse registrada", body = PayeeSubAccount),
        (status = 412, description = "Proprietário sem subconta")
    ),
    params(("id" = Uuid, Path, description = "ID do proprietário"))
)]
pub async fn register_payout_key(
    State(app_state): State<AppState>,
    Path(landlord_id): Path<Uuid>,
    Json(payload): Json<PayoutKeyPayload>,
) -> Result<impl IntoResponse, AppError> {
    let account = app_state
        .sub_accounts
        .register_payout_key(landlord_id, &payload.payout_key)
        .await?;
    Ok(Json(account))
}

// GET /api/landlords/{id}/balance
#[utoipa::path(
    get,
    path = "/api/landlords/{id}/balance",
    tag = "Landlords",
    responses(
        (status = 200, description = "Saldo da subconta no gateway", body = BalanceResponse),
        (status = 412, description = "Proprietário sem subconta")
    ),
    params(("id" = Uuid, Path, description = "ID do proprietário"))
)]
pub async fn get_balance(
    State(app_state): State<AppState>,
    Path(landlord_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let balance = app_state.sub_accounts.balance(landlord_id).await?;
    Ok(Json(BalanceResponse { landlord_id, balance }))
}
