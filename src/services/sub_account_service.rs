// src/services/sub_account_service.rs

use std::sync::Arc;

use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::LedgerStore,
    gateway::{CreateSubAccountRequest, PaymentGateway},
    models::sub_account::{NewSubAccount, PayeeSubAccount},
};

/// Dados cadastrais do proprietário para abrir a subconta no gateway.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LandlordProfile {
    #[validate(length(min = 1, message = "O nome é obrigatório."))]
    pub name: String,

    #[validate(email(message = "E-mail inválido."))]
    pub email: String,

    #[validate(length(min = 11, max = 18, message = "CPF/CNPJ inválido."))]
    pub cpf_cnpj: String,

    pub mobile_phone: Option<String>,
}

#[derive(Clone)]
pub struct SubAccountService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl SubAccountService {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Devolve a subconta do proprietário, provisionando no gateway se ainda não existir.
    pub async fn ensure_sub_account(
        &self,
        landlord_id: Uuid,
        profile: &LandlordProfile,
    ) -> Result<PayeeSubAccount, AppError> {
        if let Some(existing) = self.store.get_sub_account_by_landlord(landlord_id).await? {
            return Ok(existing);
        }
        profile.validate()?;

        let remote = self
            .gateway
            .create_sub_account(CreateSubAccountRequest {
                landlord_id,
                name: profile.name.clone(),
                email: profile.email.clone(),
                cpf_cnpj: profile.cpf_cnpj.clone(),
                mobile_phone: profile.mobile_phone.clone(),
            })
            .await?;

        let inserted = self
            .store
            .insert_sub_account(NewSubAccount {
                landlord_id,
                external_account_id: remote.id.clone(),
                api_key: remote.api_key,
                external_wallet_id: remote.wallet_id,
            })
            .await?;

        match inserted {
            Some(account) => {
                tracing::info!(%landlord_id, account_id = %account.external_account_id, "Subconta provisionada");
                Ok(account)
            }
            None => {
                // Provisionamento concorrente venceu; a conta remota criada aqui sobra
                tracing::warn!(%landlord_id, orphan_account_id = %remote.id, "Subconta já existia; conta remota órfã");
                self.store
                    .get_sub_account_by_landlord(landlord_id)
                    .await?
                    .ok_or_else(|| AppError::InternalServerError(anyhow!("subconta de {} sumiu após conflito", landlord_id)))
            }
        }
    }

    pub async fn register_payout_key(&self, landlord_id: Uuid, payout_key: &str) -> Result<PayeeSubAccount, AppError> {
        let payout_key = payout_key.trim();
        if payout_key.is_empty() {
            return Err(AppError::InvalidPayload("chave de repasse vazia".to_string()));
        }

        let account = self
            .store
            .set_payout_key(landlord_id, payout_key)
            .await?
            .ok_or_else(|| AppError::PrerequisiteMissing(format!("proprietário {} sem subconta", landlord_id)))?;

        tracing::info!(%landlord_id, "Chave de repasse registrada");
        Ok(account)
    }

    pub async fn balance(&self, landlord_id: Uuid) -> Result<Decimal, AppError> {
        let account = self.store.get_sub_account_by_landlord(landlord_id).await?;
        let api_key = account
            .as_ref()
            .and_then(|a| a.api_key.as_deref())
            .ok_or_else(|| AppError::PrerequisiteMissing(format!("proprietário {} sem subconta", landlord_id)))?;

        Ok(self.gateway.get_balance(api_key).await?)
    }
}
