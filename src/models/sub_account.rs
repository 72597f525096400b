// src/models/sub_account.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Subconta do proprietário dentro do gateway.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PayeeSubAccount {
    pub id: Uuid,
    pub landlord_id: Uuid,
    pub external_account_id: String,

    // Nunca sai na API
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub api_key: Option<String>,
    pub external_wallet_id: Option<String>,
    // Chave PIX de repasse
    pub payout_key: Option<String>,
    // Fração (0.05 = 5%). Nulo usa o padrão da plataforma.
    pub platform_fee_percent: Option<Decimal>,

    #[schema(example = "APPROVED")]
    pub status_general: Option<String>,
    pub status_documentation: Option<String>,
    pub status_commercial_info: Option<String>,
    pub status_bank_account_info: Option<String>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayeeSubAccount {
    /// Credenciais exigidas para emitir cobranças: (api_key, wallet_id).
    pub fn billing_credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.external_wallet_id.as_deref()) {
            (Some(key), Some(wallet)) if !key.is_empty() && !wallet.is_empty() => Some((key, wallet)),
            _ => None,
        }
    }

    /// Credenciais exigidas para repasses: (api_key, chave PIX).
    pub fn payout_credentials(&self) -> Option<(&str, &str)> {
        match (self.api_key.as_deref(), self.payout_key.as_deref()) {
            (Some(key), Some(pix)) if !key.is_empty() && !pix.is_empty() => Some((key, pix)),
            _ => None,
        }
    }

    pub fn fee_percent_or(&self, default_percent: Decimal) -> Decimal {
        self.platform_fee_percent.unwrap_or(default_percent)
    }
}

#[derive(Debug, Clone)]
pub struct NewSubAccount {
    pub landlord_id: Uuid,
    pub external_account_id: String,
    pub api_key: Option<String>,
    pub external_wallet_id: Option<String>,
}

/// Retrato completo dos status da conta (não é delta).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubAccountStatusSnapshot {
    pub general: Option<String>,
    pub documentation: Option<String>,
    pub commercial_info: Option<String>,
    pub bank_account_info: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContractArtifact {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub storage_key: String,
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> PayeeSubAccount {
        PayeeSubAccount {
            id: Uuid::new_v4(),
            landlord_id: Uuid::new_v4(),
            external_account_id: "acc_1".into(),
            api_key: Some("key".into()),
            external_wallet_id: None,
            payout_key: None,
            platform_fee_percent: None,
            status_general: None,
            status_documentation: None,
            status_commercial_info: None,
            status_bank_account_info: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn credentials_require_every_field() {
        let mut acc = account();
        assert!(acc.billing_credentials().is_none());
        assert!(acc.payout_credentials().is_none());

        acc.external_wallet_id = Some("wallet".into());
        acc.payout_key = Some(String::new());
        assert_eq!(acc.billing_credentials(), Some(("key", "wallet")));
        assert!(acc.payout_credentials().is_none());
    }
}
