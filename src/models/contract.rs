// src/models/contract.rs

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::payment::BillingType;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "contract_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    PendingDocs,        // Aguardando documentos
    UnderReview,        // Em análise
    AwaitingSignatures, // Aguardando assinaturas
    Active,
    Cancelled,
    Finished,
}

impl ContractStatus {
    /// Estados anteriores à ativação (o "forçar ativação" aceita qualquer um deles).
    pub const PRE_ACTIVE: [ContractStatus; 3] = [
        ContractStatus::PendingDocs,
        ContractStatus::UnderReview,
        ContractStatus::AwaitingSignatures,
    ];

    /// Estados dos quais o cancelamento é permitido.
    pub const CANCELLABLE: [ContractStatus; 4] = [
        ContractStatus::PendingDocs,
        ContractStatus::UnderReview,
        ContractStatus::AwaitingSignatures,
        ContractStatus::Active,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, ContractStatus::Cancelled | ContractStatus::Finished)
    }

    /// Próximo passo da esteira de revisão. Só anda para frente.
    pub fn next_review_step(self) -> Option<ContractStatus> {
        match self {
            ContractStatus::PendingDocs => Some(ContractStatus::UnderReview),
            ContractStatus::UnderReview => Some(ContractStatus::AwaitingSignatures),
            _ => None,
        }
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: Uuid,
    pub status: ContractStatus,

    #[schema(value_type = String, format = Date, example = "2025-01-10")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2026-01-10")]
    pub end_date: NaiveDate,
    #[schema(example = 12)]
    pub duration_in_months: i32,

    // Valores
    #[schema(example = "1200.00")]
    pub rent_amount: Decimal,
    #[schema(example = "250.00")]
    pub condo_fee: Decimal,
    #[schema(example = "50.00")]
    pub iptu_fee: Decimal,

    // Participantes
    pub landlord_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,

    pub billing_type: BillingType,
    // Cliente do inquilino dentro do gateway (cadastrado pelo onboarding)
    pub gateway_customer_id: Option<String>,
    pub signature_envelope_id: Option<String>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    /// Valor mensal cobrado do inquilino (aluguel + condomínio + IPTU).
    pub fn monthly_amount(&self) -> Decimal {
        self.rent_amount + self.condo_fee + self.iptu_fee
    }

    /// Vencimento da parcela `installment` (1..=N): início + `installment` meses.
    pub fn due_date_for(&self, installment: u32) -> Option<NaiveDate> {
        self.start_date.checked_add_months(Months::new(installment))
    }
}

/// Data de término derivada: início + duração em meses.
pub fn end_date_for(start_date: NaiveDate, duration_in_months: i32) -> Option<NaiveDate> {
    let months = u32::try_from(duration_in_months).ok()?;
    start_date.checked_add_months(Months::new(months))
}

fn non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("non_negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewContract {
    #[schema(value_type = String, format = Date, example = "2025-01-10")]
    pub start_date: NaiveDate,

    #[validate(range(min = 1, max = 120, message = "A duração deve ser de pelo menos 1 mês"))]
    #[schema(example = 12)]
    pub duration_in_months: i32,

    #[validate(custom(function = "non_negative"))]
    #[schema(example = "1200.00")]
    pub rent_amount: Decimal,
    #[serde(default)]
    #[validate(custom(function = "non_negative"))]
    pub condo_fee: Decimal,
    #[serde(default)]
    #[validate(custom(function = "non_negative"))]
    pub iptu_fee: Decimal,

    pub landlord_id: Uuid,
    pub tenant_id: Uuid,
    pub property_id: Uuid,

    #[serde(default)]
    pub billing_type: BillingType,
    pub gateway_customer_id: Option<String>,
    pub signature_envelope_id: Option<String>,
}
