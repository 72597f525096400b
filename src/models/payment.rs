// src/models/payment.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Enums (Mapeando o Postgres) ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOrderStatus {
    Pending,       // Em aberto
    Overdue,       // Vencida
    Paid,          // Paga pelo inquilino, ainda sem repasse
    PayoutPending, // Repasse solicitado ao gateway
    Received,      // Repasse concluído para o proprietário
    Cancelled,
}

impl PaymentOrderStatus {
    /// Parcelas ainda em aberto (aceitam pagamento, vencimento e cancelamento).
    pub const OPEN: [PaymentOrderStatus; 2] = [PaymentOrderStatus::Pending, PaymentOrderStatus::Overdue];

    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }

    /// O dinheiro já entrou (pagamento já aplicado).
    pub fn is_settled(self) -> bool {
        matches!(
            self,
            PaymentOrderStatus::Paid | PaymentOrderStatus::PayoutPending | PaymentOrderStatus::Received
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentOrderStatus::Pending => "PENDING",
            PaymentOrderStatus::Overdue => "OVERDUE",
            PaymentOrderStatus::Paid => "PAID",
            PaymentOrderStatus::PayoutPending => "PAYOUT_PENDING",
            PaymentOrderStatus::Received => "RECEIVED",
            PaymentOrderStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "billing_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BillingType {
    #[default]
    BankSlip, // Boleto
    Pix,
}

impl BillingType {
    /// Nome do meio de pagamento no dialeto do gateway.
    pub fn gateway_code(self) -> &'static str {
        match self {
            BillingType::BankSlip => "BOLETO",
            BillingType::Pix => "PIX",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "transfer_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Pending,
    Done,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Repasses que podem ser substituídos por uma nova tentativa manual.
    pub fn is_failure(self) -> bool {
        matches!(self, TransferStatus::Failed | TransferStatus::Cancelled)
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrder {
    pub id: Uuid,
    pub contract_id: Uuid,
    #[schema(example = 1)]
    pub installment: i32,

    #[schema(value_type = String, format = Date, example = "2025-02-10")]
    pub due_date: NaiveDate,

    // Congelado na criação: aluguel + condomínio + IPTU
    #[schema(example = "1500.00")]
    pub amount_due: Decimal,
    #[schema(example = "1500.00")]
    pub amount_paid: Option<Decimal>,
    // Já descontada a taxa do próprio gateway
    #[schema(example = "1480.00")]
    pub net_value: Option<Decimal>,
    pub paid_at: Option<DateTime<Utc>>,

    pub status: PaymentOrderStatus,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentOrder {
    pub contract_id: Uuid,
    pub installment: i32,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
}

/// O que o gateway informou sobre um pagamento recebido.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentReceipt {
    pub amount_paid: Decimal,
    pub net_value: Decimal,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Charge {
    pub id: Uuid,
    pub payment_order_id: Uuid,
    #[schema(example = "pay_080225913252")]
    pub external_charge_id: String,
    pub billing_type: BillingType,

    // Campos derivados de exibição
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_payload: Option<String>,

    #[schema(value_type = String, format = Date, example = "2025-02-10")]
    pub due_date: NaiveDate,
    // Cobrança removida no gateway (evento PAYMENT_DELETED)
    pub deleted_at: Option<DateTime<Utc>>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Charge {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewCharge {
    pub payment_order_id: Uuid,
    pub external_charge_id: String,
    pub billing_type: BillingType,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_payload: Option<String>,
    pub due_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: Uuid,
    pub payment_order_id: Uuid,
    #[schema(example = "777eb7c8-b1a2-4356-8fd8-a1b0644b5282")]
    pub external_transfer_id: String,
    pub status: TransferStatus,
    #[schema(example = "1405.00")]
    pub value: Decimal,
    #[schema(value_type = Option<String>, format = Date)]
    pub effective_date: Option<NaiveDate>,
    pub fail_reason: Option<String>,

    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub payment_order_id: Uuid,
    pub external_transfer_id: String,
    pub value: Decimal,
}

/// Parcela com a cobrança que estava viva no momento do cancelamento.
#[derive(Debug, Clone)]
pub struct CancelledOrder {
    pub order: PaymentOrder,
    pub charge: Option<Charge>,
}
