// src/gateway.rs
//
// Porta de saída para o gateway de pagamentos. Sem estado: quem chama decide
// se tenta de novo (a fila de efeitos faz backoff exponencial).

pub mod http_client;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::models::payment::BillingType;

pub use http_client::HttpGatewayClient;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("tempo esgotado ao chamar o gateway")]
    Timeout,

    #[error("falha de transporte: {0}")]
    Transport(String),

    // 4xx: não adianta repetir a mesma requisição
    #[error("requisição recusada ({status}): {message}")]
    Rejected { status: u16, message: String },

    // 5xx
    #[error("gateway indisponível ({status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("resposta inesperada do gateway: {0}")]
    Decode(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout | GatewayError::Transport(_) | GatewayError::Unavailable { .. }
        )
    }
}

// --- Requisições / Respostas ---

/// Parte do valor que vai para outra carteira (comissão da plataforma).
#[derive(Debug, Clone, PartialEq)]
pub struct SplitRule {
    pub wallet_id: String,
    // Em pontos percentuais: 5 = 5%
    pub percentual_value: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateChargeRequest {
    pub customer_id: String,
    pub billing_type: BillingType,
    pub value: Decimal,
    pub due_date: NaiveDate,
    pub description: String,
    // Nosso id da parcela, para conciliação manual no painel do gateway
    pub external_reference: Uuid,
    // Multa por atraso (%) e juros ao mês (%)
    pub fine_percent: Decimal,
    pub interest_percent_per_month: Decimal,
    pub split: Vec<SplitRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCharge {
    pub id: String,
    pub invoice_url: Option<String>,
    pub bank_slip_url: Option<String>,
    pub pix_payload: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatePayoutRequest {
    pub payout_key: String,
    pub value: Decimal,
    pub description: String,
    pub external_reference: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemotePayout {
    pub id: String,
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSubAccountRequest {
    pub landlord_id: Uuid,
    pub name: String,
    pub email: String,
    pub cpf_cnpj: String,
    pub mobile_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSubAccount {
    pub id: String,
    pub api_key: Option<String>,
    pub wallet_id: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_charge(&self, api_key: &str, request: CreateChargeRequest) -> Result<RemoteCharge, GatewayError>;

    async fn cancel_charge(&self, api_key: &str, charge_id: &str) -> Result<(), GatewayError>;

    async fn create_payout(&self, api_key: &str, request: CreatePayoutRequest) -> Result<RemotePayout, GatewayError>;

    async fn get_balance(&self, api_key: &str) -> Result<Decimal, GatewayError>;

    /// Usa a chave mestra da plataforma.
    async fn create_sub_account(&self, request: CreateSubAccountRequest) -> Result<RemoteSubAccount, GatewayError>;
}
