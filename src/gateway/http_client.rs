// src/gateway/http_client.rs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use super::{
    CreateChargeRequest, CreatePayoutRequest, CreateSubAccountRequest, GatewayError, PaymentGateway,
    RemoteCharge, RemotePayout, RemoteSubAccount,
};
use crate::config::GatewayConfig;
use crate::models::payment::BillingType;

const ACCESS_TOKEN_HEADER: &str = "access_token";

/// Cliente REST do gateway (dialeto Asaas v3).
#[derive(Clone)]
pub struct HttpGatewayClient {
    http: Client,
    base_url: String,
    master_key: String,
}

impl HttpGatewayClient {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        let timeout = Duration::from_millis(if cfg.timeout_ms > 0 { cfg.timeout_ms } else { 15_000 });
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            master_key: cfg.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v3{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, api_key: &str) -> Result<T, GatewayError> {
        let response = request
            .header(ACCESS_TOKEN_HEADER, api_key)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let message = describe_errors(&body);
        if status.is_server_error() {
            Err(GatewayError::Unavailable { status: status.as_u16(), message })
        } else {
            Err(GatewayError::Rejected { status: status.as_u16(), message })
        }
    }
}

fn map_transport_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Transport(e.to_string())
    }
}

// O gateway responde {"errors":[{"code":"...","description":"..."}]}
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorItem>,
}

#[derive(Deserialize)]
struct ErrorItem {
    #[serde(default)]
    description: String,
}

fn describe_errors(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed
            .errors
            .into_iter()
            .map(|e| e.description)
            .collect::<Vec<_>>()
            .join("; "),
        _ => body.chars().take(300).collect(),
    }
}

/// Tipo da chave PIX inferido pelo formato (o gateway exige o tipo).
pub fn pix_key_type(key: &str) -> &'static str {
    let digits = key.chars().filter(|c| c.is_ascii_digit()).count();
    if key.contains('@') {
        "EMAIL"
    } else if key.starts_with('+') {
        "PHONE"
    } else if digits == key.len() && digits == 11 {
        "CPF"
    } else if digits == 14 && key.chars().all(|c| c.is_ascii_digit() || ".-/".contains(c)) {
        "CNPJ"
    } else {
        "EVP"
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentResponse {
    id: String,
    invoice_url: Option<String>,
    bank_slip_url: Option<String>,
}

#[derive(Deserialize)]
struct PixQrCodeResponse {
    payload: Option<String>,
}

#[derive(Deserialize)]
struct TransferResponse {
    id: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    id: String,
    api_key: Option<String>,
    wallet_id: Option<String>,
}

#[derive(Deserialize)]
struct Ignored {}

#[async_trait]
impl PaymentGateway for HttpGatewayClient {
    async fn create_charge(&self, api_key: &str, request: CreateChargeRequest) -> Result<RemoteCharge, GatewayError> {
        let split: Vec<_> = request
            .split
            .iter()
            .map(|s| json!({ "walletId": s.wallet_id, "percentualValue": s.percentual_value }))
            .collect();

        let body = json!({
            "customer": request.customer_id,
            "billingType": request.billing_type.gateway_code(),
            "value": request.value,
            "dueDate": request.due_date.format("%Y-%m-%d").to_string(),
            "description": request.description,
            "externalReference": request.external_reference.to_string(),
            "fine": { "value": request.fine_percent },
            "interest": { "value": request.interest_percent_per_month },
            "split": split,
        });

        let payment: PaymentResponse = self
            .send(self.http.post(self.url("/payments")).json(&body), api_key)
            .await?;

        // O copia-e-cola do PIX vem de outro endpoint. Se falhar, a cobrança
        // já existe: seguimos sem o payload (é só campo de exibição).
        let pix_payload = if request.billing_type == BillingType::Pix {
            let path = format!("/payments/{}/pixQrCode", payment.id);
            match self.send::<PixQrCodeResponse>(self.http.get(self.url(&path)), api_key).await {
                Ok(qr) => qr.payload,
                Err(e) => {
                    tracing::warn!(charge_id = %payment.id, error = %e, "Não foi possível obter o QR Code PIX");
                    None
                }
            }
        } else {
            None
        };

        Ok(RemoteCharge {
            id: payment.id,
            invoice_url: payment.invoice_url,
            bank_slip_url: payment.bank_slip_url,
            pix_payload,
        })
    }

    async fn cancel_charge(&self, api_key: &str, charge_id: &str) -> Result<(), GatewayError> {
        let path = format!("/payments/{}", charge_id);
        let _: Ignored = self.send(self.http.delete(self.url(&path)), api_key).await?;
        Ok(())
    }

    async fn create_payout(&self, api_key: &str, request: CreatePayoutRequest) -> Result<RemotePayout, GatewayError> {
        let body = json!({
            "value": request.value,
            "operationType": "PIX",
            "pixAddressKey": request.payout_key,
            "pixAddressKeyType": pix_key_type(&request.payout_key),
            "description": request.description,
            "externalReference": request.external_reference.to_string(),
        });

        let transfer: TransferResponse = self
            .send(self.http.post(self.url("/transfers")).json(&body), api_key)
            .await?;

        Ok(RemotePayout { id: transfer.id, status: transfer.status })
    }

    async fn get_balance(&self, api_key: &str) -> Result<Decimal, GatewayError> {
        let balance: BalanceResponse = self
            .send(self.http.get(self.url("/finance/balance")), api_key)
            .await?;
        Ok(balance.balance)
    }

    async fn create_sub_account(&self, request: CreateSubAccountRequest) -> Result<RemoteSubAccount, GatewayError> {
        let body = json!({
            "name": request.name,
            "email": request.email,
            "cpfCnpj": request.cpf_cnpj,
            "mobilePhone": request.mobile_phone,
            "externalReference": request.landlord_id.to_string(),
        });

        let account: AccountResponse = self
            .send(self.http.post(self.url("/accounts")).json(&body), &self.master_key)
            .await?;

        Ok(RemoteSubAccount {
            id: account.id,
            api_key: account.api_key,
            wallet_id: account.wallet_id,
        })
    }
}
