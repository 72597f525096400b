// src/models/webhook.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    common::error::AppError,
    models::{
        payment::{PaymentReceipt, TransferStatus},
        sub_account::SubAccountStatusSnapshot,
    },
};

// =========================================================================
//  GATEWAY DE PAGAMENTOS
// =========================================================================

/// Corpo cru do webhook do gateway. Um único envelope para os três assuntos
/// (pagamento, conta, repasse); `event` diz qual bloco vem preenchido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub payment: Option<PaymentPayload>,
    #[serde(default)]
    pub transfer: Option<TransferPayload>,
    #[serde(default)]
    pub account_status: Option<AccountStatusPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub id: String,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub net_value: Option<Decimal>,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub client_payment_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<String>,
}

impl PaymentPayload {
    /// Monta o recibo. Sem valor pago não há o que conciliar.
    pub fn receipt(&self, now: DateTime<Utc>) -> Result<PaymentReceipt, AppError> {
        let amount_paid = self.value.ok_or_else(|| {
            AppError::InvalidPayload(format!("pagamento {} sem campo value", self.id))
        })?;
        let net_value = self.net_value.unwrap_or(amount_paid);

        let paid_at = self
            .client_payment_date
            .or(self.payment_date)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        Ok(PaymentReceipt { amount_paid, net_value, paid_at })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub effective_date: Option<NaiveDate>,
    #[serde(default)]
    pub fail_reason: Option<String>,
}

impl TransferPayload {
    /// Só os status terminais interessam; PENDING e BANK_PROCESSING viram `None`.
    pub fn terminal_status(&self) -> Option<TransferStatus> {
        match self.status.to_ascii_uppercase().as_str() {
            "DONE" => Some(TransferStatus::Done),
            "FAILED" => Some(TransferStatus::Failed),
            "CANCELLED" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStatusPayload {
    pub id: String,
    #[serde(default)]
    pub general: Option<String>,
    #[serde(default)]
    pub documentation: Option<String>,
    #[serde(default)]
    pub commercial_info: Option<String>,
    #[serde(default)]
    pub bank_account_info: Option<String>,
}

impl AccountStatusPayload {
    pub fn snapshot(&self) -> SubAccountStatusSnapshot {
        SubAccountStatusSnapshot {
            general: self.general.clone(),
            documentation: self.documentation.clone(),
            commercial_info: self.commercial_info.clone(),
            bank_account_info: self.bank_account_info.clone(),
        }
    }
}

/// O evento já classificado, com o bloco correspondente garantido.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayNotice {
    PaymentSettled(PaymentPayload),
    PaymentOverdue(PaymentPayload),
    PaymentDeleted(PaymentPayload),
    PaymentRestored(PaymentPayload),
    PaymentRefunded(PaymentPayload),
    // PAYMENT_CREATED, PAYMENT_UPDATED etc.: nada a conciliar
    PaymentInformational(String),
    AccountStatus(AccountStatusPayload),
    TransferStatus(TransferPayload),
    Unsupported(String),
}

impl GatewayEvent {
    /// Chave de deduplicação na fila. O gateway nem sempre manda `id`,
    /// então caímos para evento + entidade. Para pagamentos entram também o
    /// status e o minuto do recebimento: DELETED -> RESTORED -> DELETED da
    /// mesma cobrança não pode colidir com a primeira exclusão.
    pub fn dedupe_key_at(&self, received_at: DateTime<Utc>) -> String {
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            return format!("gateway-event:{}", id);
        }

        let entity = self
            .payment
            .as_ref()
            .map(|p| {
                format!(
                    "{}:{}:{}",
                    p.id,
                    p.status.as_deref().unwrap_or("-"),
                    received_at.format("%Y%m%dT%H%M")
                )
            })
            .or_else(|| self.transfer.as_ref().map(|t| format!("{}:{}", t.id, t.status)))
            .or_else(|| {
                self.account_status.as_ref().map(|a| {
                    format!(
                        "{}:{}:{}:{}:{}",
                        a.id,
                        a.general.as_deref().unwrap_or("-"),
                        a.documentation.as_deref().unwrap_or("-"),
                        a.commercial_info.as_deref().unwrap_or("-"),
                        a.bank_account_info.as_deref().unwrap_or("-"),
                    )
                })
            })
            .unwrap_or_else(|| "-".to_string());

        format!("gateway-event:{}:{}", self.event, entity)
    }

    pub fn classify(self) -> Result<GatewayNotice, AppError> {
        let event = self.event.to_ascii_uppercase();

        if event.starts_with("PAYMENT_") {
            let payment = self.payment.ok_or_else(|| {
                AppError::InvalidPayload(format!("evento {} sem bloco payment", event))
            })?;

            return Ok(match event.as_str() {
                "PAYMENT_RECEIVED" | "PAYMENT_CONFIRMED" => GatewayNotice::PaymentSettled(payment),
                "PAYMENT_OVERDUE" => GatewayNotice::PaymentOverdue(payment),
                "PAYMENT_DELETED" => GatewayNotice::PaymentDeleted(payment),
                "PAYMENT_RESTORED" => GatewayNotice::PaymentRestored(payment),
                "PAYMENT_REFUNDED" => GatewayNotice::PaymentRefunded(payment),
                _ => GatewayNotice::PaymentInformational(event),
            });
        }

        if event.starts_with("ACCOUNT_STATUS") {
            let status = self.account_status.ok_or_else(|| {
                AppError::InvalidPayload(format!("evento {} sem bloco accountStatus", event))
            })?;
            return Ok(GatewayNotice::AccountStatus(status));
        }

        if event.starts_with("TRANSFER_") {
            let transfer = self.transfer.ok_or_else(|| {
                AppError::InvalidPayload(format!("evento {} sem bloco transfer", event))
            })?;
            return Ok(GatewayNotice::TransferStatus(transfer));
        }

        Ok(GatewayNotice::Unsupported(event))
    }
}

// =========================================================================
//  ASSINATURA ELETRÔNICA
// =========================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEvent {
    #[serde(default)]
    pub id: Option<String>,
    pub event: String,
    pub envelope_id: String,
}

impl SignatureEvent {
    /// Envelope fechado = todas as partes assinaram.
    pub fn is_envelope_closed(&self) -> bool {
        matches!(
            self.event.to_ascii_lowercase().as_str(),
            "envelope.closed" | "envelope_closed" | "auto_close" | "close"
        )
    }

    pub fn dedupe_key(&self) -> String {
        match self.id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => format!("esign-event:{}", id),
            None => format!("esign-event:{}:{}", self.event, self.envelope_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classifies_payment_received_with_amounts() {
        let raw = json!({
            "id": "evt_1",
            "event": "PAYMENT_RECEIVED",
            "payment": { "id": "pay_1", "value": 1500.0, "netValue": 1480.0, "paymentDate": "2025-02-10" }
        });
        let event: GatewayEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.dedupe_key_at(Utc::now()), "gateway-event:evt_1");

        match event.classify().unwrap() {
            GatewayNotice::PaymentSettled(p) => {
                let receipt = p.receipt(Utc::now()).unwrap();
                assert_eq!(receipt.amount_paid, Decimal::new(150000, 2));
                assert_eq!(receipt.net_value, Decimal::new(148000, 2));
                assert_eq!(receipt.paid_at.date_naive(), NaiveDate::from_ymd_opt(2025, 2, 10).unwrap());
            }
            other => panic!("classificação inesperada: {:?}", other),
        }
    }

    #[test]
    fn payment_event_without_payment_block_is_invalid() {
        let event: GatewayEvent = serde_json::from_value(json!({ "event": "PAYMENT_CONFIRMED" })).unwrap();
        assert!(matches!(event.classify(), Err(AppError::InvalidPayload(_))));
    }

    #[test]
    fn transfer_pending_is_not_terminal() {
        let payload = TransferPayload {
            id: "tr_1".into(),
            status: "BANK_PROCESSING".into(),
            value: None,
            effective_date: None,
            fail_reason: None,
        };
        assert_eq!(payload.terminal_status(), None);
        let done = TransferPayload { status: "DONE".into(), ..payload };
        assert_eq!(done.terminal_status(), Some(TransferStatus::Done));
    }

    #[test]
    fn dedupe_key_falls_back_to_entity() {
        let event: GatewayEvent = serde_json::from_value(json!({
            "event": "TRANSFER_FAILED",
            "transfer": { "id": "tr_9", "status": "FAILED" }
        }))
        .unwrap();
        assert_eq!(event.dedupe_key_at(Utc::now()), "gateway-event:TRANSFER_FAILED:tr_9:FAILED");
    }

    #[test]
    fn payment_fallback_key_separates_repeated_deletions() {
        use chrono::TimeZone;

        let deleted: GatewayEvent = serde_json::from_value(json!({
            "event": "PAYMENT_DELETED",
            "payment": { "id": "pay_7", "status": "PENDING" }
        }))
        .unwrap();
        let first = Utc.with_ymd_and_hms(2030, 2, 1, 10, 0, 5).unwrap();
        let redelivery = Utc.with_ymd_and_hms(2030, 2, 1, 10, 0, 40).unwrap();
        let later = Utc.with_ymd_and_hms(2030, 2, 1, 10, 7, 0).unwrap();

        assert_eq!(deleted.dedupe_key_at(first), "gateway-event:PAYMENT_DELETED:pay_7:PENDING:20300201T1000");
        assert_eq!(deleted.dedupe_key_at(first), deleted.dedupe_key_at(redelivery));
        assert_ne!(deleted.dedupe_key_at(first), deleted.dedupe_key_at(later));
    }

    #[test]
    fn recognises_closed_envelope() {
        let ev = SignatureEvent { id: None, event: "auto_close".into(), envelope_id: "env_1".into() };
        assert!(ev.is_envelope_closed());
        assert_eq!(ev.dedupe_key(), "esign-event:auto_close:env_1");
    }
}
