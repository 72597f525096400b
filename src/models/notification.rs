// src/models/notification.rs

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notificação in-app para um usuário (proprietário ou inquilino).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub action_link: Option<String>,
}

impl Notification {
    pub fn new(user_id: Uuid, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            action_link: None,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.action_link = Some(link.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationKind {
    // O gateway recusou (ou não confirmou) o pedido de repasse
    PayoutRequestFailed,
    // Repasse aceito que depois falhou/foi cancelado
    PayoutFailed,
    // O gateway aceitou o repasse mas não conseguimos gravar localmente
    PayoutUnrecorded,
    // Cobrança apagada/estornada depois que o dinheiro já saiu
    PaymentReversedAfterPayout,
    // Estorno de um pagamento já conciliado
    PaymentRefunded,
    // Pagamento recebido para uma parcela cancelada
    PaymentOnCancelledOrder,
    // Job da fila esgotou as tentativas
    JobExhausted,
}

/// Escalonamento para os administradores, com todo o contexto financeiro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Escalation {
    pub kind: EscalationKind,
    pub landlord_id: Option<Uuid>,
    pub property_id: Option<Uuid>,
    pub payment_order_id: Option<Uuid>,
    pub amount: Option<Decimal>,
    pub reason: String,
}

impl Escalation {
    pub fn title(&self) -> &'static str {
        match self.kind {
            EscalationKind::PayoutRequestFailed => "Falha ao solicitar repasse",
            EscalationKind::PayoutFailed => "Repasse falhou no gateway",
            EscalationKind::PayoutUnrecorded => "Repasse aceito sem registro local",
            EscalationKind::PaymentReversedAfterPayout => "Pagamento revertido após repasse",
            EscalationKind::PaymentRefunded => "Pagamento estornado",
            EscalationKind::PaymentOnCancelledOrder => "Pagamento de parcela cancelada",
            EscalationKind::JobExhausted => "Tarefa esgotou as tentativas",
        }
    }

    pub fn message(&self) -> String {
        let fmt_id = |id: Option<Uuid>| id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string());
        format!(
            "Proprietário: {} | Imóvel: {} | Parcela: {} | Valor: {} | Motivo: {}",
            fmt_id(self.landlord_id),
            fmt_id(self.property_id),
            fmt_id(self.payment_order_id),
            self.amount.map(|a| format!("R$ {}", a.round_dp(2))).unwrap_or_else(|| "-".to_string()),
            self.reason,
        )
    }
}
