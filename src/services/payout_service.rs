// src/services/payout_service.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::FeePolicy,
    db::{ledger_store::TransferSettlement, LedgerStore},
    gateway::{CreatePayoutRequest, PaymentGateway},
    models::{
        contract::Contract,
        notification::{Escalation, EscalationKind, Notification},
        payment::{NewTransfer, PaymentOrder, PaymentOrderStatus, Transfer},
    },
    services::notification_service::NotificationService,
};

/// Valor do repasse: líquido do gateway menos a comissão da plataforma
/// (calculada sobre o valor pago, não sobre o líquido).
pub fn payout_amount(amount_paid: Decimal, net_value: Decimal, fee_percent: Decimal) -> Decimal {
    (net_value - amount_paid * fee_percent).round_dp(2)
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayoutOutcome {
    Requested { transfer: Transfer },
    // A parcela não está PAID (já repassada, revertida...)
    NotPayable { status: PaymentOrderStatus },
    AlreadyRequested { transfer: Transfer },
    // Proprietário sem chave de repasse; o dinheiro fica retido
    Deferred { reason: String },
    Skipped { reason: String },
    Escalated { reason: String },
}

#[derive(Clone)]
pub struct PayoutOrchestrator {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifications: NotificationService,
    fees: FeePolicy,
}

impl PayoutOrchestrator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifications: NotificationService,
        fees: FeePolicy,
    ) -> Self {
        Self { store, gateway, notifications, fees }
    }

    /// Solicita o repasse de uma parcela PAID. Falhas do pedido não são
    /// repetidas automaticamente: viram escalonamento.
    pub async fn initiate_payout(&self, payment_order_id: Uuid) -> Result<PayoutOutcome, AppError> {
        let order = self
            .store
            .get_payment_order(payment_order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcela {}", payment_order_id)))?;

        if order.status != PaymentOrderStatus::Paid {
            tracing::debug!(%payment_order_id, status = order.status.as_str(), "Parcela não está PAID; repasse ignorado");
            return Ok(PayoutOutcome::NotPayable { status: order.status });
        }

        if let Some(transfer) = self.store.get_transfer_for_order(order.id).await? {
            if !transfer.status.is_failure() {
                return Ok(PayoutOutcome::AlreadyRequested { transfer });
            }
        }

        let contract = self
            .store
            .get_contract(order.contract_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("contrato {}", order.contract_id)))?;

        let sub_account = self.store.get_sub_account_by_landlord(contract.landlord_id).await?;
        let Some((api_key, payout_key)) = sub_account.as_ref().and_then(|a| a.payout_credentials()) else {
            let reason = format!("proprietário {} sem subconta ou chave de repasse", contract.landlord_id);
            tracing::warn!(%payment_order_id, landlord_id = %contract.landlord_id, "Repasse adiado: {}", reason);
            return Ok(PayoutOutcome::Deferred { reason });
        };

        let (Some(amount_paid), Some(net_value)) = (order.amount_paid, order.net_value) else {
            return Err(AppError::InvalidState(format!("parcela {} PAID sem valores de pagamento", order.id)));
        };

        let fee_percent = sub_account
            .as_ref()
            .map(|a| a.fee_percent_or(self.fees.default_percent))
            .unwrap_or(self.fees.default_percent);
        let value = payout_amount(amount_paid, net_value, fee_percent);

        if value <= Decimal::ZERO {
            let reason = format!("valor de repasse não positivo ({})", value);
            tracing::warn!(%payment_order_id, %amount_paid, %net_value, %fee_percent, "Repasse ignorado: {}", reason);
            return Ok(PayoutOutcome::Skipped { reason });
        }

        match self.gateway.get_balance(api_key).await {
            Ok(balance) if balance < value => {
                let reason = format!("saldo insuficiente na subconta (saldo R$ {}, repasse R$ {})", balance, value);
                return self
                    .escalate_request_failure(&order, &contract, value, EscalationKind::PayoutRequestFailed, reason)
                    .await;
            }
            Ok(_) => {}
            // Consulta de saldo não move dinheiro: pode voltar para a fila
            Err(e) if e.is_retryable() => return Err(e.into()),
            Err(e) => {
                return self
                    .escalate_request_failure(&order, &contract, value, EscalationKind::PayoutRequestFailed, e.to_string())
                    .await;
            }
        }

        let request = CreatePayoutRequest {
            payout_key: payout_key.to_string(),
            value,
            description: format!("Repasse aluguel parcela {} - contrato {}", order.installment, contract.id),
            external_reference: order.id,
        };

        let remote = match self.gateway.create_payout(api_key, request).await {
            Ok(remote) => remote,
            Err(e) => {
                return self
                    .escalate_request_failure(&order, &contract, value, EscalationKind::PayoutRequestFailed, e.to_string())
                    .await;
            }
        };

        let recorded = self
            .store
            .begin_payout(NewTransfer {
                payment_order_id: order.id,
                external_transfer_id: remote.id.clone(),
                value,
            })
            .await;

        match recorded {
            Ok(Some((_, transfer))) => {
                tracing::info!(
                    %payment_order_id,
                    transfer_id = %transfer.external_transfer_id,
                    %value,
                    "Repasse solicitado"
                );
                Ok(PayoutOutcome::Requested { transfer })
            }
            Ok(None) => {
                let reason = format!("repasse {} aceito pelo gateway, mas a parcela mudou de status", remote.id);
                self.escalate_request_failure(&order, &contract, value, EscalationKind::PayoutUnrecorded, reason)
                    .await
            }
            Err(e) => {
                let reason = format!("repasse {} aceito pelo gateway, mas não foi gravado: {}", remote.id, e);
                self.escalate_request_failure(&order, &contract, value, EscalationKind::PayoutUnrecorded, reason)
                    .await
            }
        }
    }

    /// Nova tentativa manual (administrador) depois de um repasse FAILED/CANCELLED
    /// ou de um pedido recusado. Reaproveita a linha do repasse.
    pub async fn retry_payout(&self, payment_order_id: Uuid) -> Result<PayoutOutcome, AppError> {
        let order = self
            .store
            .get_payment_order(payment_order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcela {}", payment_order_id)))?;

        if order.status != PaymentOrderStatus::Paid {
            return Err(AppError::InvalidState(format!(
                "parcela {} está {}; só parcelas PAID podem ter o repasse refeito",
                order.id,
                order.status.as_str()
            )));
        }
        if let Some(transfer) = self.store.get_transfer_for_order(order.id).await? {
            if !transfer.status.is_failure() {
                return Err(AppError::AlreadyExists(format!(
                    "a parcela {} já tem o repasse {} em andamento",
                    order.id, transfer.external_transfer_id
                )));
            }
        }

        tracing::info!(%payment_order_id, "Repasse refeito manualmente");
        self.initiate_payout(payment_order_id).await
    }

    /// Repasse aceito que falhou depois: a parcela já voltou para PAID no
    /// livro-razão; aqui só escalonamos e avisamos o proprietário.
    pub async fn handle_transfer_failure(&self, settlement: &TransferSettlement) -> Result<(), AppError> {
        let transfer = &settlement.transfer;
        let order = match &settlement.order {
            Some(order) => Some(order.clone()),
            None => self.store.get_payment_order(transfer.payment_order_id).await?,
        };
        let contract = match &order {
            Some(o) => self.store.get_contract(o.contract_id).await?,
            None => None,
        };

        let reason = transfer
            .fail_reason
            .clone()
            .unwrap_or_else(|| format!("repasse {:?} sem motivo informado", transfer.status));

        let escalation = Escalation {
            kind: EscalationKind::PayoutFailed,
            landlord_id: contract.as_ref().map(|c| c.landlord_id),
            property_id: contract.as_ref().map(|c| c.property_id),
            payment_order_id: Some(transfer.payment_order_id),
            amount: Some(transfer.value),
            reason: reason.clone(),
        };
        self.notifications
            .enqueue_escalation(&format!("transfer:{}:{}", transfer.id, transfer.version), escalation)
            .await?;

        if let Some(contract) = &contract {
            let notification = Notification::new(
                contract.landlord_id,
                "Repasse não concluído",
                format!(
                    "O repasse de R$ {} não foi concluído ({}). Nossa equipe já foi avisada.",
                    transfer.value.round_dp(2),
                    reason
                ),
            )
            .with_link(format!("/contracts/{}", contract.id));
            self.notifications
                .enqueue(&format!("{}:PAYOUT_FAILED:{}", transfer.payment_order_id, transfer.version), notification)
                .await?;
        }
        Ok(())
    }

    async fn escalate_request_failure(
        &self,
        order: &PaymentOrder,
        contract: &Contract,
        value: Decimal,
        kind: EscalationKind,
        reason: String,
    ) -> Result<PayoutOutcome, AppError> {
        let escalation = Escalation {
            kind,
            landlord_id: Some(contract.landlord_id),
            property_id: Some(contract.property_id),
            payment_order_id: Some(order.id),
            amount: Some(value),
            reason: reason.clone(),
        };
        self.notifications
            .enqueue_escalation(&format!("payout:{}:{:?}:{}", order.id, kind, order.version), escalation)
            .await?;
        Ok(PayoutOutcome::Escalated { reason })
    }
}
