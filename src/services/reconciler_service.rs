// src/services/reconciler_service.rs
//
// Traduz eventos assíncronos (gateway e assinatura eletrônica) em transições
// guardadas do livro-razão. Idempotente sob reentrega: uma transição cuja
// guarda não bate vira `AlreadyApplied`, nunca erro.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{JobQueue, LedgerStore},
    models::{
        contract::Contract,
        job::Job,
        notification::{Escalation, EscalationKind, Notification},
        payment::{PaymentOrder, PaymentOrderStatus, Transfer, TransferStatus},
        webhook::{AccountStatusPayload, GatewayEvent, GatewayNotice, PaymentPayload, SignatureEvent, TransferPayload},
    },
    services::{
        contract_service::{ActivationSource, ContractService},
        notification_service::NotificationService,
        payout_service::PayoutOrchestrator,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    AlreadyApplied,
    Ignored(String),
    // Referência desconhecida: reconhecida sem retry, para conciliação manual
    NotFound,
    ManualReview,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Applied => "applied",
            ReconcileOutcome::AlreadyApplied => "already_applied",
            ReconcileOutcome::Ignored(_) => "ignored",
            ReconcileOutcome::NotFound => "not_found",
            ReconcileOutcome::ManualReview => "manual_review",
        }
    }
}

fn log_outcome(event: &str, entity: &str, outcome: &ReconcileOutcome) {
    match outcome {
        ReconcileOutcome::Applied => tracing::info!(event, entity, outcome = outcome.as_str(), "Evento conciliado"),
        ReconcileOutcome::AlreadyApplied => {
            tracing::debug!(event, entity, outcome = outcome.as_str(), "Evento já aplicado")
        }
        ReconcileOutcome::Ignored(reason) => {
            tracing::debug!(event, entity, outcome = outcome.as_str(), reason = %reason, "Evento ignorado")
        }
        ReconcileOutcome::NotFound => {
            tracing::warn!(event, entity, outcome = outcome.as_str(), "Entidade desconhecida; conciliar manualmente")
        }
        ReconcileOutcome::ManualReview => {
            tracing::error!(event, entity, outcome = outcome.as_str(), "Evento exige revisão manual")
        }
    }
}

#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn LedgerStore>,
    contracts: ContractService,
    payouts: PayoutOrchestrator,
    notifications: NotificationService,
    queue: Arc<dyn JobQueue>,
}

impl WebhookReconciler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        contracts: ContractService,
        payouts: PayoutOrchestrator,
        notifications: NotificationService,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self { store, contracts, payouts, notifications, queue }
    }

    // =========================================================================
    //  GATEWAY DE PAGAMENTOS
    // =========================================================================

    pub async fn handle_gateway_event(&self, event: GatewayEvent) -> Result<ReconcileOutcome, AppError> {
        let name = event.event.clone();

        let notice = match event.classify() {
            Ok(notice) => notice,
            Err(AppError::InvalidPayload(reason)) => {
                tracing::warn!(event = %name, reason = %reason, "Evento malformado descartado");
                return Ok(ReconcileOutcome::Ignored(reason));
            }
            Err(e) => return Err(e),
        };

        let (entity, outcome) = match notice {
            GatewayNotice::PaymentSettled(p) => (p.id.clone(), self.payment_settled(&p).await?),
            GatewayNotice::PaymentOverdue(p) => (p.id.clone(), self.payment_overdue(&p).await?),
            GatewayNotice::PaymentDeleted(p) => (p.id.clone(), self.payment_deleted(&p).await?),
            GatewayNotice::PaymentRestored(p) => (p.id.clone(), self.payment_restored(&p).await?),
            GatewayNotice::PaymentRefunded(p) => (p.id.clone(), self.payment_refunded(&p).await?),
            GatewayNotice::AccountStatus(a) => (a.id.clone(), self.account_status(&a).await?),
            GatewayNotice::TransferStatus(t) => (t.id.clone(), self.transfer_status(&t).await?),
            GatewayNotice::PaymentInformational(kind) => ("-".to_string(), ReconcileOutcome::Ignored(kind)),
            GatewayNotice::Unsupported(kind) => {
                ("-".to_string(), ReconcileOutcome::Ignored(format!("evento não suportado: {}", kind)))
            }
        };

        log_outcome(&name, &entity, &outcome);
        Ok(outcome)
    }

    async fn payment_settled(&self, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let Some((order, _charge)) = self.store.find_payment_order_by_charge(&p.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        if order.status.is_settled() {
            // PAID sem repasse: os efeitos podem ter ficado para trás se o
            // enfileiramento falhou depois do commit. As chaves deduplicam.
            if order.status == PaymentOrderStatus::Paid && self.store.get_transfer_for_order(order.id).await?.is_none() {
                let contract = self.contract_of(&order).await?;
                self.schedule_paid_effects(&order, contract.as_ref()).await?;
            }
            return Ok(ReconcileOutcome::AlreadyApplied);
        }

        let contract = self.contract_of(&order).await?;

        if order.status == PaymentOrderStatus::Cancelled {
            let escalation = Escalation {
                kind: EscalationKind::PaymentOnCancelledOrder,
                landlord_id: contract.as_ref().map(|c| c.landlord_id),
                property_id: contract.as_ref().map(|c| c.property_id),
                payment_order_id: Some(order.id),
                amount: p.value,
                reason: format!("cobrança {} paga depois do cancelamento do contrato", p.id),
            };
            self.notifications
                .enqueue_escalation(&format!("paid-cancelled:{}:{}", order.id, p.id), escalation)
                .await?;
            return Ok(ReconcileOutcome::ManualReview);
        }

        let receipt = match p.receipt(Utc::now()) {
            Ok(receipt) => receipt,
            Err(AppError::InvalidPayload(reason)) => return Ok(ReconcileOutcome::Ignored(reason)),
            Err(e) => return Err(e),
        };

        let Some(paid) = self.store.record_payment(order.id, &receipt).await? else {
            // Entrega concorrente venceu
            return Ok(ReconcileOutcome::AlreadyApplied);
        };

        self.schedule_paid_effects(&paid, contract.as_ref()).await?;
        Ok(ReconcileOutcome::Applied)
    }

    /// Repasse + aviso ao proprietário, só depois do commit. As chaves carregam
    /// a versão da parcela, então repetir a chamada não duplica nada.
    async fn schedule_paid_effects(&self, paid: &PaymentOrder, contract: Option<&Contract>) -> Result<(), AppError> {
        let payout_key = format!("payout:{}:PAID:{}", paid.id, paid.version);
        self.queue
            .enqueue(&payout_key, &Job::InitiatePayout { payment_order_id: paid.id })
            .await?;

        if let Some(contract) = contract {
            let notification = Notification::new(
                contract.landlord_id,
                "Pagamento recebido",
                format!(
                    "O aluguel da parcela {} (R$ {}) foi pago. O repasse será processado em seguida.",
                    paid.installment,
                    paid.amount_paid.unwrap_or(paid.amount_due).round_dp(2)
                ),
            )
            .with_link(format!("/contracts/{}", contract.id));
            self.notifications
                .enqueue(&format!("{}:PAID:{}", paid.id, paid.version), notification)
                .await?;
        }
        Ok(())
    }

    async fn payment_overdue(&self, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let Some((order, _)) = self.store.find_payment_order_by_charge(&p.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        match order.status {
            PaymentOrderStatus::Pending => {}
            PaymentOrderStatus::Overdue => return Ok(ReconcileOutcome::AlreadyApplied),
            other => return Ok(ReconcileOutcome::Ignored(format!("parcela {} está {}", order.id, other.as_str()))),
        }

        let Some(overdue) = self.store.mark_order_overdue(order.id).await? else {
            return Ok(ReconcileOutcome::AlreadyApplied);
        };

        if let Some(contract) = self.contract_of(&overdue).await? {
            self.notifications
                .enqueue(&overdue_scope(overdue.id, overdue.version), overdue_notification(&contract, &overdue))
                .await?;
        }
        Ok(ReconcileOutcome::Applied)
    }

    async fn payment_deleted(&self, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let Some((order, charge)) = self.store.find_payment_order_by_charge(&p.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        match order.status {
            PaymentOrderStatus::Pending | PaymentOrderStatus::Overdue | PaymentOrderStatus::Cancelled => {
                if !charge.is_live() {
                    return Ok(ReconcileOutcome::AlreadyApplied);
                }
                Ok(match self.store.detach_charge(order.id).await? {
                    Some(_) => ReconcileOutcome::Applied,
                    None => ReconcileOutcome::AlreadyApplied,
                })
            }
            PaymentOrderStatus::Paid => match self.store.revert_payment(order.id).await? {
                Some(reverted) => {
                    self.store.detach_charge(reverted.id).await?;
                    tracing::warn!(payment_order_id = %reverted.id, charge_id = %p.id, "Pagamento apagado no gateway; parcela voltou para PENDING");
                    Ok(ReconcileOutcome::Applied)
                }
                // Já existe repasse (ou o status mudou): não reverter sozinho
                None => self.reversal_after_payout(&order, p).await,
            },
            PaymentOrderStatus::PayoutPending | PaymentOrderStatus::Received => {
                self.reversal_after_payout(&order, p).await
            }
        }
    }

    async fn reversal_after_payout(&self, order: &PaymentOrder, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let contract = self.contract_of(order).await?;
        let escalation = Escalation {
            kind: EscalationKind::PaymentReversedAfterPayout,
            landlord_id: contract.as_ref().map(|c| c.landlord_id),
            property_id: contract.as_ref().map(|c| c.property_id),
            payment_order_id: Some(order.id),
            amount: order.amount_paid,
            reason: format!(
                "cobrança {} apagada no gateway com a parcela em {}; o repasse pode já ter saído",
                p.id,
                order.status.as_str()
            ),
        };
        self.notifications
            .enqueue_escalation(&format!("payment-deleted:{}:{}", order.id, p.id), escalation)
            .await?;
        Ok(ReconcileOutcome::ManualReview)
    }

    async fn payment_restored(&self, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let Some((order, charge)) = self.store.find_payment_order_by_charge(&p.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };
        if charge.is_live() {
            return Ok(ReconcileOutcome::AlreadyApplied);
        }

        Ok(match self.store.restore_charge(order.id).await? {
            Some(_) => ReconcileOutcome::Applied,
            None => ReconcileOutcome::AlreadyApplied,
        })
    }

    async fn payment_refunded(&self, p: &PaymentPayload) -> Result<ReconcileOutcome, AppError> {
        let Some((order, _)) = self.store.find_payment_order_by_charge(&p.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };
        if !order.status.is_settled() {
            return Ok(ReconcileOutcome::Ignored(format!(
                "estorno de parcela {} ainda não paga",
                order.id
            )));
        }

        let contract = self.contract_of(&order).await?;
        let escalation = Escalation {
            kind: EscalationKind::PaymentRefunded,
            landlord_id: contract.as_ref().map(|c| c.landlord_id),
            property_id: contract.as_ref().map(|c| c.property_id),
            payment_order_id: Some(order.id),
            amount: p.value.or(order.amount_paid),
            reason: format!("cobrança {} estornada com a parcela em {}", p.id, order.status.as_str()),
        };
        self.notifications
            .enqueue_escalation(&format!("payment-refunded:{}:{}", order.id, p.id), escalation)
            .await?;
        Ok(ReconcileOutcome::ManualReview)
    }

    async fn account_status(&self, a: &AccountStatusPayload) -> Result<ReconcileOutcome, AppError> {
        let snapshot = a.snapshot();
        let Some(change) = self.store.update_sub_account_status(&a.id, &snapshot).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        let general = change.account.status_general.as_deref().map(str::to_ascii_uppercase);
        let changed = change.previous.general.as_deref().map(str::to_ascii_uppercase) != general;

        let message = match general.as_deref() {
            Some("APPROVED") if changed => Some(("Conta aprovada", "Sua conta de recebimentos foi aprovada.")),
            Some("REJECTED") if changed => Some((
                "Conta reprovada",
                "Sua conta de recebimentos foi reprovada. Revise seus dados e documentos.",
            )),
            _ => None,
        };

        if let (Some((title, body)), Some(general)) = (message, general.as_deref()) {
            let notification = Notification::new(change.account.landlord_id, title, body).with_link("/account/payments");
            self.notifications
                .enqueue(&format!("account:{}:{}:{}", a.id, general, change.account.version), notification)
                .await?;
        }

        Ok(ReconcileOutcome::Applied)
    }

    async fn transfer_status(&self, t: &TransferPayload) -> Result<ReconcileOutcome, AppError> {
        let Some(status) = t.terminal_status() else {
            return Ok(ReconcileOutcome::Ignored(format!("status de repasse não terminal: {}", t.status)));
        };

        let Some(transfer) = self.store.find_transfer_by_external(&t.id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        if status == TransferStatus::Done {
            let Some(settlement) = self.store.settle_transfer(transfer.id, t.effective_date).await? else {
                // Reentrega: refaz o aviso caso ele não tenha sido enfileirado
                if transfer.status == TransferStatus::Done {
                    if let Some(order) = self.store.get_payment_order(transfer.payment_order_id).await? {
                        if order.status == PaymentOrderStatus::Received {
                            self.notify_transfer_done(&order, &transfer).await?;
                        }
                    }
                }
                return Ok(ReconcileOutcome::AlreadyApplied);
            };

            if let Some(order) = &settlement.order {
                self.notify_transfer_done(order, &settlement.transfer).await?;
            }
            return Ok(ReconcileOutcome::Applied);
        }

        let Some(settlement) = self
            .store
            .fail_transfer(transfer.id, status, t.fail_reason.as_deref())
            .await?
        else {
            return Ok(ReconcileOutcome::AlreadyApplied);
        };

        self.payouts.handle_transfer_failure(&settlement).await?;
        Ok(ReconcileOutcome::Applied)
    }

    async fn notify_transfer_done(&self, order: &PaymentOrder, transfer: &Transfer) -> Result<(), AppError> {
        let Some(contract) = self.contract_of(order).await? else {
            return Ok(());
        };
        let notification = Notification::new(
            contract.landlord_id,
            "Repasse concluído",
            format!(
                "O repasse de R$ {} referente à parcela {} foi concluído.",
                transfer.value.round_dp(2),
                order.installment
            ),
        )
        .with_link(format!("/contracts/{}", contract.id));
        self.notifications
            .enqueue(&format!("{}:RECEIVED:{}", order.id, order.version), notification)
            .await?;
        Ok(())
    }

    async fn contract_of(&self, order: &PaymentOrder) -> Result<Option<Contract>, AppError> {
        self.store.get_contract(order.contract_id).await
    }

    // =========================================================================
    //  ASSINATURA ELETRÔNICA
    // =========================================================================

    pub async fn handle_signature_event(&self, event: SignatureEvent) -> Result<ReconcileOutcome, AppError> {
        let outcome = self.signature_event(&event).await?;
        log_outcome(&event.event, &event.envelope_id, &outcome);
        Ok(outcome)
    }

    async fn signature_event(&self, event: &SignatureEvent) -> Result<ReconcileOutcome, AppError> {
        if !event.is_envelope_closed() {
            return Ok(ReconcileOutcome::Ignored(format!("evento de assinatura {}", event.event)));
        }

        let Some(contract) = self.store.find_contract_by_envelope(&event.envelope_id).await? else {
            return Ok(ReconcileOutcome::NotFound);
        };

        match self.contracts.activate(contract.id, ActivationSource::Signature).await {
            Ok(activation) if activation.already_active => Ok(ReconcileOutcome::AlreadyApplied),
            Ok(_) => Ok(ReconcileOutcome::Applied),
            // Ex.: contrato cancelado antes de todos assinarem
            Err(AppError::InvalidState(reason)) => Ok(ReconcileOutcome::Ignored(reason)),
            Err(e) => Err(e),
        }
    }
}

/// Aviso de atraso para o inquilino. Mesmo escopo de deduplicação usado
/// pelo agendador, então webhook e job diário nunca avisam duas vezes.
pub fn overdue_notification(contract: &Contract, order: &PaymentOrder) -> Notification {
    Notification::new(
        contract.tenant_id,
        "Aluguel em atraso",
        format!(
            "A parcela {} (R$ {}) venceu em {} e ainda não foi paga.",
            order.installment,
            order.amount_due.round_dp(2),
            order.due_date.format("%d/%m/%Y")
        ),
    )
    .with_link(format!("/contracts/{}", contract.id))
}

pub fn overdue_scope(payment_order_id: Uuid, version: i64) -> String {
    format!("{}:OVERDUE:{}", payment_order_id, version)
}
