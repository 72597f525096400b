// src/services/contract_service.rs

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::AppError,
    db::LedgerStore,
    gateway::PaymentGateway,
    models::{
        contract::{end_date_for, Contract, ContractStatus, NewContract},
        notification::Notification,
        payment::{NewPaymentOrder, PaymentOrder},
    },
    services::{charge_service::ChargeIssuer, notification_service::NotificationService},
};

/// De onde veio o pedido de ativação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationSource {
    // Webhook "envelope fechado" da assinatura eletrônica
    Signature,
    // Ação explícita do proprietário/administrador
    Forced,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Activation {
    pub contract: Contract,
    pub payment_orders: Vec<PaymentOrder>,
    // true quando o contrato já estava ativo (nada foi feito)
    pub already_active: bool,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Cancellation {
    pub contract: Contract,
    pub cancelled_orders: Vec<PaymentOrder>,
    pub charges_cancelled: usize,
    pub charge_cancel_failures: usize,
}

#[derive(Clone)]
pub struct ContractService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    charges: ChargeIssuer,
    notifications: NotificationService,
}

impl ContractService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        charges: ChargeIssuer,
        notifications: NotificationService,
    ) -> Self {
        Self { store, gateway, charges, notifications }
    }

    pub async fn create(&self, new: NewContract) -> Result<Contract, AppError> {
        new.validate()?;
        let end_date = end_date_for(new.start_date, new.duration_in_months)
            .ok_or_else(|| AppError::InvalidPayload("data de término fora do calendário".to_string()))?;

        let contract = self.store.create_contract(&new, end_date).await?;
        tracing::info!(contract_id = %contract.id, landlord_id = %contract.landlord_id, "Contrato criado");
        Ok(contract)
    }

    pub async fn get(&self, id: Uuid) -> Result<Contract, AppError> {
        self.store
            .get_contract(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("contrato {}", id)))
    }

    pub async fn payment_orders(&self, id: Uuid) -> Result<Vec<PaymentOrder>, AppError> {
        self.get(id).await?;
        self.store.list_payment_orders(id).await
    }

    /// Esteira de revisão: só anda um passo para frente.
    pub async fn advance(&self, id: Uuid, to: ContractStatus) -> Result<Contract, AppError> {
        let contract = self.get(id).await?;
        if contract.status.next_review_step() != Some(to) {
            return Err(AppError::InvalidState(format!(
                "contrato {} não pode ir de {:?} para {:?}",
                id, contract.status, to
            )));
        }

        self.store
            .set_contract_status(id, &[contract.status], to)
            .await?
            .ok_or_else(|| AppError::InvalidState(format!("contrato {} mudou de status durante a operação", id)))
    }

    /// Ativa o contrato e gera todas as parcelas. Ativar duas vezes é no-op.
    pub async fn activate(&self, id: Uuid, source: ActivationSource) -> Result<Activation, AppError> {
        let contract = self.get(id).await?;

        if contract.status == ContractStatus::Active {
            tracing::debug!(contract_id = %id, ?source, "Contrato já ativo");
            return self.existing_activation(contract).await;
        }

        let allowed: &[ContractStatus] = match source {
            ActivationSource::Signature => &[ContractStatus::AwaitingSignatures],
            ActivationSource::Forced => &ContractStatus::PRE_ACTIVE,
        };
        if !allowed.contains(&contract.status) {
            return Err(AppError::InvalidState(format!(
                "contrato {} está {:?} e não pode ser ativado por {:?}",
                id, contract.status, source
            )));
        }

        let orders = build_payment_orders(&contract)?;
        let Some((contract, orders)) = self.store.activate_contract(id, allowed, orders).await? else {
            // Outra entrega venceu a corrida
            let current = self.get(id).await?;
            if current.status == ContractStatus::Active {
                return self.existing_activation(current).await;
            }
            return Err(AppError::InvalidState(format!("contrato {} mudou de status durante a ativação", id)));
        };

        tracing::info!(contract_id = %id, ?source, installments = orders.len(), "Contrato ativado");

        // Primeira cobrança: melhor esforço, o agendador tenta de novo
        if let Some(first) = orders.first() {
            if let Err(e) = self.charges.issue_charge(first.id, None).await {
                tracing::warn!(contract_id = %id, payment_order_id = %first.id, error = %e, "Primeira cobrança não emitida");
            }
        }

        self.notify_activation(&contract, orders.len()).await?;
        Ok(Activation { contract, payment_orders: orders, already_active: false })
    }

    /// Repetir a ativação refaz o aviso (a chave deduplica), cobrindo uma
    /// falha de enfileiramento depois do commit.
    async fn existing_activation(&self, contract: Contract) -> Result<Activation, AppError> {
        let payment_orders = self.store.list_payment_orders(contract.id).await?;
        self.notify_activation(&contract, payment_orders.len()).await?;
        Ok(Activation { contract, payment_orders, already_active: true })
    }

    async fn notify_activation(&self, contract: &Contract, installments: usize) -> Result<(), AppError> {
        let notification = Notification::new(
            contract.tenant_id,
            "Contrato ativo",
            format!("Seu contrato foi ativado. {} parcelas foram geradas.", installments),
        )
        .with_link(format!("/contracts/{}", contract.id));
        self.notifications
            .enqueue(&format!("contract:{}:ACTIVE:tenant", contract.id), notification)
            .await?;
        Ok(())
    }

    /// Cancela o contrato e as parcelas em aberto. Cada cancelamento de
    /// cobrança no gateway é independente dos demais.
    pub async fn cancel(&self, id: Uuid) -> Result<Cancellation, AppError> {
        let contract = self.get(id).await?;
        if contract.status.is_terminal() {
            return Err(AppError::InvalidState(format!("contrato {} já está {:?}", id, contract.status)));
        }

        let (contract, cancelled) = self
            .store
            .cancel_contract(id)
            .await?
            .ok_or_else(|| AppError::InvalidState(format!("contrato {} mudou de status durante o cancelamento", id)))?;

        let with_charge: Vec<_> = cancelled.iter().filter_map(|c| c.charge.as_ref()).collect();
        let mut charges_cancelled = 0;
        let mut charge_cancel_failures = 0;

        if !with_charge.is_empty() {
            let sub_account = self.store.get_sub_account_by_landlord(contract.landlord_id).await?;
            match sub_account.as_ref().and_then(|a| a.api_key.as_deref()) {
                Some(api_key) => {
                    for charge in with_charge {
                        match self.gateway.cancel_charge(api_key, &charge.external_charge_id).await {
                            Ok(()) => charges_cancelled += 1,
                            Err(e) => {
                                charge_cancel_failures += 1;
                                tracing::error!(
                                    contract_id = %id,
                                    payment_order_id = %charge.payment_order_id,
                                    charge_id = %charge.external_charge_id,
                                    error = %e,
                                    "Falha ao cancelar cobrança no gateway"
                                );
                            }
                        }
                    }
                }
                None => {
                    charge_cancel_failures = with_charge.len();
                    tracing::error!(contract_id = %id, "Proprietário sem credenciais; cobranças não canceladas no gateway");
                }
            }
        }

        for (user_id, role) in [(contract.landlord_id, "landlord"), (contract.tenant_id, "tenant")] {
            let notification = Notification::new(user_id, "Contrato cancelado", "O contrato foi cancelado e as parcelas em aberto foram canceladas.")
                .with_link(format!("/contracts/{}", contract.id));
            self.notifications
                .enqueue(&format!("contract:{}:CANCELLED:{}", contract.id, role), notification)
                .await?;
        }

        tracing::info!(
            contract_id = %id,
            cancelled_orders = cancelled.len(),
            charges_cancelled,
            charge_cancel_failures,
            "Contrato cancelado"
        );

        Ok(Cancellation {
            contract,
            cancelled_orders: cancelled.into_iter().map(|c| c.order).collect(),
            charges_cancelled,
            charge_cancel_failures,
        })
    }

    /// ACTIVE -> FINISHED para contratos vencidos e quitados.
    pub async fn finish_expired(&self, today: NaiveDate) -> Result<Vec<Contract>, AppError> {
        let mut finished = Vec::new();
        for contract in self.store.list_finishable_contracts(today).await? {
            if let Some(done) = self
                .store
                .set_contract_status(contract.id, &[ContractStatus::Active], ContractStatus::Finished)
                .await?
            {
                tracing::info!(contract_id = %done.id, "Contrato encerrado");
                finished.push(done);
            }
        }
        Ok(finished)
    }
}

/// Parcelas 1..=N com vencimento em início + i meses e valor congelado.
pub fn build_payment_orders(contract: &Contract) -> Result<Vec<NewPaymentOrder>, AppError> {
    let count = u32::try_from(contract.duration_in_months)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| AppError::InvalidState(format!("contrato {} com duração inválida", contract.id)))?;

    let amount_due = contract.monthly_amount();
    (1..=count)
        .map(|i| {
            let due_date = contract
                .due_date_for(i)
                .ok_or_else(|| AppError::InvalidState("vencimento fora do calendário".to_string()))?;
            Ok(NewPaymentOrder {
                contract_id: contract.id,
                installment: i as i32,
                due_date,
                amount_due,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn contract(start: NaiveDate, months: i32) -> Contract {
        Contract {
            id: Uuid::new_v4(),
            status: ContractStatus::AwaitingSignatures,
            start_date: start,
            end_date: start,
            duration_in_months: months,
            rent_amount: dec!(1200),
            condo_fee: dec!(250),
            iptu_fee: dec!(50),
            landlord_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            billing_type: Default::default(),
            gateway_customer_id: None,
            signature_envelope_id: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn orders_are_monthly_and_frozen() {
        let c = contract(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(), 3);
        let orders = build_payment_orders(&c).unwrap();

        let dues: Vec<_> = orders.iter().map(|o| o.due_date).collect();
        assert_eq!(
            dues,
            vec![
                NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
                NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
            ]
        );
        assert!(orders.iter().all(|o| o.amount_due == dec!(1500)));
        assert_eq!(orders.iter().map(|o| o.installment).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn zero_duration_is_rejected() {
        let c = contract(NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(), 0);
        assert!(matches!(build_payment_orders(&c), Err(AppError::InvalidState(_))));
    }
}
