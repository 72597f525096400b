// src/services/charge_service.rs

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    config::FeePolicy,
    db::LedgerStore,
    gateway::{CreateChargeRequest, PaymentGateway, SplitRule},
    models::{
        contract::ContractStatus,
        payment::{BillingType, Charge, NewCharge, PaymentOrderStatus},
    },
};

// Encargos por atraso repassados ao gateway
const LATE_FINE_PERCENT: Decimal = Decimal::TWO;
const MONTHLY_INTEREST_PERCENT: Decimal = Decimal::ONE;

/// Regra de split: a comissão da plataforma vai para a carteira da plataforma.
/// `fee_percent` é fração (0.05); o gateway espera pontos percentuais (5).
pub fn split_for(fees: &FeePolicy, fee_percent: Decimal) -> Vec<SplitRule> {
    match fees.platform_wallet_id.as_deref() {
        Some(wallet) if fee_percent > Decimal::ZERO => vec![SplitRule {
            wallet_id: wallet.to_string(),
            percentual_value: (fee_percent * Decimal::ONE_HUNDRED).normalize(),
        }],
        _ => Vec::new(),
    }
}

#[derive(Clone)]
pub struct ChargeIssuer {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    fees: FeePolicy,
}

impl ChargeIssuer {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>, fees: FeePolicy) -> Self {
        Self { store, gateway, fees }
    }

    pub async fn issue_charge(
        &self,
        payment_order_id: Uuid,
        billing_type: Option<BillingType>,
    ) -> Result<Charge, AppError> {
        self.issue_charge_on(payment_order_id, billing_type, Utc::now().date_naive()).await
    }

    /// Emite a cobrança da parcela. Todas as pré-condições são checadas
    /// antes de qualquer chamada externa.
    pub async fn issue_charge_on(
        &self,
        payment_order_id: Uuid,
        billing_type: Option<BillingType>,
        today: NaiveDate,
    ) -> Result<Charge, AppError> {
        let order = self
            .store
            .get_payment_order(payment_order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("parcela {}", payment_order_id)))?;

        if order.status != PaymentOrderStatus::Pending {
            return Err(AppError::InvalidState(format!(
                "parcela {} está {}, só parcelas PENDING são cobradas",
                order.id,
                order.status.as_str()
            )));
        }

        if let Some(existing) = self.store.get_charge_for_order(order.id).await? {
            if existing.is_live() {
                return Err(AppError::AlreadyExists(format!(
                    "a parcela {} já possui a cobrança {}",
                    order.id, existing.external_charge_id
                )));
            }
        }

        let contract = self
            .store
            .get_contract(order.contract_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("contrato {}", order.contract_id)))?;
        if contract.status != ContractStatus::Active {
            return Err(AppError::InvalidState(format!("contrato {} não está ativo", contract.id)));
        }

        let sub_account = self.store.get_sub_account_by_landlord(contract.landlord_id).await?;
        let Some((api_key, _wallet)) = sub_account.as_ref().and_then(|a| a.billing_credentials()) else {
            return Err(AppError::PrerequisiteMissing(format!(
                "proprietário {} sem subconta habilitada para cobranças",
                contract.landlord_id
            )));
        };

        if order.due_date < today {
            return Err(AppError::InvalidState(format!(
                "vencimento {} da parcela {} já passou",
                order.due_date, order.id
            )));
        }

        let Some(customer_id) = contract.gateway_customer_id.clone() else {
            return Err(AppError::PrerequisiteMissing(format!(
                "inquilino do contrato {} sem cadastro no gateway",
                contract.id
            )));
        };

        let fee_percent = sub_account
            .as_ref()
            .map(|a| a.fee_percent_or(self.fees.default_percent))
            .unwrap_or(self.fees.default_percent);
        let billing_type = billing_type.unwrap_or(contract.billing_type);

        let request = CreateChargeRequest {
            customer_id,
            billing_type,
            // Congelado na parcela; não recalcular a partir do contrato
            value: order.amount_due,
            due_date: order.due_date,
            description: format!(
                "Aluguel parcela {}/{} - vencimento {}",
                order.installment,
                contract.duration_in_months,
                order.due_date.format("%d/%m/%Y")
            ),
            external_reference: order.id,
            fine_percent: LATE_FINE_PERCENT,
            interest_percent_per_month: MONTHLY_INTEREST_PERCENT,
            split: split_for(&self.fees, fee_percent),
        };

        let remote = self.gateway.create_charge(api_key, request).await?;

        let attached = self
            .store
            .attach_charge(NewCharge {
                payment_order_id: order.id,
                external_charge_id: remote.id.clone(),
                billing_type,
                invoice_url: remote.invoice_url,
                bank_slip_url: remote.bank_slip_url,
                pix_payload: remote.pix_payload,
                due_date: order.due_date,
            })
            .await;

        match attached {
            Ok(Some(charge)) => {
                tracing::info!(
                    payment_order_id = %order.id,
                    charge_id = %charge.external_charge_id,
                    value = %order.amount_due,
                    "Cobrança emitida"
                );
                Ok(charge)
            }
            Ok(None) => {
                self.cancel_orphan(api_key, &remote.id, order.id).await;
                Err(AppError::InvalidState(format!("parcela {} deixou de estar PENDING", order.id)))
            }
            Err(e) => {
                // Outra emissão concorrente venceu, ou a gravação falhou
                self.cancel_orphan(api_key, &remote.id, order.id).await;
                Err(e)
            }
        }
    }

    async fn cancel_orphan(&self, api_key: &str, charge_id: &str, payment_order_id: Uuid) {
        match self.gateway.cancel_charge(api_key, charge_id).await {
            Ok(()) => tracing::warn!(%payment_order_id, charge_id, "Cobrança órfã cancelada no gateway"),
            Err(e) => tracing::error!(
                %payment_order_id,
                charge_id,
                error = %e,
                "Cobrança órfã não pôde ser cancelada; conciliar manualmente"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn split_uses_percentage_points() {
        let fees = FeePolicy { default_percent: dec!(0.05), platform_wallet_id: Some("wallet_plat".into()) };
        let split = split_for(&fees, dec!(0.05));
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].wallet_id, "wallet_plat");
        assert_eq!(split[0].percentual_value, dec!(5));
    }

    #[test]
    fn no_split_without_platform_wallet_or_fee() {
        let fees = FeePolicy { default_percent: dec!(0.05), platform_wallet_id: None };
        assert!(split_for(&fees, dec!(0.05)).is_empty());

        let fees = FeePolicy { default_percent: dec!(0.05), platform_wallet_id: Some("w".into()) };
        assert!(split_for(&fees, Decimal::ZERO).is_empty());
    }
}
