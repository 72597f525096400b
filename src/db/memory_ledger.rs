// src/db/memory_ledger.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ledger_store::{LedgerStore, SubAccountStatusChange, TransferSettlement},
    models::{
        contract::{Contract, ContractStatus, NewContract},
        payment::{
            CancelledOrder, Charge, NewCharge, NewPaymentOrder, NewTransfer, PaymentOrder, PaymentOrderStatus,
            PaymentReceipt, Transfer, TransferStatus,
        },
        sub_account::{ContractArtifact, NewSubAccount, PayeeSubAccount, SubAccountStatusSnapshot},
    },
};

#[derive(Default)]
struct Tables {
    contracts: HashMap<Uuid, Contract>,
    orders: HashMap<Uuid, PaymentOrder>,
    // Indexadas pela parcela (1:1)
    charges: HashMap<Uuid, Charge>,
    transfers: HashMap<Uuid, Transfer>,
    // Indexada pelo proprietário (1:1)
    sub_accounts: HashMap<Uuid, PayeeSubAccount>,
    artifacts: Vec<ContractArtifact>,
}

/// Livro-razão em memória, thread-safe.
///
/// Cada operação segura o lock de escrita do começo ao fim, então a guarda de
/// status e a escrita acontecem de forma atômica, como o `UPDATE ... WHERE status`
/// do Postgres. Usado nos testes e com `STORAGE_BACKEND=memory`.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn touch_order(order: &mut PaymentOrder, now: DateTime<Utc>) {
    order.version += 1;
    order.updated_at = now;
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    async fn create_contract(&self, new: &NewContract, end_date: NaiveDate) -> Result<Contract, AppError> {
        let mut t = self.tables.write().await;

        if let Some(envelope) = new.signature_envelope_id.as_deref() {
            if t.contracts.values().any(|c| c.signature_envelope_id.as_deref() == Some(envelope)) {
                return Err(AppError::AlreadyExists(
                    "envelope de assinatura já vinculado a outro contrato".to_string(),
                ));
            }
        }

        let now = Utc::now();
        let contract = Contract {
            id: Uuid::new_v4(),
            status: ContractStatus::PendingDocs,
            start_date: new.start_date,
            end_date,
            duration_in_months: new.duration_in_months,
            rent_amount: new.rent_amount,
            condo_fee: new.condo_fee,
            iptu_fee: new.iptu_fee,
            landlord_id: new.landlord_id,
            tenant_id: new.tenant_id,
            property_id: new.property_id,
            billing_type: new.billing_type,
            gateway_customer_id: new.gateway_customer_id.clone(),
            signature_envelope_id: new.signature_envelope_id.clone(),
            version: 1,
            created_at: now,
            updated_at: now,
        };
        t.contracts.insert(contract.id, contract.clone());
        Ok(contract)
    }

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
        let t = self.tables.read().await;
        Ok(t.contracts.get(&id).cloned())
    }

    async fn find_contract_by_envelope(&self, envelope_id: &str) -> Result<Option<Contract>, AppError> {
        let t = self.tables.read().await;
        Ok(t
            .contracts
            .values()
            .find(|c| c.signature_envelope_id.as_deref() == Some(envelope_id))
            .cloned())
    }

    async fn set_contract_status(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        to: ContractStatus,
    ) -> Result<Option<Contract>, AppError> {
        let mut t = self.tables.write().await;
        match t.contracts.get_mut(&id) {
            Some(c) if from.contains(&c.status) => {
                c.status = to;
                c.version += 1;
                c.updated_at = Utc::now();
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn activate_contract(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        orders: Vec<NewPaymentOrder>,
    ) -> Result<Option<(Contract, Vec<PaymentOrder>)>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        let contract = match t.contracts.get_mut(&id) {
            Some(c) if from.contains(&c.status) => {
                c.status = ContractStatus::Active;
                c.version += 1;
                c.updated_at = now;
                c.clone()
            }
            _ => return Ok(None),
        };

        // Mesma regra do UNIQUE (contract_id, installment)
        if t.orders.values().any(|o| o.contract_id == id) {
            return Err(AppError::AlreadyExists("parcelas já geradas para este contrato".to_string()));
        }

        let mut created = Vec::with_capacity(orders.len());
        for order in orders {
            let row = PaymentOrder {
                id: Uuid::new_v4(),
                contract_id: order.contract_id,
                installment: order.installment,
                due_date: order.due_date,
                amount_due: order.amount_due,
                amount_paid: None,
                net_value: None,
                paid_at: None,
                status: PaymentOrderStatus::Pending,
                version: 1,
                created_at: now,
                updated_at: now,
            };
            t.orders.insert(row.id, row.clone());
            created.push(row);
        }

        Ok(Some((contract, created)))
    }

    async fn cancel_contract(&self, id: Uuid) -> Result<Option<(Contract, Vec<CancelledOrder>)>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        let contract = match t.contracts.get_mut(&id) {
            Some(c) if ContractStatus::CANCELLABLE.contains(&c.status) => {
                c.status = ContractStatus::Cancelled;
                c.version += 1;
                c.updated_at = now;
                c.clone()
            }
            _ => return Ok(None),
        };

        let mut cancelled_orders = Vec::new();
        for order in t.orders.values_mut().filter(|o| o.contract_id == id && o.status.is_open()) {
            order.status = PaymentOrderStatus::Cancelled;
            touch_order(order, now);
            cancelled_orders.push(order.clone());
        }
        cancelled_orders.sort_by_key(|o| o.installment);

        let cancelled = cancelled_orders
            .into_iter()
            .map(|order| {
                let charge = t.charges.get(&order.id).filter(|c| c.is_live()).cloned();
                CancelledOrder { order, charge }
            })
            .collect();

        Ok(Some((contract, cancelled)))
    }

    async fn list_finishable_contracts(&self, today: NaiveDate) -> Result<Vec<Contract>, AppError> {
        let t = self.tables.read().await;
        let mut contracts: Vec<Contract> = t
            .contracts
            .values()
            .filter(|c| c.status == ContractStatus::Active && c.end_date <= today)
            .filter(|c| !t.orders.values().any(|o| o.contract_id == c.id && o.status.is_open()))
            .cloned()
            .collect();
        contracts.sort_by_key(|c| c.end_date);
        Ok(contracts)
    }

    // =========================================================================
    //  PARCELAS
    // =========================================================================

    async fn get_payment_order(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let t = self.tables.read().await;
        Ok(t.orders.get(&id).cloned())
    }

    async fn list_payment_orders(&self, contract_id: Uuid) -> Result<Vec<PaymentOrder>, AppError> {
        let t = self.tables.read().await;
        let mut orders: Vec<PaymentOrder> =
            t.orders.values().filter(|o| o.contract_id == contract_id).cloned().collect();
        orders.sort_by_key(|o| o.installment);
        Ok(orders)
    }

    async fn find_payment_order_by_charge(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<(PaymentOrder, Charge)>, AppError> {
        let t = self.tables.read().await;
        let found = t
            .charges
            .values()
            .find(|c| c.external_charge_id == external_charge_id)
            .and_then(|charge| t.orders.get(&charge.payment_order_id).map(|o| (o.clone(), charge.clone())));
        Ok(found)
    }

    async fn record_payment(&self, id: Uuid, receipt: &PaymentReceipt) -> Result<Option<PaymentOrder>, AppError> {
        let mut t = self.tables.write().await;
        match t.orders.get_mut(&id) {
            Some(o) if o.status.is_open() => {
                o.status = PaymentOrderStatus::Paid;
                o.amount_paid = Some(receipt.amount_paid);
                o.net_value = Some(receipt.net_value);
                o.paid_at = Some(receipt.paid_at);
                touch_order(o, Utc::now());
                Ok(Some(o.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revert_payment(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let mut t = self.tables.write().await;
        if t.transfers.contains_key(&id) {
            return Ok(None);
        }
        match t.orders.get_mut(&id) {
            Some(o) if o.status == PaymentOrderStatus::Paid => {
                o.status = PaymentOrderStatus::Pending;
                o.amount_paid = None;
                o.net_value = None;
                o.paid_at = None;
                touch_order(o, Utc::now());
                Ok(Some(o.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_order_overdue(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let mut t = self.tables.write().await;
        match t.orders.get_mut(&id) {
            Some(o) if o.status == PaymentOrderStatus::Pending => {
                o.status = PaymentOrderStatus::Overdue;
                touch_order(o, Utc::now());
                Ok(Some(o.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentOrder>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let mut marked = Vec::new();
        for o in t
            .orders
            .values_mut()
            .filter(|o| o.status == PaymentOrderStatus::Pending && o.due_date < today)
        {
            o.status = PaymentOrderStatus::Overdue;
            touch_order(o, now);
            marked.push(o.clone());
        }
        marked.sort_by_key(|o| o.due_date);
        Ok(marked)
    }

    async fn list_chargeable_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PaymentOrder>, AppError> {
        let t = self.tables.read().await;
        let mut orders: Vec<PaymentOrder> = t
            .orders
            .values()
            .filter(|o| o.status == PaymentOrderStatus::Pending && o.due_date >= from && o.due_date <= to)
            .filter(|o| {
                t.contracts
                    .get(&o.contract_id)
                    .is_some_and(|c| c.status == ContractStatus::Active)
            })
            .filter(|o| !t.charges.get(&o.id).is_some_and(|c| c.is_live()))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.due_date);
        Ok(orders)
    }

    // =========================================================================
    //  COBRANÇAS
    // =========================================================================

    async fn get_charge_for_order(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let t = self.tables.read().await;
        Ok(t.charges.get(&payment_order_id).cloned())
    }

    async fn attach_charge(&self, new: NewCharge) -> Result<Option<Charge>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        match t.orders.get(&new.payment_order_id) {
            Some(o) if o.status == PaymentOrderStatus::Pending => {}
            _ => return Ok(None),
        }

        if t.charges.get(&new.payment_order_id).is_some_and(|c| c.is_live()) {
            return Err(AppError::AlreadyExists(format!(
                "a parcela {} já possui cobrança",
                new.payment_order_id
            )));
        }
        if t
            .charges
            .values()
            .any(|c| c.external_charge_id == new.external_charge_id && c.payment_order_id != new.payment_order_id)
        {
            return Err(AppError::AlreadyExists("cobrança externa já registrada".to_string()));
        }

        let (id, version, created_at) = match t.charges.get(&new.payment_order_id) {
            Some(old) => (old.id, old.version + 1, old.created_at),
            None => (Uuid::new_v4(), 1, now),
        };

        let charge = Charge {
            id,
            payment_order_id: new.payment_order_id,
            external_charge_id: new.external_charge_id,
            billing_type: new.billing_type,
            invoice_url: new.invoice_url,
            bank_slip_url: new.bank_slip_url,
            pix_payload: new.pix_payload,
            due_date: new.due_date,
            deleted_at: None,
            version,
            created_at,
            updated_at: now,
        };

        if let Some(o) = t.orders.get_mut(&new.payment_order_id) {
            touch_order(o, now);
        }
        t.charges.insert(charge.payment_order_id, charge.clone());
        Ok(Some(charge))
    }

    async fn detach_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let mut t = self.tables.write().await;
        match t.charges.get_mut(&payment_order_id) {
            Some(c) if c.is_live() => {
                let now = Utc::now();
                c.deleted_at = Some(now);
                c.version += 1;
                c.updated_at = now;
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn restore_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let mut t = self.tables.write().await;
        match t.charges.get_mut(&payment_order_id) {
            Some(c) if !c.is_live() => {
                c.deleted_at = None;
                c.version += 1;
                c.updated_at = Utc::now();
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }

    // =========================================================================
    //  REPASSES
    // =========================================================================

    async fn get_transfer_for_order(&self, payment_order_id: Uuid) -> Result<Option<Transfer>, AppError> {
        let t = self.tables.read().await;
        Ok(t.transfers.get(&payment_order_id).cloned())
    }

    async fn find_transfer_by_external(&self, external_transfer_id: &str) -> Result<Option<Transfer>, AppError> {
        let t = self.tables.read().await;
        Ok(t
            .transfers
            .values()
            .find(|tr| tr.external_transfer_id == external_transfer_id)
            .cloned())
    }

    async fn begin_payout(&self, new: NewTransfer) -> Result<Option<(PaymentOrder, Transfer)>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        match t.orders.get(&new.payment_order_id) {
            Some(o) if o.status == PaymentOrderStatus::Paid => {}
            _ => return Ok(None),
        }

        let (id, version, created_at) = match t.transfers.get(&new.payment_order_id) {
            Some(existing) if !existing.status.is_failure() => {
                return Err(AppError::AlreadyExists(format!(
                    "a parcela {} já possui repasse ativo",
                    new.payment_order_id
                )));
            }
            Some(existing) => (existing.id, existing.version + 1, existing.created_at),
            None => (Uuid::new_v4(), 1, now),
        };

        let transfer = Transfer {
            id,
            payment_order_id: new.payment_order_id,
            external_transfer_id: new.external_transfer_id,
            status: TransferStatus::Pending,
            value: new.value,
            effective_date: None,
            fail_reason: None,
            version,
            created_at,
            updated_at: now,
        };
        t.transfers.insert(transfer.payment_order_id, transfer.clone());

        let order = match t.orders.get_mut(&new.payment_order_id) {
            Some(o) => {
                o.status = PaymentOrderStatus::PayoutPending;
                touch_order(o, now);
                o.clone()
            }
            None => return Ok(None),
        };

        Ok(Some((order, transfer)))
    }

    async fn settle_transfer(
        &self,
        transfer_id: Uuid,
        effective_date: Option<NaiveDate>,
    ) -> Result<Option<TransferSettlement>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        let transfer = match t.transfers.values_mut().find(|tr| tr.id == transfer_id) {
            Some(tr) if tr.status == TransferStatus::Pending => {
                tr.status = TransferStatus::Done;
                tr.effective_date = Some(effective_date.unwrap_or_else(|| now.date_naive()));
                tr.version += 1;
                tr.updated_at = now;
                tr.clone()
            }
            _ => return Ok(None),
        };

        let order = match t.orders.get_mut(&transfer.payment_order_id) {
            Some(o) if o.status == PaymentOrderStatus::PayoutPending => {
                o.status = PaymentOrderStatus::Received;
                touch_order(o, now);
                Some(o.clone())
            }
            _ => None,
        };

        Ok(Some(TransferSettlement { transfer, order }))
    }

    async fn fail_transfer(
        &self,
        transfer_id: Uuid,
        status: TransferStatus,
        reason: Option<&str>,
    ) -> Result<Option<TransferSettlement>, AppError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();

        let transfer = match t.transfers.values_mut().find(|tr| tr.id == transfer_id) {
            Some(tr) if tr.status == TransferStatus::Pending => {
                tr.status = status;
                tr.fail_reason = reason.map(str::to_string);
                tr.version += 1;
                tr.updated_at = now;
                tr.clone()
            }
            _ => return Ok(None),
        };

        let order = match t.orders.get_mut(&transfer.payment_order_id) {
            Some(o) if o.status == PaymentOrderStatus::PayoutPending => {
                o.status = PaymentOrderStatus::Paid;
                touch_order(o, now);
                Some(o.clone())
            }
            _ => None,
        };

        Ok(Some(TransferSettlement { transfer, order }))
    }

    // =========================================================================
    //  SUBCONTAS
    // =========================================================================

    async fn get_sub_account_by_landlord(&self, landlord_id: Uuid) -> Result<Option<PayeeSubAccount>, AppError> {
        let t = self.tables.read().await;
        Ok(t.sub_accounts.get(&landlord_id).cloned())
    }

    async fn find_sub_account_by_external(&self, external_account_id: &str) -> Result<Option<PayeeSubAccount>, AppError> {
        let t = self.tables.read().await;
        Ok(t
            .sub_accounts
            .values()
            .find(|a| a.external_account_id == external_account_id)
            .cloned())
    }

    async fn insert_sub_account(&self, new: NewSubAccount) -> Result<Option<PayeeSubAccount>, AppError> {
        let mut t = self.tables.write().await;
        if t.sub_accounts.contains_key(&new.landlord_id) {
            return Ok(None);
        }
        if t.sub_accounts.values().any(|a| a.external_account_id == new.external_account_id) {
            return Err(AppError::AlreadyExists(
                "conta externa já vinculada a outro proprietário".to_string(),
            ));
        }

        let now = Utc::now();
        let account = PayeeSubAccount {
            id: Uuid::new_v4(),
            landlord_id: new.landlord_id,
            external_account_id: new.external_account_id,
            api_key: new.api_key,
            external_wallet_id: new.external_wallet_id,
            payout_key: None,
            platform_fee_percent: None,
            status_general: None,
            status_documentation: None,
            status_commercial_info: None,
            status_bank_account_info: None,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        t.sub_accounts.insert(account.landlord_id, account.clone());
        Ok(Some(account))
    }

    async fn update_sub_account_status(
        &self,
        external_account_id: &str,
        snapshot: &SubAccountStatusSnapshot,
    ) -> Result<Option<SubAccountStatusChange>, AppError> {
        let mut t = self.tables.write().await;
        let Some(account) = t
            .sub_accounts
            .values_mut()
            .find(|a| a.external_account_id == external_account_id)
        else {
            return Ok(None);
        };

        let previous = SubAccountStatusSnapshot {
            general: account.status_general.take(),
            documentation: account.status_documentation.take(),
            commercial_info: account.status_commercial_info.take(),
            bank_account_info: account.status_bank_account_info.take(),
        };

        account.status_general = snapshot.general.clone();
        account.status_documentation = snapshot.documentation.clone();
        account.status_commercial_info = snapshot.commercial_info.clone();
        account.status_bank_account_info = snapshot.bank_account_info.clone();
        account.version += 1;
        account.updated_at = Utc::now();

        Ok(Some(SubAccountStatusChange { previous, account: account.clone() }))
    }

    async fn set_payout_key(&self, landlord_id: Uuid, payout_key: &str) -> Result<Option<PayeeSubAccount>, AppError> {
        let mut t = self.tables.write().await;
        match t.sub_accounts.get_mut(&landlord_id) {
            Some(a) => {
                a.payout_key = Some(payout_key.to_string());
                a.version += 1;
                a.updated_at = Utc::now();
                Ok(Some(a.clone()))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    //  ARTEFATOS
    // =========================================================================

    async fn register_artifact(
        &self,
        contract_id: Uuid,
        storage_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ContractArtifact, AppError> {
        let mut t = self.tables.write().await;
        let artifact = ContractArtifact {
            id: Uuid::new_v4(),
            contract_id,
            storage_key: storage_key.to_string(),
            expires_at,
            expired: false,
            created_at: Utc::now(),
        };
        t.artifacts.push(artifact.clone());
        Ok(artifact)
    }

    async fn expire_artifacts(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let mut t = self.tables.write().await;
        let mut count = 0;
        for artifact in t.artifacts.iter_mut().filter(|a| !a.expired && a.expires_at <= now) {
            artifact.expired = true;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    async fn seeded_order(store: &InMemoryLedgerStore) -> PaymentOrder {
        let new = NewContract {
            start_date: NaiveDate::from_ymd_opt(2030, 1, 10).unwrap(),
            duration_in_months: 1,
            rent_amount: dec!(1000),
            condo_fee: dec!(0),
            iptu_fee: dec!(0),
            landlord_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            billing_type: Default::default(),
            gateway_customer_id: None,
            signature_envelope_id: None,
        };
        let contract = store.create_contract(&new, new.start_date).await.unwrap();
        let orders = vec![NewPaymentOrder {
            contract_id: contract.id,
            installment: 1,
            due_date: NaiveDate::from_ymd_opt(2030, 2, 10).unwrap(),
            amount_due: dec!(1000),
        }];
        let (_, mut created) = store
            .activate_contract(contract.id, &ContractStatus::PRE_ACTIVE, orders)
            .await
            .unwrap()
            .unwrap();
        created.remove(0)
    }

    #[tokio::test]
    async fn guarded_payment_write_applies_once() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store).await;
        let receipt = PaymentReceipt { amount_paid: dec!(1000), net_value: dec!(990), paid_at: Utc::now() };

        let first = store.record_payment(order.id, &receipt).await.unwrap();
        let second = store.record_payment(order.id, &receipt).await.unwrap();

        assert_eq!(first.unwrap().status, PaymentOrderStatus::Paid);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn revert_is_blocked_once_a_transfer_exists() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store).await;
        let receipt = PaymentReceipt { amount_paid: dec!(1000), net_value: dec!(990), paid_at: Utc::now() };
        store.record_payment(order.id, &receipt).await.unwrap();
        store
            .begin_payout(NewTransfer { payment_order_id: order.id, external_transfer_id: "tr_1".into(), value: dec!(940) })
            .await
            .unwrap()
            .unwrap();

        assert!(store.revert_payment(order.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn second_live_charge_is_a_conflict() {
        let store = InMemoryLedgerStore::new();
        let order = seeded_order(&store).await;
        let charge = |ext: &str| NewCharge {
            payment_order_id: order.id,
            external_charge_id: ext.to_string(),
            billing_type: Default::default(),
            invoice_url: None,
            bank_slip_url: None,
            pix_payload: None,
            due_date: order.due_date,
        };

        store.attach_charge(charge("pay_1")).await.unwrap().unwrap();
        let err = store.attach_charge(charge("pay_2")).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyExists(_)));

        // Depois de apagada no gateway, pode ser substituída
        store.detach_charge(order.id).await.unwrap().unwrap();
        let replaced = store.attach_charge(charge("pay_3")).await.unwrap().unwrap();
        assert_eq!(replaced.external_charge_id, "pay_3");
        assert!(replaced.is_live());
    }
}
