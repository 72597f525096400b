// src/db/ledger_store.rs
//
// Porta do livro-razão. Toda escrita é condicional ao status anterior esperado
// (UPDATE ... WHERE id = ? AND status = ?): `Ok(None)` significa que a guarda
// não bateu, ou seja, outra entrega do mesmo evento já aplicou a transição.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        contract::{Contract, ContractStatus, NewContract},
        payment::{
            CancelledOrder, Charge, NewCharge, NewPaymentOrder, NewTransfer, PaymentOrder, PaymentReceipt,
            Transfer, TransferStatus,
        },
        sub_account::{ContractArtifact, NewSubAccount, PayeeSubAccount, SubAccountStatusSnapshot},
    },
};

/// Resultado da atualização de status da subconta: o retrato anterior e o novo registro.
#[derive(Debug, Clone)]
pub struct SubAccountStatusChange {
    pub previous: SubAccountStatusSnapshot,
    pub account: PayeeSubAccount,
}

/// Resultado de um evento terminal de repasse.
/// `order` é `None` quando a parcela já não estava em PAYOUT_PENDING.
#[derive(Debug, Clone)]
pub struct TransferSettlement {
    pub transfer: Transfer,
    pub order: Option<PaymentOrder>,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    async fn create_contract(&self, new: &NewContract, end_date: NaiveDate) -> Result<Contract, AppError>;

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError>;

    async fn find_contract_by_envelope(&self, envelope_id: &str) -> Result<Option<Contract>, AppError>;

    async fn set_contract_status(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        to: ContractStatus,
    ) -> Result<Option<Contract>, AppError>;

    /// Ativa o contrato e cria TODAS as parcelas numa única transação.
    async fn activate_contract(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        orders: Vec<NewPaymentOrder>,
    ) -> Result<Option<(Contract, Vec<PaymentOrder>)>, AppError>;

    /// Cancela o contrato e suas parcelas em aberto (PENDING/OVERDUE) numa única transação.
    async fn cancel_contract(&self, id: Uuid) -> Result<Option<(Contract, Vec<CancelledOrder>)>, AppError>;

    /// Contratos ACTIVE já vencidos e sem parcelas em aberto.
    async fn list_finishable_contracts(&self, today: NaiveDate) -> Result<Vec<Contract>, AppError>;

    // =========================================================================
    //  PARCELAS (PaymentOrder)
    // =========================================================================

    async fn get_payment_order(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError>;

    async fn list_payment_orders(&self, contract_id: Uuid) -> Result<Vec<PaymentOrder>, AppError>;

    /// Resolve a parcela pela cobrança externa (inclusive cobranças apagadas).
    async fn find_payment_order_by_charge(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<(PaymentOrder, Charge)>, AppError>;

    /// PENDING|OVERDUE -> PAID
    async fn record_payment(&self, id: Uuid, receipt: &PaymentReceipt) -> Result<Option<PaymentOrder>, AppError>;

    /// PAID -> PENDING, somente se ainda não existe repasse.
    async fn revert_payment(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError>;

    /// PENDING -> OVERDUE para uma parcela específica (evento do gateway).
    async fn mark_order_overdue(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError>;

    /// PENDING -> OVERDUE para tudo que venceu antes de `today` (job diário).
    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentOrder>, AppError>;

    /// Parcelas PENDING de contratos ACTIVE, sem cobrança viva, vencendo em [from, to].
    async fn list_chargeable_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PaymentOrder>, AppError>;

    // =========================================================================
    //  COBRANÇAS
    // =========================================================================

    async fn get_charge_for_order(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError>;

    /// Grava a cobrança junto com um "touch" (versão) da parcela PENDING.
    /// `Ok(None)`: a parcela não está mais PENDING.
    /// `Err(AlreadyExists)`: já existe cobrança viva para a parcela.
    async fn attach_charge(&self, new: NewCharge) -> Result<Option<Charge>, AppError>;

    /// Marca a cobrança viva como apagada (soft delete).
    async fn detach_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError>;

    async fn restore_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError>;

    // =========================================================================
    //  REPASSES (Transfer)
    // =========================================================================

    async fn get_transfer_for_order(&self, payment_order_id: Uuid) -> Result<Option<Transfer>, AppError>;

    async fn find_transfer_by_external(&self, external_transfer_id: &str) -> Result<Option<Transfer>, AppError>;

    /// PAID -> PAYOUT_PENDING + repasse PENDING, numa transação.
    /// Reaproveita a linha de um repasse FAILED/CANCELLED (no máximo um por parcela).
    /// `Ok(None)`: a parcela não está PAID. `Err(AlreadyExists)`: há repasse ativo.
    async fn begin_payout(&self, new: NewTransfer) -> Result<Option<(PaymentOrder, Transfer)>, AppError>;

    /// Repasse PENDING -> DONE; parcela PAYOUT_PENDING -> RECEIVED.
    async fn settle_transfer(
        &self,
        transfer_id: Uuid,
        effective_date: Option<NaiveDate>,
    ) -> Result<Option<TransferSettlement>, AppError>;

    /// Repasse PENDING -> FAILED|CANCELLED; parcela PAYOUT_PENDING -> PAID.
    async fn fail_transfer(
        &self,
        transfer_id: Uuid,
        status: TransferStatus,
        reason: Option<&str>,
    ) -> Result<Option<TransferSettlement>, AppError>;

    // =========================================================================
    //  SUBCONTAS
    // =========================================================================

    async fn get_sub_account_by_landlord(&self, landlord_id: Uuid) -> Result<Option<PayeeSubAccount>, AppError>;

    async fn find_sub_account_by_external(&self, external_account_id: &str) -> Result<Option<PayeeSubAccount>, AppError>;

    /// `Ok(None)` quando o proprietário já tem subconta (corrida de provisionamento).
    async fn insert_sub_account(&self, new: NewSubAccount) -> Result<Option<PayeeSubAccount>, AppError>;

    /// Sobrescreve os status (retrato, não delta).
    async fn update_sub_account_status(
        &self,
        external_account_id: &str,
        snapshot: &SubAccountStatusSnapshot,
    ) -> Result<Option<SubAccountStatusChange>, AppError>;

    async fn set_payout_key(&self, landlord_id: Uuid, payout_key: &str) -> Result<Option<PayeeSubAccount>, AppError>;

    // =========================================================================
    //  ARTEFATOS
    // =========================================================================

    async fn register_artifact(
        &self,
        contract_id: Uuid,
        storage_key: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<ContractArtifact, AppError>;

    async fn expire_artifacts(&self, now: DateTime<Utc>) -> Result<u64, AppError>;
}
