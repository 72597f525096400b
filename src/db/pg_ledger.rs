// src/db/pg_ledger.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::ledger_store::{LedgerStore, SubAccountStatusChange, TransferSettlement},
    models::{
        contract::{Contract, ContractStatus, NewContract},
        payment::{
            CancelledOrder, Charge, NewCharge, NewPaymentOrder, NewTransfer, PaymentOrder, PaymentReceipt,
            Transfer, TransferStatus,
        },
        sub_account::{ContractArtifact, NewSubAccount, PayeeSubAccount, SubAccountStatusSnapshot},
    },
};

/// Converte violação de chave única em `AlreadyExists`; o resto vira erro de banco.
fn unique_as_conflict(e: sqlx::Error, what: &str) -> AppError {
    if let Some(db_err) = e.as_database_error() {
        if db_err.is_unique_violation() {
            return AppError::AlreadyExists(what.to_string());
        }
    }
    AppError::DatabaseError(e)
}

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    // =========================================================================
    //  CONTRATOS
    // =========================================================================

    async fn create_contract(&self, new: &NewContract, end_date: NaiveDate) -> Result<Contract, AppError> {
        sqlx::query_as::<_, Contract>(
            r#"
            INSERT INTO contracts (
                start_date, end_date, duration_in_months,
                rent_amount, condo_fee, iptu_fee,
                landlord_id, tenant_id, property_id,
                billing_type, gateway_customer_id, signature_envelope_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(new.start_date)
        .bind(end_date)
        .bind(new.duration_in_months)
        .bind(new.rent_amount)
        .bind(new.condo_fee)
        .bind(new.iptu_fee)
        .bind(new.landlord_id)
        .bind(new.tenant_id)
        .bind(new.property_id)
        .bind(new.billing_type)
        .bind(new.gateway_customer_id.as_deref())
        .bind(new.signature_envelope_id.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_as_conflict(e, "envelope de assinatura já vinculado a outro contrato"))
    }

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, AppError> {
        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contract)
    }

    async fn find_contract_by_envelope(&self, envelope_id: &str) -> Result<Option<Contract>, AppError> {
        let contract = sqlx::query_as::<_, Contract>("SELECT * FROM contracts WHERE signature_envelope_id = $1")
            .bind(envelope_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(contract)
    }

    async fn set_contract_status(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        to: ContractStatus,
    ) -> Result<Option<Contract>, AppError> {
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.to_vec())
        .bind(to)
        .fetch_optional(&self.pool)
        .await?;
        Ok(contract)
    }

    async fn activate_contract(
        &self,
        id: Uuid,
        from: &[ContractStatus],
        orders: Vec<NewPaymentOrder>,
    ) -> Result<Option<(Contract, Vec<PaymentOrder>)>, AppError> {
        // 1. Inicia a transação: ou ativa e gera tudo, ou nada muda
        let mut tx = self.pool.begin().await?;

        // 2. Guarda: só ativa se ainda estiver num dos estados esperados
        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'ACTIVE', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.to_vec())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(contract) = contract else {
            tx.rollback().await?;
            return Ok(None);
        };

        // 3. Cria o conjunto completo de parcelas
        let mut created = Vec::with_capacity(orders.len());
        for order in orders {
            let row = sqlx::query_as::<_, PaymentOrder>(
                r#"
                INSERT INTO payment_orders (contract_id, installment, due_date, amount_due)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(order.contract_id)
            .bind(order.installment)
            .bind(order.due_date)
            .bind(order.amount_due)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| unique_as_conflict(e, "parcelas já geradas para este contrato"))?;
            created.push(row);
        }

        // 4. Commit
        tx.commit().await?;

        Ok(Some((contract, created)))
    }

    async fn cancel_contract(&self, id: Uuid) -> Result<Option<(Contract, Vec<CancelledOrder>)>, AppError> {
        let mut tx = self.pool.begin().await?;

        let contract = sqlx::query_as::<_, Contract>(
            r#"
            UPDATE contracts
            SET status = 'CANCELLED', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = ANY($2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(ContractStatus::CANCELLABLE.to_vec())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(contract) = contract else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Parcelas pagas (ou em repasse) ficam intactas
        let orders = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'CANCELLED', version = version + 1, updated_at = now()
            WHERE contract_id = $1 AND status IN ('PENDING', 'OVERDUE')
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let charges = sqlx::query_as::<_, Charge>(
            "SELECT * FROM charges WHERE payment_order_id = ANY($1) AND deleted_at IS NULL",
        )
        .bind(order_ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let cancelled = orders
            .into_iter()
            .map(|order| {
                let charge = charges.iter().find(|c| c.payment_order_id == order.id).cloned();
                CancelledOrder { order, charge }
            })
            .collect();

        Ok(Some((contract, cancelled)))
    }

    async fn list_finishable_contracts(&self, today: NaiveDate) -> Result<Vec<Contract>, AppError> {
        let contracts = sqlx::query_as::<_, Contract>(
            r#"
            SELECT c.* FROM contracts c
            WHERE c.status = 'ACTIVE'
              AND c.end_date <= $1
              AND NOT EXISTS (
                  SELECT 1 FROM payment_orders po
                  WHERE po.contract_id = c.id AND po.status IN ('PENDING', 'OVERDUE')
              )
            ORDER BY c.end_date ASC
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(contracts)
    }

    // =========================================================================
    //  PARCELAS
    // =========================================================================

    async fn get_payment_order(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let order = sqlx::query_as::<_, PaymentOrder>("SELECT * FROM payment_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(order)
    }

    async fn list_payment_orders(&self, contract_id: Uuid) -> Result<Vec<PaymentOrder>, AppError> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            "SELECT * FROM payment_orders WHERE contract_id = $1 ORDER BY installment ASC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn find_payment_order_by_charge(
        &self,
        external_charge_id: &str,
    ) -> Result<Option<(PaymentOrder, Charge)>, AppError> {
        let charge = sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE external_charge_id = $1")
            .bind(external_charge_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(charge) = charge else {
            return Ok(None);
        };

        let order = self.get_payment_order(charge.payment_order_id).await?;
        Ok(order.map(|o| (o, charge)))
    }

    async fn record_payment(&self, id: Uuid, receipt: &PaymentReceipt) -> Result<Option<PaymentOrder>, AppError> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'PAID', amount_paid = $2, net_value = $3, paid_at = $4,
                version = version + 1, updated_at = now()
            WHERE id = $1 AND status IN ('PENDING', 'OVERDUE')
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(receipt.amount_paid)
        .bind(receipt.net_value)
        .bind(receipt.paid_at)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn revert_payment(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders po
            SET status = 'PENDING', amount_paid = NULL, net_value = NULL, paid_at = NULL,
                version = po.version + 1, updated_at = now()
            WHERE po.id = $1
              AND po.status = 'PAID'
              AND NOT EXISTS (SELECT 1 FROM transfers t WHERE t.payment_order_id = po.id)
            RETURNING po.*
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn mark_order_overdue(&self, id: Uuid) -> Result<Option<PaymentOrder>, AppError> {
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'OVERDUE', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(order)
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<Vec<PaymentOrder>, AppError> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'OVERDUE', version = version + 1, updated_at = now()
            WHERE status = 'PENDING' AND due_date < $1
            RETURNING *
            "#,
        )
        .bind(today)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    async fn list_chargeable_orders(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<PaymentOrder>, AppError> {
        let orders = sqlx::query_as::<_, PaymentOrder>(
            r#"
            SELECT po.* FROM payment_orders po
            JOIN contracts c ON c.id = po.contract_id
            WHERE po.status = 'PENDING'
              AND c.status = 'ACTIVE'
              AND po.due_date BETWEEN $1 AND $2
              AND NOT EXISTS (
                  SELECT 1 FROM charges ch
                  WHERE ch.payment_order_id = po.id AND ch.deleted_at IS NULL
              )
            ORDER BY po.due_date ASC
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(orders)
    }

    // =========================================================================
    //  COBRANÇAS
    // =========================================================================

    async fn get_charge_for_order(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let charge = sqlx::query_as::<_, Charge>("SELECT * FROM charges WHERE payment_order_id = $1")
            .bind(payment_order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(charge)
    }

    async fn attach_charge(&self, new: NewCharge) -> Result<Option<Charge>, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. "Touch" da parcela: status inalterado, só a versão anda.
        //    Se ela saiu de PENDING no meio do caminho, não grava nada.
        let touched = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE payment_orders
            SET version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING id
            "#,
        )
        .bind(new.payment_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        if touched.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        // 2. Insere a cobrança. Uma cobrança apagada no gateway pode ser substituída;
        //    uma cobrança viva não (a cláusula WHERE do upsert não casa).
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            INSERT INTO charges (
                payment_order_id, external_charge_id, billing_type,
                invoice_url, bank_slip_url, pix_payload, due_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (payment_order_id) DO UPDATE
            SET external_charge_id = EXCLUDED.external_charge_id,
                billing_type = EXCLUDED.billing_type,
                invoice_url = EXCLUDED.invoice_url,
                bank_slip_url = EXCLUDED.bank_slip_url,
                pix_payload = EXCLUDED.pix_payload,
                due_date = EXCLUDED.due_date,
                deleted_at = NULL,
                version = charges.version + 1,
                updated_at = now()
            WHERE charges.deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(new.payment_order_id)
        .bind(&new.external_charge_id)
        .bind(new.billing_type)
        .bind(new.invoice_url.as_deref())
        .bind(new.bank_slip_url.as_deref())
        .bind(new.pix_payload.as_deref())
        .bind(new.due_date)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| unique_as_conflict(e, "cobrança externa já registrada"))?;

        let Some(charge) = charge else {
            tx.rollback().await?;
            return Err(AppError::AlreadyExists(format!(
                "a parcela {} já possui cobrança",
                new.payment_order_id
            )));
        };

        tx.commit().await?;
        Ok(Some(charge))
    }

    async fn detach_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET deleted_at = now(), version = version + 1, updated_at = now()
            WHERE payment_order_id = $1 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(payment_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(charge)
    }

    async fn restore_charge(&self, payment_order_id: Uuid) -> Result<Option<Charge>, AppError> {
        let charge = sqlx::query_as::<_, Charge>(
            r#"
            UPDATE charges
            SET deleted_at = NULL, version = version + 1, updated_at = now()
            WHERE payment_order_id = $1 AND deleted_at IS NOT NULL
            RETURNING *
            "#,
        )
        .bind(payment_order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(charge)
    }

    // =========================================================================
    //  REPASSES
    // =========================================================================

    async fn get_transfer_for_order(&self, payment_order_id: Uuid) -> Result<Option<Transfer>, AppError> {
        let transfer = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE payment_order_id = $1")
            .bind(payment_order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transfer)
    }

    async fn find_transfer_by_external(&self, external_transfer_id: &str) -> Result<Option<Transfer>, AppError> {
        let transfer = sqlx::query_as::<_, Transfer>("SELECT * FROM transfers WHERE external_transfer_id = $1")
            .bind(external_transfer_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(transfer)
    }

    async fn begin_payout(&self, new: NewTransfer) -> Result<Option<(PaymentOrder, Transfer)>, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. PAID -> PAYOUT_PENDING
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'PAYOUT_PENDING', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PAID'
            RETURNING *
            "#,
        )
        .bind(new.payment_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            tx.rollback().await?;
            return Ok(None);
        };

        // 2. Repasse PENDING (reaproveita a linha se o anterior falhou)
        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            INSERT INTO transfers (payment_order_id, external_transfer_id, value, status)
            VALUES ($1, $2, $3, 'PENDING')
            ON CONFLICT (payment_order_id) DO UPDATE
            SET external_transfer_id = EXCLUDED.external_transfer_id,
                value = EXCLUDED.value,
                status = 'PENDING',
                effective_date = NULL,
                fail_reason = NULL,
                version = transfers.version + 1,
                updated_at = now()
            WHERE transfers.status IN ('FAILED', 'CANCELLED')
            RETURNING *
            "#,
        )
        .bind(new.payment_order_id)
        .bind(&new.external_transfer_id)
        .bind(new.value)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| unique_as_conflict(e, "repasse externo já registrado"))?;

        let Some(transfer) = transfer else {
            tx.rollback().await?;
            return Err(AppError::AlreadyExists(format!(
                "a parcela {} já possui repasse ativo",
                new.payment_order_id
            )));
        };

        tx.commit().await?;
        Ok(Some((order, transfer)))
    }

    async fn settle_transfer(
        &self,
        transfer_id: Uuid,
        effective_date: Option<NaiveDate>,
    ) -> Result<Option<TransferSettlement>, AppError> {
        let mut tx = self.pool.begin().await?;

        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET status = 'DONE', effective_date = COALESCE($2, CURRENT_DATE),
                version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(transfer_id)
        .bind(effective_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transfer) = transfer else {
            tx.rollback().await?;
            return Ok(None);
        };

        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'RECEIVED', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PAYOUT_PENDING'
            RETURNING *
            "#,
        )
        .bind(transfer.payment_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(TransferSettlement { transfer, order }))
    }

    async fn fail_transfer(
        &self,
        transfer_id: Uuid,
        status: TransferStatus,
        reason: Option<&str>,
    ) -> Result<Option<TransferSettlement>, AppError> {
        let mut tx = self.pool.begin().await?;

        let transfer = sqlx::query_as::<_, Transfer>(
            r#"
            UPDATE transfers
            SET status = $2, fail_reason = $3, version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(transfer_id)
        .bind(status)
        .bind(reason)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(transfer) = transfer else {
            tx.rollback().await?;
            return Ok(None);
        };

        // Volta para o último estado seguro: dinheiro recebido, ainda não repassado
        let order = sqlx::query_as::<_, PaymentOrder>(
            r#"
            UPDATE payment_orders
            SET status = 'PAID', version = version + 1, updated_at = now()
            WHERE id = $1 AND status = 'PAYOUT_PENDING'
            RETURNING *
            "#,
        )
        .bind(transfer.payment_order_id)
        .fetch_optional(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(TransferSettlement { transfer, order }))
    }

    // =========================================================================
    //  SUBCONTAS
    // =========================================================================

    async fn get_sub_account_by_landlord(&self, landlord_id: Uuid) -> Result<Option<PayeeSubAccount>, AppError> {
        let account = sqlx::query_as::<_, PayeeSubAccount>("SELECT * FROM payee_sub_accounts WHERE landlord_id = $1")
            .bind(landlord_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_sub_account_by_external(&self, external_account_id: &str) -> Result<Option<PayeeSubAccount>, AppError> {
        let account = sqlx::query_as::<_, PayeeSubAccount>(
            "SELECT * FROM payee_sub_accounts WHERE external_account_id = $1",
        )
        .bind(external_account_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    async fn insert_sub_account(&self, new: NewSubAccount) -> Result<Option<PayeeSubAccount>, AppError> {
        let account = sqlx::query_as::<_, PayeeSubAccount>(
            r#"
            INSERT INTO payee_sub_accounts (landlord_id, external_account_id, api_key, external_wallet_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (landlord_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(new.landlord_id)
        .bind(&new.external_account_id)
        .bind(new.api_key.as_deref())
        .bind(new.external_wallet_id.as_deref())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| unique_as_conflict(e, "conta externa já vinculada a outro proprietário"))?;
        Ok(account)
    }

    async fn update_sub_account_status(
        &self,
        external_account_id: &str,
        snapshot: &SubAccountStatusSnapshot,
    ) -> Result<Option<SubAccountStatusChange>, AppError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, PayeeSubAccount>(
            "SELECT * FROM payee_sub_accounts WHERE external_account_id = $1 FOR UPDATE",
        )
        .bind(external_account_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            tx.rollback().await?;
            return Ok(None);
        };

        let account = sqlx::query_as::<_, PayeeSubAccount>(
            r#"
            UPDATE payee_sub_accounts
            SET status_general = $2, status_documentation = $3,
                status_commercial_info = $4, status_bank_account_info = $5,
                version = version + 1, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(current.id)
        .bind(snapshot.general.as_deref())
        .bind(snapshot.documentation.as_deref())
        .bind(snapshot.commercial_info.as_deref())
        .bind(snapshot.bank_account_info.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let previous = SubAccountStatusSnapshot {
            general: current.status_general,
            documentation: current.status_documentation,
            commercial_info: current.status_commercial_info,
            bank_account_info: current.status_bank_account_info,
        };
        Ok(Some(SubAccountStatusChange { previous, account }))
    }

    async fn set_payout_key(&self, landlord_id: Uuid, payout_key: &str) -> Result<Option<PayeeSubAccount>, AppError> {
        let account = sqlx::query_as::<_, PayeeSubAccount>(
            r#"
            UPDATE payee_sub_accounts
            SET payout_key = $2, version = version + 1, updated_at = now()
            WHERE landlord_id = $1
            RETURNING *
            "#,
        )
        .bind(landlord_id)
        .bind(payout_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
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
        let artifact = sqlx::query_as::<_, ContractArtifact>(
            r#"
            INSERT INTO contract_artifacts (contract_id, storage_key, expires_at)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(contract_id)
        .bind(storage_key)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(artifact)
    }

    async fn expire_artifacts(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE contract_artifacts SET expired = true WHERE expired = false AND expires_at <= $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
