// tests/common/mod.rs
//
// Estado da aplicação montado sobre os adaptadores em memória, com um
// gateway falso que registra cada chamada.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

use rental_backend::{
    common::error::AppError,
    config::{AppConfig, AppState},
    db::{InMemoryJobQueue, InMemoryLedgerStore, JobQueue, LedgerStore, NotificationSink},
    gateway::{
        CreateChargeRequest, CreatePayoutRequest, CreateSubAccountRequest, GatewayError, PaymentGateway,
        RemoteCharge, RemotePayout, RemoteSubAccount,
    },
    models::{
        contract::{Contract, NewContract},
        job::{Job, JobState, QueuedJob},
        notification::Escalation,
        payment::{BillingType, PaymentOrder},
        sub_account::NewSubAccount,
        webhook::GatewayEvent,
    },
    services::contract_service::{Activation, ActivationSource},
};

pub const GATEWAY_TOKEN: &str = "gw-token";
pub const ESIGN_TOKEN: &str = "esign-token";
pub const LANDLORD_API_KEY: &str = "landlord_api_key";

// =========================================================================
//  GATEWAY FALSO
// =========================================================================

#[derive(Default)]
struct FakeGatewayState {
    charges: Vec<(String, CreateChargeRequest)>,
    cancelled: Vec<String>,
    payouts: Vec<(String, CreatePayoutRequest)>,
    sub_accounts: Vec<CreateSubAccountRequest>,
    balance: Option<Decimal>,
    charge_error: Option<GatewayError>,
    payout_error: Option<GatewayError>,
    cancel_errors: HashSet<String>,
    seq: u32,
}

#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeGatewayState>,
}

impl FakeGateway {
    pub fn created_charges(&self) -> Vec<(String, CreateChargeRequest)> {
        self.state.lock().unwrap().charges.clone()
    }

    pub fn cancelled_charges(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn payouts(&self) -> Vec<(String, CreatePayoutRequest)> {
        self.state.lock().unwrap().payouts.clone()
    }

    pub fn sub_account_requests(&self) -> Vec<CreateSubAccountRequest> {
        self.state.lock().unwrap().sub_accounts.clone()
    }

    pub fn set_balance(&self, balance: Decimal) {
        self.state.lock().unwrap().balance = Some(balance);
    }

    pub fn fail_charges_with(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().charge_error = error;
    }

    pub fn fail_payouts_with(&self, error: Option<GatewayError>) {
        self.state.lock().unwrap().payout_error = error;
    }

    pub fn fail_cancel_of(&self, charge_id: &str) {
        self.state.lock().unwrap().cancel_errors.insert(charge_id.to_string());
    }

    fn next_id(state: &mut FakeGatewayState, prefix: &str) -> String {
        state.seq += 1;
        format!("{}_{:04}", prefix, state.seq)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_charge(&self, _api_key: &str, request: CreateChargeRequest) -> Result<RemoteCharge, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.charge_error.clone() {
            return Err(e);
        }
        let id = Self::next_id(&mut state, "pay");
        state.charges.push((id.clone(), request));
        Ok(RemoteCharge {
            id: id.clone(),
            invoice_url: Some(format!("https://gateway.test/i/{}", id)),
            bank_slip_url: None,
            pix_payload: None,
        })
    }

    async fn cancel_charge(&self, _api_key: &str, charge_id: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.cancel_errors.contains(charge_id) {
            return Err(GatewayError::Unavailable { status: 503, message: "indisponível".into() });
        }
        state.cancelled.push(charge_id.to_string());
        Ok(())
    }

    async fn create_payout(&self, _api_key: &str, request: CreatePayoutRequest) -> Result<RemotePayout, GatewayError> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.payout_error.clone() {
            return Err(e);
        }
        let id = Self::next_id(&mut state, "tra");
        state.payouts.push((id.clone(), request));
        Ok(RemotePayout { id, status: Some("PENDING".into()) })
    }

    async fn get_balance(&self, _api_key: &str) -> Result<Decimal, GatewayError> {
        Ok(self.state.lock().unwrap().balance.unwrap_or(dec!(100000)))
    }

    async fn create_sub_account(&self, request: CreateSubAccountRequest) -> Result<RemoteSubAccount, GatewayError> {
        let mut state = self.state.lock().unwrap();
        let id = Self::next_id(&mut state, "acc");
        state.sub_accounts.push(request);
        Ok(RemoteSubAccount {
            id: id.clone(),
            api_key: Some(format!("key_{}", id)),
            wallet_id: Some(format!("wallet_{}", id)),
        })
    }
}

// =========================================================================
//  DESTINO DE NOTIFICAÇÕES
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
}

#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<Delivered>>,
    fail_once_for: Mutex<HashSet<Uuid>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<Delivered> {
        self.delivered.lock().unwrap().clone()
    }

    /// A próxima entrega para `user_id` falha com erro de banco (retryable).
    pub fn fail_once_for(&self, user_id: Uuid) {
        self.fail_once_for.lock().unwrap().insert(user_id);
    }

    pub fn delivered_to(&self, user_id: Uuid) -> Vec<Delivered> {
        self.delivered().into_iter().filter(|d| d.user_id == user_id).collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        _action_link: Option<&str>,
    ) -> Result<(), AppError> {
        if self.fail_once_for.lock().unwrap().remove(&user_id) {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        self.delivered.lock().unwrap().push(Delivered {
            user_id,
            title: title.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

// =========================================================================
//  FILA COM FALHA PROGRAMADA
// =========================================================================

/// Fila em memória em que o próximo `enqueue` com um dado prefixo de chave
/// falha uma vez, como um banco que perdeu a conexão depois do commit.
#[derive(Clone)]
pub struct FlakyQueue {
    inner: InMemoryJobQueue,
    fail_prefixes: Arc<Mutex<Vec<String>>>,
}

impl FlakyQueue {
    pub fn fail_next_enqueue(&self, key_prefix: &str) {
        self.fail_prefixes.lock().unwrap().push(key_prefix.to_string());
    }
}

#[async_trait]
impl JobQueue for FlakyQueue {
    async fn enqueue(&self, key: &str, job: &Job) -> Result<bool, AppError> {
        let hit = {
            let mut prefixes = self.fail_prefixes.lock().unwrap();
            match prefixes.iter().position(|p| key.starts_with(p.as_str())) {
                Some(i) => {
                    prefixes.remove(i);
                    true
                }
                None => false,
            }
        };
        if hit {
            return Err(AppError::DatabaseError(sqlx::Error::PoolTimedOut));
        }
        self.inner.enqueue(key, job).await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueuedJob>, AppError> {
        self.inner.claim_due(now, limit).await
    }

    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        self.inner.complete(id).await
    }

    async fn retry(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<(), AppError> {
        self.inner.retry(id, run_at, error).await
    }

    async fn bury(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        self.inner.bury(id, error).await
    }

    async fn purge_done(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        self.inner.purge_done(before).await
    }
}

// =========================================================================
//  HARNESS
// =========================================================================

pub struct Harness {
    pub state: AppState,
    pub store: InMemoryLedgerStore,
    pub queue: InMemoryJobQueue,
    pub faults: FlakyQueue,
    pub gateway: Arc<FakeGateway>,
    pub sink: Arc<RecordingSink>,
    pub admin_id: Uuid,
    pub admin_ids: Vec<Uuid>,
}

pub struct Seeded {
    pub contract: Contract,
    pub landlord_id: Uuid,
    pub tenant_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_admins(1)
    }

    pub fn with_admins(count: usize) -> Self {
        let admin_ids: Vec<Uuid> = (0..count.max(1)).map(|_| Uuid::new_v4()).collect();
        let admin_id = admin_ids[0];
        let admin = admin_ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
        let vars: HashMap<&str, &str> = HashMap::from([
            ("STORAGE_BACKEND", "memory"),
            ("GATEWAY_WEBHOOK_TOKEN", GATEWAY_TOKEN),
            ("ESIGN_WEBHOOK_TOKEN", ESIGN_TOKEN),
            ("PLATFORM_ADMIN_IDS", admin.as_str()),
            ("PLATFORM_WALLET_ID", "wallet_platform"),
            ("PLATFORM_FEE_PERCENT", "0.05"),
            ("QUEUE_MAX_ATTEMPTS", "3"),
            ("QUEUE_BACKOFF_BASE_MS", "0"),
            ("SCHEDULER_ENABLED", "false"),
        ]);
        let config = AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        let store = InMemoryLedgerStore::new();
        let queue = InMemoryJobQueue::new();
        let faults = FlakyQueue { inner: queue.clone(), fail_prefixes: Arc::new(Mutex::new(Vec::new())) };
        let gateway = Arc::new(FakeGateway::default());
        let sink = Arc::new(RecordingSink::default());

        let state = AppState::assemble(
            config,
            Arc::new(store.clone()),
            Arc::new(faults.clone()),
            sink.clone(),
            gateway.clone(),
        );

        Self { state, store, queue, faults, gateway, sink, admin_id, admin_ids }
    }

    /// Contrato em rascunho de 1500/mês (1200 + 250 + 50), com o proprietário
    /// já habilitado para cobranças e repasses.
    pub async fn seed_contract(&self, start: NaiveDate, months: i32) -> Seeded {
        let seeded = self.seed_contract_without_sub_account(start, months).await;

        self.store
            .insert_sub_account(NewSubAccount {
                landlord_id: seeded.landlord_id,
                external_account_id: format!("acc_{}", seeded.landlord_id),
                api_key: Some(LANDLORD_API_KEY.to_string()),
                external_wallet_id: Some("wallet_landlord".to_string()),
            })
            .await
            .unwrap()
            .unwrap();
        self.store
            .set_payout_key(seeded.landlord_id, "proprietario@exemplo.com")
            .await
            .unwrap()
            .unwrap();

        seeded
    }

    /// Subconta com credenciais mas sem chave de repasse: cobra, mas o repasse
    /// fica adiado.
    pub async fn seed_contract_without_payout_key(&self, start: NaiveDate, months: i32) -> Seeded {
        let seeded = self.seed_contract_without_sub_account(start, months).await;
        self.store
            .insert_sub_account(NewSubAccount {
                landlord_id: seeded.landlord_id,
                external_account_id: format!("acc_{}", seeded.landlord_id),
                api_key: Some(LANDLORD_API_KEY.to_string()),
                external_wallet_id: Some("wallet_landlord".to_string()),
            })
            .await
            .unwrap()
            .unwrap();
        seeded
    }

    pub async fn seed_contract_without_sub_account(&self, start: NaiveDate, months: i32) -> Seeded {
        let landlord_id = Uuid::new_v4();
        let tenant_id = Uuid::new_v4();
        let contract = self
            .state
            .contracts
            .create(NewContract {
                start_date: start,
                duration_in_months: months,
                rent_amount: dec!(1200),
                condo_fee: dec!(250),
                iptu_fee: dec!(50),
                landlord_id,
                tenant_id,
                property_id: Uuid::new_v4(),
                billing_type: BillingType::Pix,
                gateway_customer_id: Some("cus_tenant".to_string()),
                signature_envelope_id: Some(format!("env_{}", Uuid::new_v4())),
            })
            .await
            .unwrap();

        Seeded { contract, landlord_id, tenant_id }
    }

    pub async fn activate(&self, contract_id: Uuid) -> Activation {
        self.state.contracts.activate(contract_id, ActivationSource::Forced).await.unwrap()
    }

    pub async fn order(&self, id: Uuid) -> PaymentOrder {
        self.store.get_payment_order(id).await.unwrap().unwrap()
    }

    pub async fn charge_id_of(&self, order_id: Uuid) -> String {
        self.store
            .get_charge_for_order(order_id)
            .await
            .unwrap()
            .unwrap()
            .external_charge_id
    }

    pub async fn drain(&self) -> usize {
        self.state.worker().drain().await.unwrap()
    }

    pub async fn jobs_of_type(&self, kind: &str) -> Vec<Job> {
        self.queue
            .jobs()
            .await
            .into_iter()
            .filter(|j| j.job.kind() == kind)
            .map(|j| j.job)
            .collect()
    }

    pub async fn escalations(&self) -> Vec<Escalation> {
        self.queue
            .jobs()
            .await
            .into_iter()
            .filter_map(|j| match j.job {
                Job::Escalate { escalation } => Some(escalation),
                _ => None,
            })
            .collect()
    }

    pub async fn dead_jobs(&self) -> usize {
        self.queue.jobs_in(JobState::Dead).await.len()
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn payment_event(id: &str, event: &str, charge_id: &str, value: Decimal, net_value: Decimal) -> GatewayEvent {
    serde_json::from_value(json!({
        "id": id,
        "event": event,
        "payment": {
            "id": charge_id,
            "value": value,
            "netValue": net_value,
            "paymentDate": "2030-02-09"
        }
    }))
    .unwrap()
}

pub fn transfer_event(id: &str, transfer_id: &str, status: &str, fail_reason: Option<&str>) -> GatewayEvent {
    serde_json::from_value(json!({
        "id": id,
        "event": format!("TRANSFER_{}", status),
        "transfer": {
            "id": transfer_id,
            "status": status,
            "failReason": fail_reason
        }
    }))
    .unwrap()
}
