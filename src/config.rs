// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::{anyhow, Context};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use crate::{
    db::{
        InMemoryJobQueue, InMemoryLedgerStore, JobQueue, LedgerStore, NotificationSink, PgJobQueue,
        PgLedgerStore, PgNotificationSink, TracingNotificationSink,
    },
    gateway::{HttpGatewayClient, PaymentGateway},
    services::{
        artifact_service::ArtifactRegistry, charge_service::ChargeIssuer, contract_service::ContractService,
        notification_service::NotificationService, payout_service::PayoutOrchestrator,
        queue_service::{JobDispatcher, QueueWorker}, reconciler_service::WebhookReconciler,
        scheduler_service::Scheduler, sub_account_service::SubAccountService,
    },
};

// --- Seções de configuração ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    // Chave mestra da plataforma (provisionamento de subcontas)
    pub api_key: String,
    pub timeout_ms: u64,
    pub webhook_token: String,
}

/// Comissão da plataforma. Passada explicitamente para quem cobra e quem repassa.
#[derive(Debug, Clone, PartialEq)]
pub struct FeePolicy {
    // Fração: 0.05 = 5%
    pub default_percent: Decimal,
    pub platform_wallet_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub poll_interval: Duration,
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub batch_size: i64,
    // Jobs DONE ficam guardados por este prazo para segurar reentregas do gateway
    pub retention_days: i64,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub run_hour_utc: u32,
    pub charge_lead_days: i64,
    pub artifact_ttl_days: i64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub host: String,
    pub port: u16,
    pub gateway: GatewayConfig,
    pub esign_webhook_token: String,
    pub fees: FeePolicy,
    pub admin_ids: Vec<Uuid>,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    /// Carrega do ambiente (com `.env`, se existir).
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        fn parse<T: FromStr>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
        where
            T::Err: std::fmt::Display,
        {
            match raw {
                Some(v) => v.parse::<T>().map_err(|e| anyhow!("{} inválido ({}): {}", key, v, e)),
                None => Ok(default),
            }
        }

        let storage = match get("STORAGE_BACKEND").as_deref().map(str::to_ascii_lowercase).as_deref() {
            None | Some("postgres") => StorageBackend::Postgres,
            Some("memory") => StorageBackend::Memory,
            Some(other) => return Err(anyhow!("STORAGE_BACKEND desconhecido: {}", other)),
        };

        let database_url = get("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(anyhow!("DATABASE_URL deve ser definida"));
        }

        let admin_ids = get("PLATFORM_ADMIN_IDS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Uuid::parse_str(s).with_context(|| format!("PLATFORM_ADMIN_IDS inválido: {}", s)))
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let default_percent = parse("PLATFORM_FEE_PERCENT", get("PLATFORM_FEE_PERCENT"), Decimal::new(5, 2))?;
        if default_percent < Decimal::ZERO || default_percent >= Decimal::ONE {
            return Err(anyhow!("PLATFORM_FEE_PERCENT deve ser uma fração entre 0 e 1"));
        }

        let run_hour_utc = parse("SCHEDULER_RUN_HOUR_UTC", get("SCHEDULER_RUN_HOUR_UTC"), 6u32)?;
        if run_hour_utc > 23 {
            return Err(anyhow!("SCHEDULER_RUN_HOUR_UTC deve estar entre 0 e 23"));
        }

        Ok(Self {
            storage,
            database_url,
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse("APP_PORT", get("APP_PORT"), 3000u16)?,
            gateway: GatewayConfig {
                base_url: get("GATEWAY_BASE_URL").unwrap_or_else(|| "https://sandbox.asaas.com/api".to_string()),
                api_key: get("GATEWAY_API_KEY").unwrap_or_default(),
                timeout_ms: parse("GATEWAY_TIMEOUT_MS", get("GATEWAY_TIMEOUT_MS"), 15_000u64)?,
                webhook_token: get("GATEWAY_WEBHOOK_TOKEN").unwrap_or_default(),
            },
            esign_webhook_token: get("ESIGN_WEBHOOK_TOKEN").unwrap_or_default(),
            fees: FeePolicy { default_percent, platform_wallet_id: get("PLATFORM_WALLET_ID") },
            admin_ids,
            queue: QueueConfig {
                poll_interval: Duration::from_millis(parse("QUEUE_POLL_INTERVAL_MS", get("QUEUE_POLL_INTERVAL_MS"), 1_000u64)?),
                max_attempts: parse("QUEUE_MAX_ATTEMPTS", get("QUEUE_MAX_ATTEMPTS"), 5i32)?,
                backoff_base: Duration::from_millis(parse("QUEUE_BACKOFF_BASE_MS", get("QUEUE_BACKOFF_BASE_MS"), 2_000u64)?),
                batch_size: parse("QUEUE_BATCH_SIZE", get("QUEUE_BATCH_SIZE"), 20i64)?,
                retention_days: parse("QUEUE_RETENTION_DAYS", get("QUEUE_RETENTION_DAYS"), 30i64)?,
            },
            scheduler: SchedulerConfig {
                enabled: parse("SCHEDULER_ENABLED", get("SCHEDULER_ENABLED"), true)?,
                run_hour_utc,
                charge_lead_days: parse("CHARGE_LEAD_DAYS", get("CHARGE_LEAD_DAYS"), 35i64)?,
                artifact_ttl_days: parse("ARTIFACT_TTL_DAYS", get("ARTIFACT_TTL_DAYS"), 7i64)?,
            },
        })
    }
}

// --- Estado compartilhado ---

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn LedgerStore>,
    pub queue: Arc<dyn JobQueue>,
    pub notifications: NotificationService,
    pub charges: ChargeIssuer,
    pub payouts: PayoutOrchestrator,
    pub contracts: ContractService,
    pub sub_accounts: SubAccountService,
    pub reconciler: WebhookReconciler,
    pub scheduler: Scheduler,
    pub artifacts: ArtifactRegistry,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let gateway: Arc<dyn PaymentGateway> = Arc::new(
            HttpGatewayClient::new(&config.gateway).context("Falha ao criar o cliente do gateway")?,
        );

        let (store, queue, sink): (Arc<dyn LedgerStore>, Arc<dyn JobQueue>, Arc<dyn NotificationSink>) =
            match config.storage {
                StorageBackend::Postgres => {
                    let database_url = config
                        .database_url
                        .as_deref()
                        .ok_or_else(|| anyhow!("DATABASE_URL deve ser definida"))?;

                    let db_pool = PgPoolOptions::new()
                        .max_connections(10)
                        .acquire_timeout(Duration::from_secs(3))
                        .connect(database_url)
                        .await?;
                    tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                    sqlx::migrate!().run(&db_pool).await?;
                    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                    (
                        Arc::new(PgLedgerStore::new(db_pool.clone())),
                        Arc::new(PgJobQueue::new(db_pool.clone())),
                        Arc::new(PgNotificationSink::new(db_pool)),
                    )
                }
                StorageBackend::Memory => {
                    tracing::warn!("STORAGE_BACKEND=memory: nada será persistido");
                    (
                        Arc::new(InMemoryLedgerStore::new()),
                        Arc::new(InMemoryJobQueue::new()),
                        Arc::new(TracingNotificationSink),
                    )
                }
            };

        Ok(Self::assemble(config, store, queue, sink, gateway))
    }

    /// Monta o grafo de dependências sobre adaptadores já construídos.
    pub fn assemble(
        config: AppConfig,
        store: Arc<dyn LedgerStore>,
        queue: Arc<dyn JobQueue>,
        sink: Arc<dyn NotificationSink>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let notifications = NotificationService::new(sink, queue.clone(), config.admin_ids.clone());
        let charges = ChargeIssuer::new(store.clone(), gateway.clone(), config.fees.clone());
        let payouts =
            PayoutOrchestrator::new(store.clone(), gateway.clone(), notifications.clone(), config.fees.clone());
        let contracts = ContractService::new(store.clone(), gateway.clone(), charges.clone(), notifications.clone());
        let sub_accounts = SubAccountService::new(store.clone(), gateway);
        let reconciler =
            WebhookReconciler::new(store.clone(), contracts.clone(), payouts.clone(), notifications.clone(), queue.clone());
        let scheduler = Scheduler::new(
            store.clone(),
            queue.clone(),
            contracts.clone(),
            notifications.clone(),
            config.scheduler.charge_lead_days,
            config.queue.retention_days,
        );
        let artifacts = ArtifactRegistry::new(store.clone(), config.scheduler.artifact_ttl_days);

        Self {
            config: Arc::new(config),
            store,
            queue,
            notifications,
            charges,
            payouts,
            contracts,
            sub_accounts,
            reconciler,
            scheduler,
            artifacts,
        }
    }

    pub fn worker(&self) -> QueueWorker {
        let dispatcher = JobDispatcher::new(
            self.reconciler.clone(),
            self.payouts.clone(),
            self.charges.clone(),
            self.notifications.clone(),
        );
        QueueWorker::new(self.queue.clone(), dispatcher, self.notifications.clone(), self.config.queue.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn postgres_backend_requires_database_url() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn defaults_apply_for_memory_backend() {
        let cfg = AppConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "memory")])).unwrap();
        assert_eq!(cfg.storage, StorageBackend::Memory);
        assert_eq!(cfg.fees.default_percent, Decimal::new(5, 2));
        assert_eq!(cfg.scheduler.charge_lead_days, 35);
        assert_eq!(cfg.queue.max_attempts, 5);
        assert_eq!(cfg.queue.retention_days, 30);
        assert_eq!(cfg.port, 3000);
        assert!(cfg.admin_ids.is_empty());
    }

    #[test]
    fn parses_admin_list_and_rejects_bad_fee() {
        let admin = Uuid::new_v4();
        let ids = format!("{}, ", admin);
        let cfg = AppConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "memory"), ("PLATFORM_ADMIN_IDS", ids.as_str())])).unwrap();
        assert_eq!(cfg.admin_ids, vec![admin]);

        let bad = AppConfig::from_lookup(lookup(&[("STORAGE_BACKEND", "memory"), ("PLATFORM_FEE_PERCENT", "5")]));
        assert!(bad.is_err());
    }
}
