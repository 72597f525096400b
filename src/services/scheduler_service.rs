// src/services/scheduler_service.rs
//
// Jobs diários. Supõe uma única instância ativa do agendador: duas instâncias
// rodando juntas só não duplicam cobranças por causa da chave de deduplicação
// `issue-charge:{parcela}:{dia}` e da guarda PENDING na emissão.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::{
    common::error::AppError,
    db::{JobQueue, LedgerStore},
    models::job::Job,
    services::{
        contract_service::ContractService,
        notification_service::NotificationService,
        reconciler_service::{overdue_notification, overdue_scope},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyJob {
    MarkOverdue,
    PregenerateCharges,
    ExpireArtifacts,
    FinishContracts,
    PurgeJobs,
    All,
}

impl DailyJob {
    pub fn as_str(self) -> &'static str {
        match self {
            DailyJob::MarkOverdue => "mark-overdue",
            DailyJob::PregenerateCharges => "pregenerate-charges",
            DailyJob::ExpireArtifacts => "expire-artifacts",
            DailyJob::FinishContracts => "finish-contracts",
            DailyJob::PurgeJobs => "purge-jobs",
            DailyJob::All => "all",
        }
    }

    fn includes(self, step: DailyJob) -> bool {
        self == DailyJob::All || self == step
    }
}

impl FromStr for DailyJob {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mark-overdue" => Ok(DailyJob::MarkOverdue),
            "pregenerate-charges" => Ok(DailyJob::PregenerateCharges),
            "expire-artifacts" => Ok(DailyJob::ExpireArtifacts),
            "finish-contracts" => Ok(DailyJob::FinishContracts),
            "purge-jobs" => Ok(DailyJob::PurgeJobs),
            "all" => Ok(DailyJob::All),
            other => Err(AppError::NotFound(format!("job diário '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyReport {
    pub job: String,
    pub marked_overdue: usize,
    pub charges_enqueued: usize,
    pub artifacts_expired: u64,
    pub contracts_finished: usize,
    pub jobs_purged: u64,
}

#[async_trait]
pub trait SchedulerTrigger: Send + Sync {
    async fn run_daily(&self, job: DailyJob) -> Result<DailyReport, AppError>;
}

#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn LedgerStore>,
    queue: Arc<dyn JobQueue>,
    contracts: ContractService,
    notifications: NotificationService,
    charge_lead_days: u64,
    job_retention_days: i64,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        queue: Arc<dyn JobQueue>,
        contracts: ContractService,
        notifications: NotificationService,
        charge_lead_days: i64,
        job_retention_days: i64,
    ) -> Self {
        Self {
            store,
            queue,
            contracts,
            notifications,
            charge_lead_days: u64::try_from(charge_lead_days).unwrap_or(0),
            job_retention_days: job_retention_days.max(1),
        }
    }

    pub async fn run_daily_at(&self, job: DailyJob, now: DateTime<Utc>) -> Result<DailyReport, AppError> {
        let today = now.date_naive();
        let mut report = DailyReport { job: job.as_str().to_string(), ..Default::default() };

        if job.includes(DailyJob::MarkOverdue) {
            report.marked_overdue = self.mark_overdue(today).await?;
        }
        if job.includes(DailyJob::PregenerateCharges) {
            report.charges_enqueued = self.pregenerate_charges(today).await?;
        }
        if job.includes(DailyJob::ExpireArtifacts) {
            report.artifacts_expired = self.store.expire_artifacts(now).await?;
        }
        if job.includes(DailyJob::FinishContracts) {
            report.contracts_finished = self.contracts.finish_expired(today).await?.len();
        }
        if job.includes(DailyJob::PurgeJobs) {
            let before = now - chrono::Duration::days(self.job_retention_days);
            report.jobs_purged = self.queue.purge_done(before).await?;
        }

        tracing::info!(
            job = %report.job,
            marked_overdue = report.marked_overdue,
            charges_enqueued = report.charges_enqueued,
            artifacts_expired = report.artifacts_expired,
            contracts_finished = report.contracts_finished,
            jobs_purged = report.jobs_purged,
            "Job diário concluído"
        );
        Ok(report)
    }

    async fn mark_overdue(&self, today: NaiveDate) -> Result<usize, AppError> {
        let marked = self.store.mark_overdue(today).await?;
        for order in &marked {
            if let Some(contract) = self.store.get_contract(order.contract_id).await? {
                self.notifications
                    .enqueue(&overdue_scope(order.id, order.version), overdue_notification(&contract, order))
                    .await?;
            }
        }
        Ok(marked.len())
    }

    async fn pregenerate_charges(&self, today: NaiveDate) -> Result<usize, AppError> {
        let until = today.checked_add_days(Days::new(self.charge_lead_days)).unwrap_or(today);
        let orders = self.store.list_chargeable_orders(today, until).await?;

        let mut enqueued = 0;
        for order in orders {
            let key = format!("issue-charge:{}:{}", order.id, today);
            let job = Job::IssueCharge { payment_order_id: order.id, billing_type: None };
            if self.queue.enqueue(&key, &job).await? {
                enqueued += 1;
            }
        }
        Ok(enqueued)
    }
}

#[async_trait]
impl SchedulerTrigger for Scheduler {
    async fn run_daily(&self, job: DailyJob) -> Result<DailyReport, AppError> {
        self.run_daily_at(job, Utc::now()).await
    }
}

/// Próxima execução na hora cheia `hour` (UTC), estritamente depois de `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today_run = now
        .date_naive()
        .and_hms_opt(hour.min(23), 0, 0)
        .map(|dt| dt.and_utc())
        .unwrap_or(now);

    if today_run > now {
        today_run
    } else {
        today_run + chrono::Duration::days(1)
    }
}

/// Laço diário em segundo plano.
pub fn spawn_daily_loop(scheduler: Scheduler, run_hour_utc: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let now = Utc::now();
            let next = next_run_after(now, run_hour_utc);
            tracing::info!(next_run = %next, "Próxima execução do agendador");

            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = scheduler.run_daily(DailyJob::All).await {
                tracing::error!(error = %e, "Falha no job diário");
            }
        }
    })
}
