// src/services/queue_service.rs

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::{
    common::error::AppError,
    config::QueueConfig,
    db::JobQueue,
    models::{
        job::{Job, QueuedJob},
        notification::{Escalation, EscalationKind},
    },
    services::{
        charge_service::ChargeIssuer,
        notification_service::{is_escalation_delivery, NotificationService},
        payout_service::PayoutOrchestrator, reconciler_service::WebhookReconciler,
    },
};

const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// `base × 2^(tentativa-1)`, limitado a 1h.
pub fn backoff(base: Duration, attempt: i32) -> Duration {
    let exponent = u32::try_from(attempt.saturating_sub(1)).unwrap_or(0).min(20);
    base.saturating_mul(1u32 << exponent).min(MAX_BACKOFF)
}

/// Executa um job. Não sabe nada de retry; só devolve o erro.
#[derive(Clone)]
pub struct JobDispatcher {
    reconciler: WebhookReconciler,
    payouts: PayoutOrchestrator,
    charges: ChargeIssuer,
    notifications: NotificationService,
}

impl JobDispatcher {
    pub fn new(
        reconciler: WebhookReconciler,
        payouts: PayoutOrchestrator,
        charges: ChargeIssuer,
        notifications: NotificationService,
    ) -> Self {
        Self { reconciler, payouts, charges, notifications }
    }

    /// `key` é a chave de deduplicação do job; o escalonamento a usa para
    /// derivar as chaves das entregas por administrador.
    pub async fn dispatch(&self, key: &str, job: &Job) -> Result<(), AppError> {
        match job {
            Job::ProcessGatewayEvent { event } => {
                self.reconciler.handle_gateway_event(event.clone()).await?;
            }
            Job::ProcessSignatureEvent { event } => {
                self.reconciler.handle_signature_event(event.clone()).await?;
            }
            Job::InitiatePayout { payment_order_id } => {
                let outcome = self.payouts.initiate_payout(*payment_order_id).await?;
                tracing::debug!(%payment_order_id, ?outcome, "Repasse processado");
            }
            Job::IssueCharge { payment_order_id, billing_type } => {
                match self.charges.issue_charge(*payment_order_id, *billing_type).await {
                    Ok(_) => {}
                    // Já cobrada, ou ainda sem pré-requisito: nada a repetir
                    Err(e @ (AppError::AlreadyExists(_) | AppError::PrerequisiteMissing(_) | AppError::InvalidState(_))) => {
                        tracing::info!(%payment_order_id, reason = %e, "Cobrança não emitida");
                    }
                    Err(e) => return Err(e),
                }
            }
            Job::Notify { notification } => self.notifications.deliver(notification).await?,
            Job::Escalate { escalation } => {
                let queued = self.notifications.escalate(key, escalation).await?;
                tracing::debug!(job_key = %key, queued, "Escalonamento desdobrado por administrador");
            }
        }
        Ok(())
    }
}

pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    dispatcher: JobDispatcher,
    notifications: NotificationService,
    config: QueueConfig,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        dispatcher: JobDispatcher,
        notifications: NotificationService,
        config: QueueConfig,
    ) -> Self {
        Self { queue, dispatcher, notifications, config }
    }

    /// Processa um lote de jobs vencidos. Devolve quantos foram reservados.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let jobs = self.queue.claim_due(now, self.config.batch_size).await?;
        let claimed = jobs.len();

        for job in jobs {
            let result = self.dispatcher.dispatch(&job.key, &job.job).await;
            self.settle(job, result, now).await?;
        }
        Ok(claimed)
    }

    /// Roda até a fila não ter mais nada vencido (inclui os jobs gerados no caminho).
    pub async fn drain(&self) -> Result<usize, AppError> {
        let mut total = 0;
        loop {
            let processed = self.run_once(Utc::now()).await?;
            if processed == 0 {
                return Ok(total);
            }
            total += processed;
        }
    }

    async fn settle(&self, job: QueuedJob, result: Result<(), AppError>, now: DateTime<Utc>) -> Result<(), AppError> {
        let error = match result {
            Ok(()) => return self.queue.complete(job.id).await,
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::error!(job_id = %job.id, job_key = %job.key, kind = job.job.kind(), error = %error, "Job falhou sem possibilidade de retry");
            return self.queue.bury(job.id, &error.to_string()).await;
        }

        if job.attempts < self.config.max_attempts {
            let delay = backoff(self.config.backoff_base, job.attempts);
            let run_at = now + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
            tracing::warn!(
                job_id = %job.id,
                job_key = %job.key,
                attempt = job.attempts,
                retry_in_ms = delay.as_millis() as u64,
                error = %error,
                "Job falhou; nova tentativa agendada"
            );
            return self.queue.retry(job.id, run_at, &error.to_string()).await;
        }

        tracing::error!(job_id = %job.id, job_key = %job.key, attempts = job.attempts, error = %error, "Job esgotou as tentativas");
        self.queue.bury(job.id, &error.to_string()).await?;

        // Escalonamento que falha não gera outro escalonamento
        if !matches!(job.job, Job::Escalate { .. }) && !is_escalation_delivery(&job.key) {
            let escalation = Escalation {
                kind: EscalationKind::JobExhausted,
                landlord_id: None,
                property_id: None,
                payment_order_id: match &job.job {
                    Job::InitiatePayout { payment_order_id } | Job::IssueCharge { payment_order_id, .. } => {
                        Some(*payment_order_id)
                    }
                    _ => None,
                },
                amount: None,
                reason: format!("{} ({}) falhou {} vezes: {}", job.key, job.job.kind(), job.attempts, error),
            };
            self.notifications
                .enqueue_escalation(&format!("job:{}", job.id), escalation)
                .await?;
        }
        Ok(())
    }

    /// Laço de polling em segundo plano.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(poll_ms = self.config.poll_interval.as_millis() as u64, "Worker da fila iniciado");
            loop {
                match self.run_once(Utc::now()).await {
                    Ok(0) => tokio::time::sleep(self.config.poll_interval).await,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Falha ao processar a fila");
                        tokio::time::sleep(self.config.poll_interval).await;
                    }
                }
            }
        })
    }
}
