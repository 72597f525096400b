// src/db/job_repo.rs

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::job::{Job, JobState, QueuedJob},
};

// Job em RUNNING há mais tempo que isso volta a ser elegível (worker morreu no meio).
const CLAIM_LEASE_SECS: i64 = 300;

/// Fila durável de efeitos colaterais, at-least-once.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// `false` quando a chave já existe (job duplicado).
    async fn enqueue(&self, key: &str, job: &Job) -> Result<bool, AppError>;

    /// Reserva até `limit` jobs vencidos e incrementa `attempts`.
    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueuedJob>, AppError>;

    async fn complete(&self, id: Uuid) -> Result<(), AppError>;

    async fn retry(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<(), AppError>;

    /// Move para a dead-letter.
    async fn bury(&self, id: Uuid, error: &str) -> Result<(), AppError>;

    /// Apaga jobs DONE concluídos antes de `before`. A chave deixa de deduplicar
    /// depois disso, então `before` precisa cobrir a janela de reentrega.
    async fn purge_done(&self, before: DateTime<Utc>) -> Result<u64, AppError>;
}

// =========================================================================
//  POSTGRES
// =========================================================================

#[derive(Clone)]
pub struct PgJobQueue {
    pool: PgPool,
}

impl PgJobQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ClaimedRow {
    id: Uuid,
    job_key: String,
    payload: serde_json::Value,
    attempts: i32,
    run_at: DateTime<Utc>,
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, key: &str, job: &Job) -> Result<bool, AppError> {
        let payload = serde_json::to_value(job)?;
        let result = sqlx::query(
            r#"
            INSERT INTO side_effect_jobs (job_key, payload)
            VALUES ($1, $2)
            ON CONFLICT (job_key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueuedJob>, AppError> {
        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);

        let rows = sqlx::query_as::<_, ClaimedRow>(
            r#"
            UPDATE side_effect_jobs
            SET state = 'RUNNING', attempts = attempts + 1, run_at = $2, updated_at = now()
            WHERE id IN (
                SELECT id FROM side_effect_jobs
                WHERE state IN ('QUEUED', 'RUNNING') AND run_at <= $1
                ORDER BY run_at
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, job_key, payload, attempts, run_at
            "#,
        )
        .bind(now)
        .bind(lease_until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_value::<Job>(row.payload) {
                Ok(job) => claimed.push(QueuedJob {
                    id: row.id,
                    key: row.job_key,
                    job,
                    attempts: row.attempts,
                    run_at: row.run_at,
                }),
                Err(e) => {
                    tracing::error!(job_id = %row.id, job_key = %row.job_key, error = %e, "Payload de job ilegível");
                    self.bury(row.id, &format!("payload ilegível: {}", e)).await?;
                }
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE side_effect_jobs SET state = 'DONE', last_error = NULL, updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn retry(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE side_effect_jobs SET state = 'QUEUED', run_at = $2, last_error = $3, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(run_at)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bury(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE side_effect_jobs SET state = 'DEAD', last_error = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn purge_done(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM side_effect_jobs WHERE state = 'DONE' AND updated_at < $1")
            .bind(before)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =========================================================================
//  EM MEMÓRIA
// =========================================================================

/// Registro completo de um job, exposto para inspeção em testes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRecord {
    pub id: Uuid,
    pub key: String,
    pub job: Job,
    pub state: JobState,
    pub attempts: i32,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    seq: u64,
}

#[derive(Default)]
struct QueueState {
    by_key: HashMap<String, Uuid>,
    jobs: HashMap<Uuid, JobRecord>,
    next_seq: u64,
}

#[derive(Default, Clone)]
pub struct InMemoryJobQueue {
    state: Arc<RwLock<QueueState>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Todos os jobs, na ordem em que foram enfileirados.
    pub async fn jobs(&self) -> Vec<JobRecord> {
        let state = self.state.read().await;
        let mut jobs: Vec<JobRecord> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.seq);
        jobs
    }

    pub async fn jobs_in(&self, job_state: JobState) -> Vec<JobRecord> {
        self.jobs().await.into_iter().filter(|j| j.state == job_state).collect()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, key: &str, job: &Job) -> Result<bool, AppError> {
        let mut state = self.state.write().await;
        if state.by_key.contains_key(key) {
            return Ok(false);
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let record = JobRecord {
            id: Uuid::new_v4(),
            key: key.to_string(),
            job: job.clone(),
            state: JobState::Queued,
            attempts: 0,
            run_at: Utc::now(),
            last_error: None,
            finished_at: None,
            seq,
        };
        state.by_key.insert(record.key.clone(), record.id);
        state.jobs.insert(record.id, record);
        Ok(true)
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<QueuedJob>, AppError> {
        let mut state = self.state.write().await;
        let lease_until = now + Duration::seconds(CLAIM_LEASE_SECS);

        let mut due: Vec<&mut JobRecord> = state
            .jobs
            .values_mut()
            .filter(|j| matches!(j.state, JobState::Queued | JobState::Running) && j.run_at <= now)
            .collect();
        due.sort_by_key(|j| (j.run_at, j.seq));

        let limit = usize::try_from(limit).unwrap_or(0);
        let claimed = due
            .into_iter()
            .take(limit)
            .map(|j| {
                j.state = JobState::Running;
                j.attempts += 1;
                j.run_at = lease_until;
                QueuedJob {
                    id: j.id,
                    key: j.key.clone(),
                    job: j.job.clone(),
                    attempts: j.attempts,
                    run_at: j.run_at,
                }
            })
            .collect();
        Ok(claimed)
    }

    async fn complete(&self, id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(j) = state.jobs.get_mut(&id) {
            j.state = JobState::Done;
            j.last_error = None;
            j.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn retry(&self, id: Uuid, run_at: DateTime<Utc>, error: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(j) = state.jobs.get_mut(&id) {
            j.state = JobState::Queued;
            j.run_at = run_at;
            j.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn bury(&self, id: Uuid, error: &str) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if let Some(j) = state.jobs.get_mut(&id) {
            j.state = JobState::Dead;
            j.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn purge_done(&self, before: DateTime<Utc>) -> Result<u64, AppError> {
        let mut state = self.state.write().await;
        let expired: Vec<(Uuid, String)> = state
            .jobs
            .values()
            .filter(|j| j.state == JobState::Done && j.finished_at.is_some_and(|at| at < before))
            .map(|j| (j.id, j.key.clone()))
            .collect();

        for (id, key) in &expired {
            state.jobs.remove(id);
            state.by_key.remove(key);
        }
        Ok(expired.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_keys_are_enqueued_once() {
        let queue = InMemoryJobQueue::new();
        let job = Job::InitiatePayout { payment_order_id: Uuid::new_v4() };

        assert!(queue.enqueue("payout:1:PAID:2", &job).await.unwrap());
        assert!(!queue.enqueue("payout:1:PAID:2", &job).await.unwrap());
        assert_eq!(queue.jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn claimed_jobs_are_not_claimed_again_until_retried() {
        let queue = InMemoryJobQueue::new();
        let job = Job::InitiatePayout { payment_order_id: Uuid::new_v4() };
        queue.enqueue("k", &job).await.unwrap();

        let now = Utc::now();
        let first = queue.claim_due(now, 10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].attempts, 1);
        assert!(queue.claim_due(now, 10).await.unwrap().is_empty());

        queue.retry(first[0].id, now, "timeout").await.unwrap();
        let second = queue.claim_due(now, 10).await.unwrap();
        assert_eq!(second[0].attempts, 2);

        queue.bury(second[0].id, "desisti").await.unwrap();
        assert_eq!(queue.jobs_in(JobState::Dead).await.len(), 1);
    }

    #[tokio::test]
    async fn purge_drops_only_finished_jobs_and_frees_their_keys() {
        let queue = InMemoryJobQueue::new();
        let job = Job::InitiatePayout { payment_order_id: Uuid::new_v4() };
        queue.enqueue("feito", &job).await.unwrap();
        queue.enqueue("morto", &job).await.unwrap();
        queue.enqueue("pendente", &job).await.unwrap();

        let claimed = queue.claim_due(Utc::now(), 2).await.unwrap();
        queue.complete(claimed[0].id).await.unwrap();
        queue.bury(claimed[1].id, "falhou").await.unwrap();

        assert_eq!(queue.purge_done(Utc::now() - Duration::days(1)).await.unwrap(), 0);
        assert_eq!(queue.purge_done(Utc::now() + Duration::seconds(1)).await.unwrap(), 1);

        let keys: Vec<String> = queue.jobs().await.into_iter().map(|j| j.key).collect();
        assert_eq!(keys, vec!["morto".to_string(), "pendente".to_string()]);
        assert!(queue.enqueue("feito", &job).await.unwrap());
    }
}
