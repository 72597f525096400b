// src/handlers/scheduler.rs

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::{
    common::error::AppError,
    config::AppState,
    services::scheduler_service::{DailyJob, DailyReport, SchedulerTrigger},
};

// POST /api/scheduler/{job}
// Disparo manual de um job diário (ou "all").
#[utoipa::path(
    post,
    path = "/api/scheduler/{job}",
    tag = "Scheduler",
    responses(
        (status = 200, description = "Relatório da execução", body = DailyReport),
        (status = 404, description = "Job desconhecido")
    ),
    params(
        ("job" = String, Path, description = "mark-overdue | pregenerate-charges | expire-artifacts | finish-contracts | purge-jobs | all")
    )
)]
pub async fn run_daily_job(
    State(app_state): State<AppState>,
    Path(job): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let job: DailyJob = job.parse()?;
    let report = app_state.scheduler.run_daily(job).await?;
    Ok(Json(report))
}
