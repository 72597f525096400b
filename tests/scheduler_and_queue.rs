mod common;

use chrono::{TimeZone, Utc};
use rust_decimal_macros::dec;

use common::{date, payment_event, Harness};
use rental_backend::{
    db::{JobQueue, LedgerStore},
    gateway::GatewayError,
    models::{
        job::{Job, JobState},
        notification::EscalationKind,
        payment::PaymentOrderStatus,
    },
    services::{
        artifact_service::DocumentCollaborator, reconciler_service::ReconcileOutcome,
        scheduler_service::DailyJob,
    },
};

#[tokio::test]
async fn mark_overdue_shares_the_notification_key_with_the_webhook() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    let now = Utc.with_ymd_and_hms(2030, 3, 15, 6, 0, 0).unwrap();
    let report = h.state.scheduler.run_daily_at(DailyJob::MarkOverdue, now).await.unwrap();
    assert_eq!(report.marked_overdue, 2);
    assert_eq!(h.order(orders[0].id).await.status, PaymentOrderStatus::Overdue);
    assert_eq!(h.order(orders[1].id).await.status, PaymentOrderStatus::Overdue);
    assert_eq!(h.order(orders[2].id).await.status, PaymentOrderStatus::Pending);

    // O gateway avisa o mesmo atraso depois
    let charge = h.charge_id_of(orders[0].id).await;
    let outcome = h
        .state
        .reconciler
        .handle_gateway_event(payment_event("evt_o", "PAYMENT_OVERDUE", &charge, dec!(1500), dec!(1500)))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::AlreadyApplied);

    // Rodar de novo no mesmo dia não marca nada
    let again = h.state.scheduler.run_daily_at(DailyJob::MarkOverdue, now).await.unwrap();
    assert_eq!(again.marked_overdue, 0);

    h.drain().await;
    let overdue_notices = h
        .sink
        .delivered_to(seeded.tenant_id)
        .into_iter()
        .filter(|d| d.title == "Aluguel em atraso")
        .count();
    assert_eq!(overdue_notices, 2);
}

#[tokio::test]
async fn pregenerate_enqueues_each_uncharged_order_once_per_day() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 6).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    // Janela de 35 dias a partir de 20/02: só a parcela 2 (10/03) entra
    let now = Utc.with_ymd_and_hms(2030, 2, 20, 6, 0, 0).unwrap();
    let report = h.state.scheduler.run_daily_at(DailyJob::PregenerateCharges, now).await.unwrap();
    assert_eq!(report.charges_enqueued, 1);
    assert_eq!(
        h.jobs_of_type("issue_charge").await,
        vec![Job::IssueCharge { payment_order_id: orders[1].id, billing_type: None }]
    );

    let again = h.state.scheduler.run_daily_at(DailyJob::PregenerateCharges, now).await.unwrap();
    assert_eq!(again.charges_enqueued, 0);

    h.drain().await;
    assert!(h.store.get_charge_for_order(orders[1].id).await.unwrap().unwrap().is_live());
    assert_eq!(h.gateway.created_charges().len(), 2);
}

#[tokio::test]
async fn all_runs_every_step() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 2).await;
    h.activate(seeded.contract.id).await;
    h.state
        .artifacts
        .generate_contract_artifact(seeded.contract.id, "contracts/assinado.pdf")
        .await
        .unwrap();

    let now = Utc::now() + chrono::Duration::days(30);
    let report = h.state.scheduler.run_daily_at(DailyJob::All, now).await.unwrap();
    assert_eq!(report.job, "all");
    assert_eq!(report.artifacts_expired, 1);
}

#[tokio::test]
async fn retryable_failures_back_off_then_escalate_when_exhausted() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    h.gateway.fail_charges_with(Some(GatewayError::Unavailable { status: 503, message: "fora do ar".into() }));
    let job = Job::IssueCharge { payment_order_id: orders[1].id, billing_type: None };
    assert!(h.queue.enqueue("issue-charge:teste", &job).await.unwrap());

    h.drain().await;

    let records = h.queue.jobs().await;
    let charge_job = records.iter().find(|j| j.key == "issue-charge:teste").unwrap();
    assert_eq!(charge_job.state, JobState::Dead);
    assert_eq!(charge_job.attempts, 3);
    assert!(charge_job.last_error.is_some());

    let escalations = h.escalations().await;
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].kind, EscalationKind::JobExhausted);
    assert_eq!(escalations[0].payment_order_id, Some(orders[1].id));
    assert_eq!(h.sink.delivered_to(h.admin_id).len(), 1);
}

#[tokio::test]
async fn non_retryable_failures_are_buried_immediately() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    h.gateway.fail_charges_with(Some(GatewayError::Rejected { status: 400, message: "cliente inválido".into() }));
    let job = Job::IssueCharge { payment_order_id: orders[1].id, billing_type: None };
    h.queue.enqueue("issue-charge:rejeitada", &job).await.unwrap();

    h.drain().await;

    let record = h
        .queue
        .jobs()
        .await
        .into_iter()
        .find(|j| j.key == "issue-charge:rejeitada")
        .unwrap();
    assert_eq!(record.state, JobState::Dead);
    assert_eq!(record.attempts, 1);
    assert!(h.escalations().await.is_empty());
}

#[tokio::test]
async fn already_charged_order_completes_the_job_quietly() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    let job = Job::IssueCharge { payment_order_id: orders[0].id, billing_type: None };
    h.queue.enqueue("issue-charge:repetida", &job).await.unwrap();
    h.drain().await;

    assert_eq!(h.dead_jobs().await, 0);
    assert_eq!(h.gateway.created_charges().len(), 1);
}

#[tokio::test]
async fn purge_jobs_keeps_finished_keys_inside_the_retention_window() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;
    let charge = h.charge_id_of(orders[0].id).await;

    let event = payment_event("evt_1", "PAYMENT_RECEIVED", &charge, dec!(1500), dec!(1480));
    let key = event.dedupe_key_at(Utc::now());
    h.queue.enqueue(&key, &Job::ProcessGatewayEvent { event: event.clone() }).await.unwrap();
    h.drain().await;
    let finished = h.queue.jobs_in(JobState::Done).await.len();
    assert!(finished > 0);

    // Dentro da janela a chave ainda segura a reentrega
    let soon = Utc::now() + chrono::Duration::days(1);
    let report = h.state.scheduler.run_daily_at(DailyJob::PurgeJobs, soon).await.unwrap();
    assert_eq!(report.jobs_purged, 0);
    assert!(!h.queue.enqueue(&key, &Job::ProcessGatewayEvent { event }).await.unwrap());

    let later = Utc::now() + chrono::Duration::days(31);
    let report = h.state.scheduler.run_daily_at(DailyJob::PurgeJobs, later).await.unwrap();
    assert_eq!(report.jobs_purged, finished as u64);
    assert!(h.queue.jobs_in(JobState::Done).await.is_empty());
}
