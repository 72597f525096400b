mod common;

use rust_decimal_macros::dec;

use common::{date, payment_event, transfer_event, Harness, Seeded};
use rental_backend::{
    common::error::AppError,
    db::LedgerStore,
    gateway::GatewayError,
    models::{
        notification::EscalationKind,
        payment::{PaymentOrder, PaymentOrderStatus, TransferStatus},
    },
    services::{payout_service::PayoutOutcome, reconciler_service::ReconcileOutcome},
};

/// Contrato ativo com a parcela 1 paga (1500 pagos, 1480 líquidos).
async fn paid_first_order(h: &Harness) -> (Seeded, PaymentOrder) {
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;
    let charge = h.charge_id_of(orders[0].id).await;
    h.state
        .reconciler
        .handle_gateway_event(payment_event("evt_pay", "PAYMENT_RECEIVED", &charge, dec!(1500), dec!(1480)))
        .await
        .unwrap();
    let order = h.order(orders[0].id).await;
    (seeded, order)
}

#[tokio::test]
async fn payout_is_net_value_minus_platform_fee() {
    let h = Harness::new();
    let (_, order) = paid_first_order(&h).await;

    h.drain().await;

    let payouts = h.gateway.payouts();
    assert_eq!(payouts.len(), 1);
    assert_eq!(payouts[0].1.value, dec!(1405.00));
    assert_eq!(payouts[0].1.payout_key, "proprietario@exemplo.com");
    assert_eq!(payouts[0].1.external_reference, order.id);

    let transfer = h.store.get_transfer_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(transfer.value, dec!(1405.00));
    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::PayoutPending);
}

#[tokio::test]
async fn transfer_done_completes_the_order_and_replays_are_no_ops() {
    let h = Harness::new();
    let (seeded, order) = paid_first_order(&h).await;
    h.drain().await;
    let (transfer_id, _) = h.gateway.payouts().remove(0);

    let done = transfer_event("evt_t1", &transfer_id, "DONE", None);
    let first = h.state.reconciler.handle_gateway_event(done.clone()).await.unwrap();
    let version_after = h.order(order.id).await.version;
    let replay = h.state.reconciler.handle_gateway_event(done).await.unwrap();

    assert_eq!(first, ReconcileOutcome::Applied);
    assert_eq!(replay, ReconcileOutcome::AlreadyApplied);

    let received = h.order(order.id).await;
    assert_eq!(received.status, PaymentOrderStatus::Received);
    assert_eq!(received.version, version_after);
    assert_eq!(
        h.store.get_transfer_for_order(order.id).await.unwrap().unwrap().status,
        TransferStatus::Done
    );

    h.drain().await;
    let landlord_notices = h.sink.delivered_to(seeded.landlord_id);
    assert_eq!(landlord_notices.iter().filter(|d| d.title == "Repasse concluído").count(), 1);
}

#[tokio::test]
async fn failed_transfer_reverts_to_paid_and_escalates_once() {
    let h = Harness::new();
    let (seeded, order) = paid_first_order(&h).await;
    h.drain().await;
    let (transfer_id, _) = h.gateway.payouts().remove(0);

    let failed = transfer_event("evt_t1", &transfer_id, "FAILED", Some("Chave PIX inválida"));
    let first = h.state.reconciler.handle_gateway_event(failed.clone()).await.unwrap();
    let replay = h.state.reconciler.handle_gateway_event(failed).await.unwrap();

    assert_eq!(first, ReconcileOutcome::Applied);
    assert_eq!(replay, ReconcileOutcome::AlreadyApplied);
    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::Paid);

    let escalations = h.escalations().await;
    assert_eq!(escalations.len(), 1);
    let escalation = &escalations[0];
    assert_eq!(escalation.kind, EscalationKind::PayoutFailed);
    assert_eq!(escalation.landlord_id, Some(seeded.landlord_id));
    assert_eq!(escalation.payment_order_id, Some(order.id));
    assert_eq!(escalation.amount, Some(dec!(1405.00)));
    assert_eq!(escalation.reason, "Chave PIX inválida");

    // Sem novo repasse automático
    assert_eq!(h.jobs_of_type("initiate_payout").await.len(), 1);
    h.drain().await;
    assert_eq!(h.gateway.payouts().len(), 1);
    assert_eq!(h.sink.delivered_to(h.admin_id).len(), 1);
}

#[tokio::test]
async fn manual_retry_reuses_the_failed_transfer() {
    let h = Harness::new();
    let (_, order) = paid_first_order(&h).await;
    h.drain().await;
    let (transfer_id, _) = h.gateway.payouts().remove(0);
    let original = h.store.get_transfer_for_order(order.id).await.unwrap().unwrap();

    // Com repasse pendente, refazer é conflito
    let err = h.state.payouts.retry_payout(order.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    h.state
        .reconciler
        .handle_gateway_event(transfer_event("evt_t1", &transfer_id, "CANCELLED", None))
        .await
        .unwrap();

    let outcome = h.state.payouts.retry_payout(order.id).await.unwrap();
    let PayoutOutcome::Requested { transfer } = outcome else {
        panic!("esperava um novo repasse, veio {:?}", outcome);
    };
    assert_eq!(transfer.id, original.id);
    assert_ne!(transfer.external_transfer_id, transfer_id);
    assert_eq!(transfer.status, TransferStatus::Pending);
    assert_eq!(h.gateway.payouts().len(), 2);
    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::PayoutPending);
}

#[tokio::test]
async fn payout_without_payout_key_is_deferred() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 2).await;
    h.store.set_payout_key(seeded.landlord_id, "").await.unwrap();
    let orders = h.activate(seeded.contract.id).await.payment_orders;
    let charge = h.charge_id_of(orders[0].id).await;
    h.state
        .reconciler
        .handle_gateway_event(payment_event("evt_pay", "PAYMENT_RECEIVED", &charge, dec!(1500), dec!(1480)))
        .await
        .unwrap();

    let outcome = h.state.payouts.initiate_payout(orders[0].id).await.unwrap();

    assert!(matches!(outcome, PayoutOutcome::Deferred { .. }));
    assert!(h.gateway.payouts().is_empty());
    assert_eq!(h.order(orders[0].id).await.status, PaymentOrderStatus::Paid);
    assert!(h.escalations().await.is_empty());
}

#[tokio::test]
async fn insufficient_balance_is_escalated_without_requesting_the_payout() {
    let h = Harness::new();
    let (_, order) = paid_first_order(&h).await;
    h.gateway.set_balance(dec!(100));

    let outcome = h.state.payouts.initiate_payout(order.id).await.unwrap();

    assert!(matches!(outcome, PayoutOutcome::Escalated { .. }));
    assert!(h.gateway.payouts().is_empty());
    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::Paid);
    let escalations = h.escalations().await;
    assert_eq!(escalations.len(), 1);
    assert_eq!(escalations[0].kind, EscalationKind::PayoutRequestFailed);
}

#[tokio::test]
async fn rejected_payout_request_is_escalated_not_retried() {
    let h = Harness::new();
    let (_, order) = paid_first_order(&h).await;
    h.gateway.fail_payouts_with(Some(GatewayError::Rejected { status: 400, message: "chave inválida".into() }));

    h.drain().await;

    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::Paid);
    assert!(h.store.get_transfer_for_order(order.id).await.unwrap().is_none());
    assert_eq!(h.escalations().await.len(), 1);
    assert_eq!(h.dead_jobs().await, 0);
}

#[tokio::test]
async fn initiate_on_non_paid_order_is_not_payable() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 2).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    let outcome = h.state.payouts.initiate_payout(orders[1].id).await.unwrap();
    assert!(matches!(outcome, PayoutOutcome::NotPayable { status: PaymentOrderStatus::Pending }));
}

#[tokio::test]
async fn transfer_done_notice_lost_after_commit_is_restored_on_redelivery() {
    let h = Harness::new();
    let (seeded, order) = paid_first_order(&h).await;
    h.drain().await;
    let (transfer_id, _) = h.gateway.payouts().remove(0);

    h.faults.fail_next_enqueue(&format!("notify:{}:RECEIVED", order.id));
    let done = transfer_event("evt_t1", &transfer_id, "DONE", None);
    let first = h.state.reconciler.handle_gateway_event(done.clone()).await;
    assert!(matches!(first, Err(AppError::DatabaseError(_))));
    assert_eq!(h.order(order.id).await.status, PaymentOrderStatus::Received);

    let redelivery = h.state.reconciler.handle_gateway_event(done.clone()).await.unwrap();
    let again = h.state.reconciler.handle_gateway_event(done).await.unwrap();
    assert_eq!(redelivery, ReconcileOutcome::AlreadyApplied);
    assert_eq!(again, ReconcileOutcome::AlreadyApplied);

    h.drain().await;
    let landlord_notices = h.sink.delivered_to(seeded.landlord_id);
    assert_eq!(landlord_notices.iter().filter(|d| d.title == "Repasse concluído").count(), 1);
}

#[tokio::test]
async fn each_admin_receives_a_failed_transfer_escalation_exactly_once() {
    let h = Harness::with_admins(2);
    let (_, order) = paid_first_order(&h).await;
    h.drain().await;
    let (transfer_id, _) = h.gateway.payouts().remove(0);

    // A entrega para o segundo administrador falha uma vez
    h.sink.fail_once_for(h.admin_ids[1]);
    h.state
        .reconciler
        .handle_gateway_event(transfer_event("evt_t1", &transfer_id, "FAILED", Some("Conta encerrada")))
        .await
        .unwrap();
    h.drain().await;

    for admin in &h.admin_ids {
        let received: Vec<_> = h
            .sink
            .delivered_to(*admin)
            .into_iter()
            .filter(|d| d.title == "Repasse falhou no gateway")
            .collect();
        assert_eq!(received.len(), 1, "admin {}", admin);
        assert!(received[0].message.contains(&order.id.to_string()));
    }
    assert_eq!(h.escalations().await.len(), 1);
    assert_eq!(h.dead_jobs().await, 0);
}
