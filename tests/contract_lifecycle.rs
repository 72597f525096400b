mod common;

use rust_decimal_macros::dec;

use common::{date, payment_event, Harness};
use rental_backend::{
    common::error::AppError,
    db::LedgerStore,
    models::{
        contract::ContractStatus,
        payment::{BillingType, PaymentOrderStatus, TransferStatus},
        webhook::SignatureEvent,
    },
    services::{contract_service::ActivationSource, reconciler_service::ReconcileOutcome},
};

#[tokio::test]
async fn activation_creates_one_order_per_month_with_frozen_amount() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 12).await;

    let activation = h.activate(seeded.contract.id).await;

    assert_eq!(activation.contract.status, ContractStatus::Active);
    assert!(!activation.already_active);
    assert_eq!(activation.payment_orders.len(), 12);
    for (i, order) in activation.payment_orders.iter().enumerate() {
        assert_eq!(order.installment, i as i32 + 1);
        assert_eq!(order.amount_due, dec!(1500));
        assert_eq!(order.status, PaymentOrderStatus::Pending);
    }
    assert_eq!(activation.payment_orders[0].due_date, date(2030, 2, 10));
    assert_eq!(activation.payment_orders[11].due_date, date(2031, 1, 10));

    // Primeira cobrança emitida junto com a ativação
    let charges = h.gateway.created_charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].1.external_reference, activation.payment_orders[0].id);
    assert_eq!(charges[0].1.value, dec!(1500));
    assert_eq!(charges[0].1.billing_type, BillingType::Pix);
}

#[tokio::test]
async fn activating_twice_is_a_no_op() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 6).await;

    let first = h.activate(seeded.contract.id).await;
    let second = h.activate(seeded.contract.id).await;

    assert!(second.already_active);
    assert_eq!(second.payment_orders.len(), 6);
    let first_ids: Vec<_> = first.payment_orders.iter().map(|o| o.id).collect();
    let second_ids: Vec<_> = second.payment_orders.iter().map(|o| o.id).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(h.gateway.created_charges().len(), 1);
    assert_eq!(h.jobs_of_type("notify").await.len(), 1);
}

#[tokio::test]
async fn review_pipeline_only_moves_forward() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let id = seeded.contract.id;
    assert_eq!(seeded.contract.status, ContractStatus::PendingDocs);

    let err = h.state.contracts.advance(id, ContractStatus::AwaitingSignatures).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    h.state.contracts.advance(id, ContractStatus::UnderReview).await.unwrap();
    let contract = h.state.contracts.advance(id, ContractStatus::AwaitingSignatures).await.unwrap();
    assert_eq!(contract.status, ContractStatus::AwaitingSignatures);

    let err = h.state.contracts.advance(id, ContractStatus::UnderReview).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn signature_activation_requires_awaiting_signatures() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;

    let err = h
        .state
        .contracts
        .activate(seeded.contract.id, ActivationSource::Signature)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(h.store.list_payment_orders(seeded.contract.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_keeps_paid_orders_and_cancels_open_charges() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 4).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    // Parcela 1 paga e já com repasse pedido, parcela 2 com cobrança emitida
    let first_charge = h.charge_id_of(orders[0].id).await;
    h.state
        .reconciler
        .handle_gateway_event(payment_event("evt_1", "PAYMENT_RECEIVED", &first_charge, dec!(1500), dec!(1480)))
        .await
        .unwrap();
    h.drain().await;
    let paid_before = h.order(orders[0].id).await;
    let transfer_before = h.store.get_transfer_for_order(orders[0].id).await.unwrap().unwrap();
    assert_eq!(paid_before.status, PaymentOrderStatus::PayoutPending);
    let second_charge = h.state.charges.issue_charge(orders[1].id, None).await.unwrap();

    let cancellation = h.state.contracts.cancel(seeded.contract.id).await.unwrap();

    assert_eq!(cancellation.contract.status, ContractStatus::Cancelled);
    assert_eq!(cancellation.cancelled_orders.len(), 3);
    assert!(cancellation.cancelled_orders.iter().all(|o| o.status == PaymentOrderStatus::Cancelled));
    assert_eq!(cancellation.charges_cancelled, 1);
    assert_eq!(cancellation.charge_cancel_failures, 0);
    assert_eq!(h.gateway.cancelled_charges(), vec![second_charge.external_charge_id]);

    // Parcela paga e seu repasse intocados
    let paid_after = h.order(orders[0].id).await;
    assert_eq!(paid_after.status, PaymentOrderStatus::PayoutPending);
    assert_eq!(paid_after.version, paid_before.version);
    let transfer_after = h.store.get_transfer_for_order(orders[0].id).await.unwrap().unwrap();
    assert_eq!(transfer_after.id, transfer_before.id);
    assert_eq!(transfer_after.status, TransferStatus::Pending);
    assert_eq!(transfer_after.value, transfer_before.value);
    assert_eq!(transfer_after.version, transfer_before.version);

    // Proprietário e inquilino avisados
    let notify_keys: Vec<String> = h
        .queue
        .jobs()
        .await
        .into_iter()
        .filter(|j| j.key.contains(":CANCELLED:"))
        .map(|j| j.key)
        .collect();
    assert_eq!(notify_keys.len(), 2);

    let err = h.state.contracts.cancel(seeded.contract.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn one_failed_charge_cancellation_does_not_stop_the_others() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;
    h.state.charges.issue_charge(orders[1].id, None).await.unwrap();
    h.state.charges.issue_charge(orders[2].id, None).await.unwrap();

    let stuck = h.charge_id_of(orders[0].id).await;
    h.gateway.fail_cancel_of(&stuck);

    let cancellation = h.state.contracts.cancel(seeded.contract.id).await.unwrap();

    assert_eq!(cancellation.cancelled_orders.len(), 3);
    assert_eq!(cancellation.charges_cancelled, 2);
    assert_eq!(cancellation.charge_cancel_failures, 1);
    assert!(!h.gateway.cancelled_charges().contains(&stuck));
}

#[tokio::test]
async fn paid_contracts_finish_after_end_date() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 1).await;
    let orders = h.activate(seeded.contract.id).await.payment_orders;

    assert!(h.state.contracts.finish_expired(date(2030, 3, 1)).await.unwrap().is_empty());

    let charge = h.charge_id_of(orders[0].id).await;
    h.state
        .reconciler
        .handle_gateway_event(payment_event("evt_1", "PAYMENT_RECEIVED", &charge, dec!(1500), dec!(1480)))
        .await
        .unwrap();

    let finished = h.state.contracts.finish_expired(date(2030, 3, 1)).await.unwrap();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].status, ContractStatus::Finished);
}

#[tokio::test]
async fn activation_notice_lost_after_commit_is_restored_when_the_signature_event_retries() {
    let h = Harness::new();
    let seeded = h.seed_contract(date(2030, 1, 10), 3).await;
    let id = seeded.contract.id;
    h.state.contracts.advance(id, ContractStatus::UnderReview).await.unwrap();
    h.state.contracts.advance(id, ContractStatus::AwaitingSignatures).await.unwrap();

    let envelope_id = seeded.contract.signature_envelope_id.clone().unwrap();
    let event = SignatureEvent { id: Some("sig_1".into()), event: "envelope.closed".into(), envelope_id };

    h.faults.fail_next_enqueue(&format!("notify:contract:{}:ACTIVE", id));
    let first = h.state.reconciler.handle_signature_event(event.clone()).await;
    assert!(matches!(first, Err(AppError::DatabaseError(_))));
    assert_eq!(h.state.contracts.get(id).await.unwrap().status, ContractStatus::Active);
    assert!(h.jobs_of_type("notify").await.is_empty());

    let retry = h.state.reconciler.handle_signature_event(event).await.unwrap();
    assert_eq!(retry, ReconcileOutcome::AlreadyApplied);
    assert_eq!(h.jobs_of_type("notify").await.len(), 1);

    h.drain().await;
    assert_eq!(
        h.sink.delivered_to(seeded.tenant_id).iter().filter(|d| d.title == "Contrato ativo").count(),
        1
    );
}
