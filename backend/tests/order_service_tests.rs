//! Order creation, deposit scheduling and payments

mod common;

use chrono::Duration;
use common::Harness;
use ledger_backend::clock::Clock;
use ledger_backend::error::AppError;
use ledger_backend::services::order::{CreateOrderInput, OrderItemInput};
use ledger_backend::store::NotificationStore;
use rust_decimal::Decimal;
use shared::{
    ChainStatus, NotificationType, OrderChannel, OrderStatus, PaymentMethod, PaymentStatus,
    RequestProvenance, MAX_QUANTITY,
};
use uuid::Uuid;

fn depot_input(work_id: Uuid, quantity: i64, due: Option<chrono::DateTime<chrono::Utc>>) -> CreateOrderInput {
    CreateOrderInput {
        buyer_id: Some(Uuid::new_v4()),
        channel: OrderChannel::Retail,
        items: vec![OrderItemInput { work_id, quantity }],
        payment_method: PaymentMethod::Depot,
        payment_due_date: due,
    }
}

#[tokio::test]
async fn deposit_order_schedules_confirmation_and_reminder() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let now = h.clock.now();
    let due = now + Duration::days(10);

    let view = h
        .orders()
        .create(&h.publisher, depot_input(work.id, 2, Some(due)))
        .await
        .unwrap();

    assert_eq!(view.total, Decimal::from(2000));
    assert_eq!(view.order.remaining_amount, Decimal::from(2000));
    assert_eq!(view.order.status, OrderStatus::Pending);

    let chains = h.store.chains_for_order(view.order.id).await.unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].notification_type, NotificationType::Confirmation);
    assert_eq!(chains[0].scheduled_date, now);
    assert_eq!(chains[1].notification_type, NotificationType::Reminder);
    assert_eq!(chains[1].scheduled_date, due - Duration::days(1));
    assert!(chains.iter().all(|c| c.client_id == Some(view.order.buyer_id)));
    assert!(chains.iter().all(|c| c.send_sms && c.send_email));
    assert!(chains[0].title.contains(&view.reference));
}

#[tokio::test]
async fn reminder_is_never_scheduled_in_the_past() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let now = h.clock.now();

    let view = h
        .orders()
        .create(&h.publisher, depot_input(work.id, 1, Some(now + Duration::hours(6))))
        .await
        .unwrap();

    let chains = h.store.chains_for_order(view.order.id).await.unwrap();
    assert_eq!(chains[1].notification_type, NotificationType::Reminder);
    assert_eq!(chains[1].scheduled_date, now);
}

#[tokio::test]
async fn immediate_orders_schedule_nothing() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let order = h.pending_order(OrderChannel::Retail, &[(work.id, 1)]).await;

    assert_eq!(order.payment_due_date, None);
    assert!(h.store.chains_for_order(order.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deposit_needs_a_future_due_date() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let now = h.clock.now();

    for due in [None, Some(now), Some(now - Duration::days(1))] {
        let result = h
            .orders()
            .create(&h.publisher, depot_input(work.id, 1, due))
            .await;
        match result {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "payment_due_date"),
            other => panic!("expected a due date rejection, got {:?}", other.map(|v| v.order.id)),
        }
    }
}

#[tokio::test]
async fn order_lines_are_checked() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let orders = h.orders();

    let mut empty = depot_input(work.id, 1, Some(h.clock.now() + Duration::days(3)));
    empty.items.clear();
    assert!(matches!(
        orders.create(&h.publisher, empty).await,
        Err(AppError::Validation { .. })
    ));

    for quantity in [0, -2] {
        let mut input = depot_input(work.id, quantity, Some(h.clock.now() + Duration::days(3)));
        input.payment_method = PaymentMethod::Immediate;
        assert!(matches!(
            orders.create(&h.publisher, input).await,
            Err(AppError::Validation { .. })
        ));
    }

    let unknown = depot_input(Uuid::new_v4(), 1, Some(h.clock.now() + Duration::days(3)));
    assert!(matches!(
        orders.create(&h.publisher, unknown).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn failed_chain_write_stores_no_deposit_order() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    h.store.fail_chain_writes("connection reset").await;

    let result = h
        .orders()
        .create(
            &h.publisher,
            depot_input(work.id, 2, Some(h.clock.now() + Duration::days(5))),
        )
        .await;

    assert!(matches!(result, Err(AppError::Internal(_))));
    assert!(h.store.all_orders().await.is_empty());
    h.clock.advance(Duration::days(30));
    assert!(h.store.due_chains(h.clock.now()).await.unwrap().is_empty());

    // Orders without chains are unaffected
    let order = h.pending_order(OrderChannel::Retail, &[(work.id, 1)]).await;
    assert_eq!(h.store.all_orders().await.len(), 1);
    assert_eq!(h.order(order.id).await.status, OrderStatus::Pending);
}

#[tokio::test]
async fn oversized_lines_are_rejected_before_anything_is_stored() {
    let h = Harness::new();
    let work = h.seed_work(5).await;

    for quantity in [i64::MAX, MAX_QUANTITY + 1] {
        let mut input = depot_input(work.id, quantity, None);
        input.payment_method = PaymentMethod::Immediate;
        input.items.push(OrderItemInput {
            work_id: work.id,
            quantity,
        });
        match h.orders().create(&h.publisher, input).await {
            Err(AppError::Validation { field, .. }) => assert_eq!(field, "quantity"),
            other => panic!("expected a quantity rejection, got {:?}", other.map(|v| v.order.id)),
        }
    }

    assert!(h.store.all_orders().await.is_empty());
    assert_eq!(h.work(work.id).await.stock, 5);
    assert_eq!(h.ledger_sum(work.id).await, 5);
}

#[tokio::test]
async fn creation_leaves_no_ledger_footprint() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let before = h.store.all_movements().await.len();

    h.pending_order(OrderChannel::Retail, &[(work.id, 4)]).await;
    h.orders()
        .create(
            &h.publisher,
            depot_input(work.id, 3, Some(h.clock.now() + Duration::days(3))),
        )
        .await
        .unwrap();

    assert_eq!(h.store.all_movements().await.len(), before);
    assert_eq!(h.work(work.id).await.stock, 10);
}

#[tokio::test]
async fn buyer_defaults_to_the_caller() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let mut input = depot_input(work.id, 1, None);
    input.buyer_id = None;
    input.payment_method = PaymentMethod::Immediate;

    let view = h.orders().create(&h.publisher, input).await.unwrap();
    assert_eq!(view.order.buyer_id, h.publisher.id);
    assert_eq!(view.order.created_by, h.publisher.id);
}

#[tokio::test]
async fn partial_then_full_payment() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let view = h
        .orders()
        .create(
            &h.publisher,
            depot_input(work.id, 3, Some(h.clock.now() + Duration::days(5))),
        )
        .await
        .unwrap();
    let orders = h.orders();

    let partial = orders
        .record_payment(view.order.id, Decimal::from(1200))
        .await
        .unwrap();
    assert_eq!(partial.order.remaining_amount, Decimal::from(1800));
    assert_eq!(partial.order.payment_status, PaymentStatus::Unpaid);
    let chains = h.store.chains_for_order(view.order.id).await.unwrap();
    assert!(chains.iter().all(|c| c.status == ChainStatus::Active));

    let settled = orders
        .record_payment(view.order.id, Decimal::from(1800))
        .await
        .unwrap();
    assert_eq!(settled.order.remaining_amount, Decimal::ZERO);
    assert_eq!(settled.order.payment_status, PaymentStatus::Paid);

    let chains = h.store.chains_for_order(view.order.id).await.unwrap();
    assert!(chains.iter().all(|c| c.status == ChainStatus::Inactive));
    h.clock.advance(Duration::days(30));
    assert!(h.store.due_chains(h.clock.now()).await.unwrap().is_empty());
}

#[tokio::test]
async fn payment_bounds() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let order = h.pending_order(OrderChannel::Retail, &[(work.id, 1)]).await;
    let orders = h.orders();

    for amount in [Decimal::ZERO, Decimal::from(-5), Decimal::from(1001)] {
        assert!(matches!(
            orders.record_payment(order.id, amount).await,
            Err(AppError::Validation { .. })
        ));
    }
    assert_eq!(h.order(order.id).await.remaining_amount, Decimal::from(1000));

    orders
        .record_payment(order.id, Decimal::from(1000))
        .await
        .unwrap();
    assert!(matches!(
        orders.record_payment(order.id, Decimal::ONE).await,
        Err(AppError::Conflict { .. })
    ));

    assert!(matches!(
        orders.record_payment(Uuid::new_v4(), Decimal::ONE).await,
        Err(AppError::NotFound(_))
    ));
}

#[tokio::test]
async fn cancelled_orders_cannot_be_paid() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let order = h.pending_order(OrderChannel::Retail, &[(work.id, 1)]).await;
    h.state_machine()
        .transition(
            order.id,
            OrderStatus::Cancelled,
            &h.publisher,
            &RequestProvenance::default(),
        )
        .await
        .unwrap();

    assert!(matches!(
        h.orders().record_payment(order.id, Decimal::from(1000)).await,
        Err(AppError::Validation { .. })
    ));
}

#[tokio::test]
async fn paid_order_keeps_its_lifecycle() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let order = h.pending_order(OrderChannel::Retail, &[(work.id, 2)]).await;
    h.orders()
        .record_payment(order.id, Decimal::from(2000))
        .await
        .unwrap();

    let validated = h
        .state_machine()
        .transition(
            order.id,
            OrderStatus::Validated,
            &h.publisher,
            &RequestProvenance::default(),
        )
        .await
        .unwrap();
    assert_eq!(validated.payment_status, PaymentStatus::Paid);
    assert_eq!(h.work(work.id).await.stock, 8);
}
