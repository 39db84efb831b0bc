//! Stock correction tests
//!
//! - Price and quantity corrections with audit rows
//! - Reversal-and-replace movement corrections
//! - Rejections leave every counter untouched

mod common;

use common::Harness;
use ledger_backend::error::AppError;
use ledger_backend::services::{CorrectionKind, CorrectionRequest, MovementContext};
use ledger_backend::store::InventoryStore;
use rust_decimal::Decimal;
use shared::{AuditAction, MovementType, Pagination, RequestProvenance};
use uuid::Uuid;

fn provenance() -> RequestProvenance {
    RequestProvenance {
        ip_address: Some("192.168.1.20".to_string()),
        user_agent: Some("Mozilla/5.0".to_string()),
    }
}

fn request(work_id: Uuid, kind: CorrectionKind, reason: &str) -> CorrectionRequest {
    CorrectionRequest {
        work_id,
        kind,
        reason: reason.to_string(),
    }
}

fn assert_rejected(err: AppError) {
    assert!(
        matches!(err, AppError::CorrectionRejected(_)),
        "expected CorrectionRejected, got {err:?}"
    );
}

// ============================================================================
// Price and quantity
// ============================================================================

#[tokio::test]
async fn price_correction_books_a_zero_quantity_entry() {
    let h = Harness::new();
    let work = h.seed_work(10).await;

    let outcome = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Price {
                    original_value: Decimal::from(1000),
                    corrected_value: Decimal::from(1200),
                },
                "price error",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.work.price, Decimal::from(1200));
    assert_eq!(outcome.work.stock, 10);
    assert_eq!(outcome.movements.len(), 1);

    let entry = &outcome.movements[0];
    assert_eq!(entry.movement_type, MovementType::Correction);
    assert_eq!(entry.quantity, 0);
    assert!(entry.is_correction);
    assert_eq!(entry.correction_reason.as_deref(), Some("price error"));
    assert_eq!(entry.unit_price, Some(Decimal::from(1200)));

    let (logs, total) = h.store.audit_logs(&Pagination::default()).await.unwrap();
    assert_eq!(total, 1);
    assert_eq!(logs[0].id, outcome.audit_id);
    assert_eq!(logs[0].action, AuditAction::StockCorrection);
    assert_eq!(logs[0].details["correction_type"], "price");
    assert_eq!(logs[0].details["reason"], "price error");
    assert_eq!(logs[0].ip_address.as_deref(), Some("192.168.1.20"));

    assert_eq!(h.work(work.id).await.stock, 10);
}

#[tokio::test]
async fn quantity_correction_sets_absolute_stock() {
    let h = Harness::new();
    let work = h.seed_work(10).await;

    let outcome = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Quantity {
                    original_value: 10,
                    corrected_value: 7,
                },
                "Inventaire physique",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.work.stock, 7);
    assert_eq!(outcome.work.physical_stock, 7);
    assert_eq!(outcome.movements[0].quantity, -3);
    assert_eq!(outcome.movements[0].resulting_stock, Some(7));
    assert_eq!(h.ledger_sum(work.id).await, 7);

    let (logs, _) = h.store.audit_logs(&Pagination::default()).await.unwrap();
    assert_eq!(logs[0].details["before"]["stock"], 10);
    assert_eq!(logs[0].details["after"]["stock"], 7);
}

#[tokio::test]
async fn stale_original_value_is_rejected() {
    let h = Harness::new();
    let work = h.seed_work(10).await;

    let err = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Quantity {
                    original_value: 9,
                    corrected_value: 4,
                },
                "Inventaire",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();

    assert_rejected(err);
    assert_eq!(h.work(work.id).await.stock, 10);
    assert_eq!(h.store.all_movements().await.len(), 1);
}

#[tokio::test]
async fn blank_reason_is_rejected() {
    let h = Harness::new();
    let work = h.seed_work(10).await;

    for reason in ["", "   "] {
        let err = h
            .corrections()
            .correct(
                request(
                    work.id,
                    CorrectionKind::Quantity {
                        original_value: 10,
                        corrected_value: 8,
                    },
                    reason,
                ),
                &h.publisher,
                &provenance(),
            )
            .await
            .unwrap_err();
        assert_rejected(err);
    }

    let (_, total) = h.store.audit_logs(&Pagination::default()).await.unwrap();
    assert_eq!(total, 0);
}

#[tokio::test]
async fn negative_and_no_op_corrections_are_rejected() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let service = h.corrections();

    for kind in [
        CorrectionKind::Quantity {
            original_value: 10,
            corrected_value: -1,
        },
        CorrectionKind::Quantity {
            original_value: 10,
            corrected_value: 10,
        },
        CorrectionKind::Price {
            original_value: Decimal::from(1000),
            corrected_value: Decimal::ZERO,
        },
        CorrectionKind::Price {
            original_value: Decimal::from(1000),
            corrected_value: Decimal::from(1000),
        },
    ] {
        let err = service
            .correct(request(work.id, kind, "Erreur de saisie"), &h.publisher, &provenance())
            .await
            .unwrap_err();
        assert_rejected(err);
    }
    assert_eq!(h.work(work.id).await, work);
}

#[tokio::test]
async fn unknown_work_is_rejected() {
    let h = Harness::new();
    let err = h
        .corrections()
        .correct(
            request(
                Uuid::new_v4(),
                CorrectionKind::Quantity {
                    original_value: 0,
                    corrected_value: 1,
                },
                "Erreur",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();
    assert_rejected(err);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let err = CorrectionRequest::from_json(serde_json::json!({
        "work_id": "not-a-uuid",
        "correction_type": "quantity",
        "original_value": 1,
        "corrected_value": 2,
        "reason": "x",
    }))
    .unwrap_err();
    assert_rejected(err);
}

// ============================================================================
// Movement corrections
// ============================================================================

#[tokio::test]
async fn movement_correction_reverses_and_replaces() {
    let h = Harness::new();
    let partner_id = Uuid::new_v4();
    let work = h.seed_work(50).await;
    let receipt = h
        .ledger()
        .allocate(partner_id, work.id, 10, MovementContext::new(h.publisher.id, "Dépôt"))
        .await
        .unwrap();
    let allocation = receipt.movements[0].clone();

    let outcome = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Movement {
                    movement_id: allocation.id,
                    corrected_value: 6,
                },
                "Quantité livrée erronée",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.movements.len(), 2);
    assert!(outcome
        .movements
        .iter()
        .all(|m| m.corrected_movement_id == Some(allocation.id) && m.is_correction));
    assert_eq!(outcome.movements[0].partner_quantity, -10);
    assert_eq!(outcome.movements[1].partner_quantity, 6);
    assert_eq!(outcome.movements[0].reference, format!("CANCEL_{}", allocation.reference));
    assert_eq!(outcome.movements[1].reference, format!("CORRECTED_{}", allocation.reference));

    assert_eq!(outcome.work.stock, 44);
    let stock = h.store.partner_stock(partner_id, work.id).await.unwrap().unwrap();
    assert_eq!(stock.allocated_quantity, 6);
    assert_eq!(h.ledger_sum(work.id).await, 44);

    // the original entry is never edited
    let original = h.store.movement(allocation.id).await.unwrap().unwrap();
    assert_eq!(original, allocation);
}

#[tokio::test]
async fn repeated_movement_corrections_are_additive() {
    let h = Harness::new();
    let partner_id = Uuid::new_v4();
    let work = h.seed_work(50).await;
    let allocation = h
        .ledger()
        .allocate(partner_id, work.id, 10, MovementContext::new(h.publisher.id, "Dépôt"))
        .await
        .unwrap()
        .movements[0]
        .clone();
    let service = h.corrections();
    let correction = || {
        request(
            work.id,
            CorrectionKind::Movement {
                movement_id: allocation.id,
                corrected_value: 6,
            },
            "Quantité livrée erronée",
        )
    };

    service
        .correct(correction(), &h.publisher, &provenance())
        .await
        .unwrap();
    let once = h.store.partner_stock(partner_id, work.id).await.unwrap().unwrap();
    assert_eq!(once.allocated_quantity, 6);

    service
        .correct(correction(), &h.publisher, &provenance())
        .await
        .unwrap();
    let twice = h.store.partner_stock(partner_id, work.id).await.unwrap().unwrap();

    // second call applies its own delta (6 - 10) again
    assert_eq!(twice.allocated_quantity, once.allocated_quantity - 4);
    assert_eq!(h.work(work.id).await.stock, 48);
    assert_eq!(h.ledger_sum(work.id).await, 48);
}

#[tokio::test]
async fn correction_breaking_the_allocation_bound_is_an_integrity_violation() {
    let h = Harness::new();
    let partner_id = Uuid::new_v4();
    let work = h.seed_work(50).await;
    let ledger = h.ledger();
    let allocation = ledger
        .allocate(partner_id, work.id, 10, MovementContext::new(h.publisher.id, "Dépôt"))
        .await
        .unwrap()
        .movements[0]
        .clone();
    ledger
        .partner_sale(partner_id, work.id, 8, MovementContext::new(partner_id, "Ventes"))
        .await
        .unwrap();

    let err = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Movement {
                    movement_id: allocation.id,
                    corrected_value: 5,
                },
                "Quantité livrée erronée",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::IntegrityViolation(_)), "got {err:?}");
    let stock = h.store.partner_stock(partner_id, work.id).await.unwrap().unwrap();
    assert_eq!(stock.allocated_quantity, 10);
    assert_eq!(stock.sold_quantity, 8);
    assert_eq!(h.work(work.id).await.stock, 40);
}

#[tokio::test]
async fn correction_driving_stock_negative_is_an_integrity_violation() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let seed_entry = h.store.all_movements().await[0].clone();
    h.ledger()
        .record_movement(
            work.id,
            None,
            MovementType::Sale,
            8,
            MovementContext::new(h.publisher.id, "Vente directe"),
        )
        .await
        .unwrap();

    let err = h
        .corrections()
        .correct(
            request(
                work.id,
                CorrectionKind::Movement {
                    movement_id: seed_entry.id,
                    corrected_value: 0,
                },
                "Tirage jamais livré",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::IntegrityViolation(_)), "got {err:?}");
    assert_eq!(h.work(work.id).await.stock, 2);
}

#[tokio::test]
async fn entries_that_moved_nothing_cannot_be_corrected() {
    let h = Harness::new();
    let work = h.seed_work(10).await;
    let service = h.corrections();
    let price_fix = service
        .correct(
            request(
                work.id,
                CorrectionKind::Price {
                    original_value: Decimal::from(1000),
                    corrected_value: Decimal::from(900),
                },
                "Remise",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap();

    let err = service
        .correct(
            request(
                work.id,
                CorrectionKind::Movement {
                    movement_id: price_fix.movements[0].id,
                    corrected_value: 3,
                },
                "Erreur",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();
    assert_rejected(err);
}

#[tokio::test]
async fn movement_of_another_work_is_rejected() {
    let h = Harness::new();
    let first = h.seed_work(10).await;
    let second = h.seed_work(10).await;
    let foreign = h
        .store
        .all_movements()
        .await
        .into_iter()
        .find(|m| m.work_id == second.id)
        .unwrap();

    let err = h
        .corrections()
        .correct(
            request(
                first.id,
                CorrectionKind::Movement {
                    movement_id: foreign.id,
                    corrected_value: 5,
                },
                "Erreur",
            ),
            &h.publisher,
            &provenance(),
        )
        .await
        .unwrap_err();
    assert_rejected(err);
}
