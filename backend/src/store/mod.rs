//! Persistence seam for the ledger and the notification scheduler
//!
//! Every stock-affecting write goes through [`InventoryStore::commit`], which
//! applies one [`LedgerUnit`] all-or-nothing: ledger rows, counter updates,
//! price updates, the order status change and the audit row either all land
//! or none do. Guards are re-checked inside the unit on the summed
//! per-counter delta, so a guard and its decrement are one atomic step.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    check_counts, AuditLog, ChainStatus, ConsignmentCounts, DueChain, MovementFilter,
    MovementShape, NotificationChain, Order, OrderStatus, Pagination, PartnerCounter,
    PartnerStock, PaymentStatus, StockMovement, Work,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Which error a failed counter check surfaces as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Business availability check: fails with `InsufficientStock`
    Availability,
    /// Invariant check on privileged writes: fails with `IntegrityViolation`
    Integrity,
}

impl Guard {
    fn stricter(self, other: Guard) -> Guard {
        if self == Guard::Availability || other == Guard::Availability {
            Guard::Availability
        } else {
            Guard::Integrity
        }
    }
}

/// Counter effect of one ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterAdjustment {
    pub work_id: Uuid,
    pub partner_id: Option<Uuid>,
    pub shape: MovementShape,
    pub guard: Guard,
}

/// Compare-and-set on an order's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusChange {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
}

/// One atomic unit of ledger work
#[derive(Debug, Clone, Default)]
pub struct LedgerUnit {
    /// Timestamp stamped on every row the unit touches
    pub at: DateTime<Utc>,
    pub movements: Vec<StockMovement>,
    pub adjustments: Vec<CounterAdjustment>,
    /// Work stock must equal this value before the unit applies
    pub expected_stock: Vec<(Uuid, i64)>,
    pub price_updates: Vec<(Uuid, Decimal)>,
    pub order_change: Option<OrderStatusChange>,
    pub audit: Option<AuditLog>,
}

/// State after a successful commit
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CommitReceipt {
    pub movements: Vec<StockMovement>,
    pub works: Vec<Work>,
    pub partner_stocks: Vec<PartnerStock>,
    pub order: Option<Order>,
}

/// Summed stock effect on one work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetStock {
    pub delta: i64,
    pub guard: Guard,
}

/// Summed consignment effect on one (partner, work) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetPartner {
    pub delta: ConsignmentCounts,
    pub guard: Guard,
}

/// Per-counter totals of a unit, keyed in lock order
#[derive(Debug, Clone, Default)]
pub struct NetEffects {
    pub stock: BTreeMap<Uuid, NetStock>,
    /// Keyed by `(partner_id, work_id)`
    pub partner: BTreeMap<(Uuid, Uuid), NetPartner>,
}

impl LedgerUnit {
    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
            && self.adjustments.is_empty()
            && self.price_updates.is_empty()
            && self.order_change.is_none()
            && self.audit.is_none()
    }

    /// Sum every adjustment per counter
    pub fn net_effects(&self) -> AppResult<NetEffects> {
        let mut net = NetEffects::default();

        for adjustment in &self.adjustments {
            let entry = net.stock.entry(adjustment.work_id).or_insert(NetStock {
                delta: 0,
                guard: adjustment.guard,
            });
            entry.delta = entry
                .delta
                .checked_add(adjustment.shape.stock_delta)
                .ok_or_else(|| overflow(adjustment.work_id))?;
            entry.guard = entry.guard.stricter(adjustment.guard);

            if let Some((counter, delta)) = adjustment.shape.partner {
                let partner_id = adjustment.partner_id.ok_or_else(|| {
                    AppError::Internal(format!(
                        "{} adjustment on work {} without a partner",
                        counter.as_str(),
                        adjustment.work_id
                    ))
                })?;
                let entry = net
                    .partner
                    .entry((partner_id, adjustment.work_id))
                    .or_insert(NetPartner {
                        delta: ConsignmentCounts::default(),
                        guard: adjustment.guard,
                    });
                entry
                    .delta
                    .checked_add(counter, delta)
                    .ok_or_else(|| overflow(adjustment.work_id))?;
                entry.guard = entry.guard.stricter(adjustment.guard);
            }
        }

        // Expected-stock checks need the row locked even when the delta is zero
        for (work_id, _) in &self.expected_stock {
            net.stock.entry(*work_id).or_insert(NetStock {
                delta: 0,
                guard: Guard::Integrity,
            });
        }

        Ok(net)
    }

    pub fn expected_stock_for(&self, work_id: Uuid) -> Option<i64> {
        self.expected_stock
            .iter()
            .find(|(id, _)| *id == work_id)
            .map(|(_, stock)| *stock)
    }
}

fn overflow(work_id: Uuid) -> AppError {
    AppError::IntegrityViolation(format!("quantity overflow on work {}", work_id))
}

/// Check a work's stock against its net delta and return the new value
pub fn apply_stock(
    work_id: Uuid,
    current: i64,
    expected: Option<i64>,
    net: &NetStock,
) -> AppResult<i64> {
    if let Some(expected) = expected {
        if expected != current {
            return Err(AppError::CorrectionRejected(format!(
                "stock of work {} is {}, not {}",
                work_id, current, expected
            )));
        }
    }

    let next = current
        .checked_add(net.delta)
        .ok_or_else(|| overflow(work_id))?;
    if next < 0 {
        return Err(match net.guard {
            Guard::Availability => AppError::InsufficientStock {
                work_id,
                requested: net.delta.saturating_neg(),
                available: current,
            },
            Guard::Integrity => AppError::IntegrityViolation(format!(
                "stock of work {} would become {}",
                work_id, next
            )),
        });
    }
    Ok(next)
}

/// Check a consignment against its net delta and return the new counters.
///
/// A missing row may only be created by a positive allocation.
pub fn apply_consignment(
    work_id: Uuid,
    current: Option<ConsignmentCounts>,
    net: &NetPartner,
) -> AppResult<ConsignmentCounts> {
    let base = current.unwrap_or_default();
    let available_before = match current {
        Some(counts) => check_counts(work_id, &counts)?,
        None => 0,
    };

    let mut next = base;
    for counter in [
        PartnerCounter::Allocated,
        PartnerCounter::Sold,
        PartnerCounter::Returned,
    ] {
        next.checked_add(counter, net.delta.get(counter))
            .ok_or_else(|| overflow(work_id))?;
    }

    if current.is_none() && net.delta.allocated <= 0 && net.delta != ConsignmentCounts::default() {
        return Err(match net.guard {
            Guard::Availability => AppError::InsufficientStock {
                work_id,
                requested: net.delta.sold.saturating_add(net.delta.returned),
                available: 0,
            },
            Guard::Integrity => AppError::IntegrityViolation(format!(
                "work {} is not allocated to this partner",
                work_id
            )),
        });
    }

    match check_counts(work_id, &next) {
        Ok(_) => Ok(next),
        Err(err) => Err(match net.guard {
            Guard::Availability => AppError::InsufficientStock {
                work_id,
                requested: net
                    .delta
                    .sold
                    .saturating_add(net.delta.returned)
                    .saturating_sub(net.delta.allocated),
                available: available_before,
            },
            Guard::Integrity => err.into(),
        }),
    }
}

/// Compare an order's stored status with the one a transition was planned from
pub fn check_order_change(current: OrderStatus, change: &OrderStatusChange) -> AppResult<()> {
    if current == change.from {
        return Ok(());
    }
    if !current.can_transition_to(change.to) {
        return Err(AppError::InvalidTransition {
            from: current,
            to: change.to,
        });
    }
    Err(AppError::Conflict {
        resource: "order".to_string(),
        message: format!(
            "Order {} moved from {} to {} concurrently",
            change.order_id, change.from, current
        ),
        message_fr: "Le statut de la commande a changé entre-temps".to_string(),
    })
}

/// Storage for works, consignments, the ledger, orders and the audit trail
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Cheap reachability probe for the health endpoint
    async fn ping(&self) -> AppResult<()>;

    async fn insert_work(&self, work: &Work) -> AppResult<()>;

    async fn work(&self, id: Uuid) -> AppResult<Option<Work>>;

    async fn partner_stock(&self, partner_id: Uuid, work_id: Uuid)
        -> AppResult<Option<PartnerStock>>;

    async fn partner_stocks(&self, partner_id: Uuid) -> AppResult<Vec<PartnerStock>>;

    async fn movement(&self, id: Uuid) -> AppResult<Option<StockMovement>>;

    /// Newest first, with the total number of matching rows
    async fn movements(
        &self,
        filter: &MovementFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<StockMovement>, u64)>;

    /// Insert an order, its items and the chains scheduled for it in one transaction
    async fn insert_order(&self, order: &Order, chains: &[NotificationChain]) -> AppResult<()>;

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>>;

    /// Compare-and-set on `remaining_amount`
    async fn update_order_payment(
        &self,
        order_id: Uuid,
        expected_remaining: Decimal,
        remaining: Decimal,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order>;

    async fn audit_logs(&self, page: &Pagination) -> AppResult<(Vec<AuditLog>, u64)>;

    /// Apply a unit atomically
    async fn commit(&self, unit: LedgerUnit) -> AppResult<CommitReceipt>;
}

/// Storage for payment notification chains
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_chain(&self, chain: &NotificationChain) -> AppResult<()>;

    async fn chain(&self, id: Uuid) -> AppResult<Option<NotificationChain>>;

    async fn chains_for_order(&self, order_id: Uuid) -> AppResult<Vec<NotificationChain>>;

    async fn set_chain_status(&self, id: Uuid, status: ChainStatus)
        -> AppResult<NotificationChain>;

    /// Deactivate every unsent chain of an order, returning how many changed
    async fn deactivate_unsent_chains(&self, order_id: Uuid) -> AppResult<u64>;

    /// Unsent, active chains scheduled at or before `now` with a channel requested.
    /// Read-only: selecting marks nothing.
    async fn due_chains(&self, now: DateTime<Utc>) -> AppResult<Vec<DueChain>>;

    async fn mark_chain_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> AppResult<()>;

    async fn record_chain_failure(&self, id: Uuid, reason: &str) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adjustment(work_id: Uuid, partner_id: Option<Uuid>, shape: MovementShape) -> CounterAdjustment {
        CounterAdjustment {
            work_id,
            partner_id,
            shape,
            guard: Guard::Availability,
        }
    }

    #[test]
    fn net_effects_sum_items_of_the_same_work() {
        let work_id = Uuid::new_v4();
        let unit = LedgerUnit {
            adjustments: vec![
                adjustment(work_id, None, MovementShape::publisher(-4)),
                adjustment(work_id, None, MovementShape::publisher(-6)),
            ],
            ..Default::default()
        };

        let net = unit.net_effects().unwrap();
        assert_eq!(net.stock[&work_id].delta, -10);
    }

    #[test]
    fn overflowing_net_delta_is_a_violation() {
        let work_id = Uuid::new_v4();
        let unit = LedgerUnit {
            adjustments: vec![
                adjustment(work_id, None, MovementShape::publisher(-i64::MAX)),
                adjustment(work_id, None, MovementShape::publisher(-i64::MAX)),
            ],
            ..Default::default()
        };
        assert!(matches!(
            unit.net_effects(),
            Err(AppError::IntegrityViolation(_))
        ));
    }

    #[test]
    fn overflowing_stock_is_a_violation() {
        let err = apply_stock(
            Uuid::new_v4(),
            i64::MAX,
            None,
            &NetStock {
                delta: 1,
                guard: Guard::Availability,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::IntegrityViolation(_)));
    }

    #[test]
    fn partner_shape_without_partner_is_rejected() {
        let unit = LedgerUnit {
            adjustments: vec![adjustment(
                Uuid::new_v4(),
                None,
                MovementShape::partner(PartnerCounter::Sold, 1),
            )],
            ..Default::default()
        };
        assert!(unit.net_effects().is_err());
    }

    #[test]
    fn stock_guard_reports_requested_and_available() {
        let work_id = Uuid::new_v4();
        let err = apply_stock(
            work_id,
            0,
            None,
            &NetStock {
                delta: -1,
                guard: Guard::Availability,
            },
        )
        .unwrap_err();

        match err {
            AppError::InsufficientStock {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn stock_guard_allows_exact_depletion() {
        let next = apply_stock(
            Uuid::new_v4(),
            10,
            None,
            &NetStock {
                delta: -10,
                guard: Guard::Availability,
            },
        )
        .unwrap();
        assert_eq!(next, 0);
    }

    #[test]
    fn expected_stock_mismatch_rejects_correction() {
        let err = apply_stock(
            Uuid::new_v4(),
            12,
            Some(10),
            &NetStock {
                delta: 5,
                guard: Guard::Integrity,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::CorrectionRejected(_)));
    }

    #[test]
    fn first_allocation_creates_consignment() {
        let mut delta = ConsignmentCounts::default();
        delta.checked_add(PartnerCounter::Allocated, 50).unwrap();
        let next = apply_consignment(
            Uuid::new_v4(),
            None,
            &NetPartner {
                delta,
                guard: Guard::Availability,
            },
        )
        .unwrap();
        assert_eq!(next.allocated, 50);
    }

    #[test]
    fn sale_without_consignment_is_insufficient() {
        let mut delta = ConsignmentCounts::default();
        delta.checked_add(PartnerCounter::Sold, 1).unwrap();
        let err = apply_consignment(
            Uuid::new_v4(),
            None,
            &NetPartner {
                delta,
                guard: Guard::Availability,
            },
        )
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::InsufficientStock { available: 0, .. }
        ));
    }

    #[test]
    fn overselling_consignment_under_integrity_guard_is_violation() {
        let current = ConsignmentCounts {
            allocated: 10,
            sold: 5,
            returned: 0,
        };
        let mut delta = ConsignmentCounts::default();
        delta.checked_add(PartnerCounter::Sold, 6).unwrap();
        let err = apply_consignment(
            Uuid::new_v4(),
            Some(current),
            &NetPartner {
                delta,
                guard: Guard::Integrity,
            },
        )
        .unwrap_err();
        assert!(matches!(err, AppError::IntegrityViolation(_)));
    }
}
