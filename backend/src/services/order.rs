//! Order lifecycle: creation, status transitions and payments
//!
//! [`OrderStateMachine`] is the only path that changes an order's status.
//! Each transition plans its ledger side effects and commits them together
//! with a compare-and-set on the status, so a failed guard leaves both the
//! order and the counters untouched.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    partner_availability, validate_positive_quantity, Actor, AuditAction, AuditLog, MovementType,
    Order, OrderChannel, OrderItem, OrderStatus, PaymentMethod, PaymentStatus,
    RequestProvenance,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{build_entry, MovementContext};
use crate::services::notification::NotificationChainService;
use crate::store::{
    CounterAdjustment, Guard, InventoryStore, LedgerUnit, OrderStatusChange,
};

// ============================================================================
// State machine
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionInput {
    pub status: OrderStatus,
}

#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Move an order to `target`, applying the stock effects of that step
    pub async fn transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor: &Actor,
        provenance: &RequestProvenance,
    ) -> AppResult<Order> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if !order.status.can_transition_to(target) {
            tracing::warn!(
                order_id = %order.id,
                from = order.status.as_str(),
                to = target.as_str(),
                "Rejected order transition"
            );
            return Err(AppError::InvalidTransition {
                from: order.status,
                to: target,
            });
        }

        let at = self.clock.now();
        let mut unit = LedgerUnit {
            at,
            order_change: Some(OrderStatusChange {
                order_id: order.id,
                from: order.status,
                to: target,
                at,
            }),
            ..Default::default()
        };

        match target {
            OrderStatus::Validated => {
                self.plan_validation(&order, actor, &mut unit).await?;
                unit.audit = Some(order_audit(
                    &order,
                    AuditAction::OrderValidated,
                    target,
                    actor,
                    provenance,
                    at,
                ));
            }
            OrderStatus::Delivered => plan_delivery(&order, actor, &mut unit),
            OrderStatus::Cancelled => {
                plan_cancellation(&order, actor, &mut unit);
                unit.audit = Some(order_audit(
                    &order,
                    AuditAction::OrderCancelled,
                    target,
                    actor,
                    provenance,
                    at,
                ));
            }
            OrderStatus::Processing | OrderStatus::Shipped | OrderStatus::Pending => {}
        }

        let movements = unit.movements.len();
        let receipt = self.store.commit(unit).await?;
        let updated = receipt
            .order
            .ok_or_else(|| AppError::Internal("transition committed without order".to_string()))?;

        tracing::info!(
            order_id = %updated.id,
            reference = %updated.reference(),
            from = order.status.as_str(),
            to = updated.status.as_str(),
            movements,
            "Order transitioned"
        );
        Ok(updated)
    }

    async fn plan_validation(
        &self,
        order: &Order,
        actor: &Actor,
        unit: &mut LedgerUnit,
    ) -> AppResult<()> {
        match order.channel {
            OrderChannel::Retail => {
                for item in &order.items {
                    push_item(
                        unit,
                        order,
                        item,
                        item.unit_price,
                        None,
                        MovementType::Sale,
                        actor,
                    );
                }
            }
            OrderChannel::PartnerRestock { partner_id } => {
                // Allocations are priced like direct ones, at the work's current price
                for item in &order.items {
                    let work = self
                        .store
                        .work(item.work_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound("Work".to_string()))?;
                    push_item(
                        unit,
                        order,
                        item,
                        work.price,
                        Some(partner_id),
                        MovementType::PartnerAllocation,
                        actor,
                    );
                }
            }
            OrderChannel::PartnerRetail { partner_id } => {
                // Consignment copies are only booked at delivery; check they exist now
                for (work_id, requested) in quantities_by_work(&order.items) {
                    let stock = self.store.partner_stock(partner_id, work_id).await?;
                    let availability = partner_availability(work_id, stock.as_ref())?;
                    if availability.available < requested {
                        return Err(AppError::InsufficientStock {
                            work_id,
                            requested,
                            available: availability.available,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn plan_delivery(order: &Order, actor: &Actor, unit: &mut LedgerUnit) {
    if let OrderChannel::PartnerRetail { partner_id } = order.channel {
        for item in &order.items {
            push_item(
                unit,
                order,
                item,
                item.unit_price,
                Some(partner_id),
                MovementType::PartnerSale,
                actor,
            );
        }
    }
}

/// Undo what validation booked; a pending order has nothing to release
fn plan_cancellation(order: &Order, actor: &Actor, unit: &mut LedgerUnit) {
    if !order.status.holds_reservation() {
        return;
    }
    match order.channel {
        OrderChannel::Retail => {
            for item in &order.items {
                push_item(
                    unit,
                    order,
                    item,
                    item.unit_price,
                    None,
                    MovementType::SaleCancellation,
                    actor,
                );
            }
        }
        OrderChannel::PartnerRestock { partner_id } => {
            for item in &order.items {
                push_item(
                    unit,
                    order,
                    item,
                    item.unit_price,
                    Some(partner_id),
                    MovementType::PartnerReturn,
                    actor,
                );
            }
        }
        OrderChannel::PartnerRetail { .. } => {}
    }
}

fn push_item(
    unit: &mut LedgerUnit,
    order: &Order,
    item: &OrderItem,
    unit_price: Decimal,
    partner_id: Option<Uuid>,
    movement_type: MovementType,
    actor: &Actor,
) {
    let Some(shape) = movement_type.shape(item.quantity) else {
        return;
    };
    let ctx = MovementContext::new(
        actor.id,
        format!("{} {}", movement_type.as_str(), order.reference()),
    )
    .with_order(
        order.id,
        format!("{}_{}", order.reference(), movement_type.as_str()),
    )
    .with_unit_price(unit_price);

    unit.movements.push(build_entry(
        item.work_id,
        partner_id,
        movement_type,
        shape,
        &ctx,
        unit.at,
    ));
    unit.adjustments.push(CounterAdjustment {
        work_id: item.work_id,
        partner_id,
        shape,
        guard: Guard::Availability,
    });
}

fn quantities_by_work(items: &[OrderItem]) -> BTreeMap<Uuid, i64> {
    let mut totals = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.work_id).or_insert(0i64);
        *total = total.saturating_add(item.quantity);
    }
    totals
}

fn order_audit(
    order: &Order,
    action: AuditAction,
    target: OrderStatus,
    actor: &Actor,
    provenance: &RequestProvenance,
    at: DateTime<Utc>,
) -> AuditLog {
    AuditLog {
        id: Uuid::new_v4(),
        user_id: actor.id,
        action,
        details: serde_json::json!({
            "order_id": order.id,
            "reference": order.reference(),
            "channel": order.channel.as_str(),
            "partner_id": order.channel.partner_id(),
            "from": order.status.as_str(),
            "to": target.as_str(),
            "total": order.total(),
            "items": order.items.iter().map(|item| serde_json::json!({
                "work_id": item.work_id,
                "quantity": item.quantity,
                "unit_price": item.unit_price,
            })).collect::<Vec<_>>(),
        }),
        ip_address: provenance.ip_address.clone(),
        user_agent: provenance.user_agent.clone(),
        created_at: at,
    }
}

// ============================================================================
// Creation and payment
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct OrderItemInput {
    pub work_id: Uuid,
    pub quantity: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    /// Defaults to the caller
    pub buyer_id: Option<Uuid>,
    pub channel: OrderChannel,
    pub items: Vec<OrderItemInput>,
    pub payment_method: PaymentMethod,
    pub payment_due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount: Decimal,
}

/// An order with the figures derived from its items
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub reference: String,
    pub total: Decimal,
    pub item_count: i64,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        Self {
            reference: order.reference(),
            total: order.total(),
            item_count: order.item_count(),
            order,
        }
    }
}

#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn InventoryStore>,
    chains: NotificationChainService,
    clock: Arc<dyn Clock>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn InventoryStore>,
        chains: NotificationChainService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            chains,
            clock,
        }
    }

    /// Create a pending order; no stock is reserved until validation
    pub async fn create(&self, actor: &Actor, input: CreateOrderInput) -> AppResult<OrderView> {
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "An order needs at least one item",
                "Une commande doit contenir au moins un article",
            ));
        }

        let now = self.clock.now();
        if input.payment_method == PaymentMethod::Depot {
            match input.payment_due_date {
                None => {
                    return Err(AppError::validation(
                        "payment_due_date",
                        "Deposit orders need a payment due date",
                        "Une date d'échéance est requise pour un dépôt",
                    ))
                }
                Some(due) if due <= now => {
                    return Err(AppError::validation(
                        "payment_due_date",
                        "Payment due date must be in the future",
                        "La date d'échéance doit être dans le futur",
                    ))
                }
                Some(_) => {}
            }
        }

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            validate_positive_quantity(line.quantity).map_err(|e| {
                AppError::validation("quantity", e, "La quantité doit être positive")
            })?;
            let work = self
                .store
                .work(line.work_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Work".to_string()))?;
            if !work.status.is_sellable() {
                return Err(AppError::validation(
                    "work_id",
                    "Work is not on sale",
                    "Cette œuvre n'est pas en vente",
                ));
            }
            items.push(OrderItem {
                id: Uuid::new_v4(),
                work_id: work.id,
                quantity: line.quantity,
                unit_price: work.price,
            });
        }

        let mut order = Order {
            id: Uuid::new_v4(),
            buyer_id: input.buyer_id.unwrap_or(actor.id),
            created_by: actor.id,
            channel: input.channel,
            items,
            status: OrderStatus::Pending,
            payment_method: input.payment_method,
            payment_status: PaymentStatus::Unpaid,
            payment_due_date: match input.payment_method {
                PaymentMethod::Depot => input.payment_due_date,
                PaymentMethod::Immediate => None,
            },
            remaining_amount: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        };
        order.remaining_amount = order.total();

        let chains = self.chains.plan_for_deposit_order(&order, actor);
        self.store.insert_order(&order, &chains).await?;
        tracing::info!(
            order_id = %order.id,
            reference = %order.reference(),
            channel = order.channel.as_str(),
            payment_method = order.payment_method.as_str(),
            chains = chains.len(),
            "Order created"
        );

        Ok(order.into())
    }

    pub async fn get(&self, order_id: Uuid) -> AppResult<OrderView> {
        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
        Ok(order.into())
    }

    /// Subtract a payment from the remaining amount; settling the order stops its reminders
    pub async fn record_payment(&self, order_id: Uuid, amount: Decimal) -> AppResult<OrderView> {
        if amount <= Decimal::ZERO {
            return Err(AppError::validation(
                "amount",
                "Payment amount must be positive",
                "Le montant doit être positif",
            ));
        }

        let order = self
            .store
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;

        if order.status == OrderStatus::Cancelled {
            return Err(AppError::validation(
                "order_id",
                "Cancelled orders cannot be paid",
                "Une commande annulée ne peut pas être payée",
            ));
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(AppError::Conflict {
                resource: "payment".to_string(),
                message: "Order is already paid".to_string(),
                message_fr: "La commande est déjà payée".to_string(),
            });
        }
        if amount > order.remaining_amount {
            return Err(AppError::validation(
                "amount",
                "Payment exceeds the remaining amount",
                "Le paiement dépasse le montant restant",
            ));
        }

        let remaining = order.remaining_amount - amount;
        let status = if remaining.is_zero() {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Unpaid
        };
        let updated = self
            .store
            .update_order_payment(
                order.id,
                order.remaining_amount,
                remaining,
                status,
                self.clock.now(),
            )
            .await?;

        if status == PaymentStatus::Paid {
            let stopped = self.chains.deactivate_for_order(order.id).await?;
            tracing::info!(order_id = %order.id, stopped, "Order paid in full");
        } else {
            tracing::info!(order_id = %order.id, remaining = %remaining, "Partial payment recorded");
        }

        Ok(updated.into())
    }
}
