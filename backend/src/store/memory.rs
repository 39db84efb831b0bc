//! In-process store used by tests and local demos

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    AuditLog, ChainOrderSummary, ChainStatus, ClientContact, DueChain, MovementFilter,
    NotificationChain, Order, Pagination, PartnerStock, PaymentStatus, StockMovement, Work,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    apply_consignment, apply_stock, check_order_change, CommitReceipt, InventoryStore,
    LedgerUnit, NotificationStore,
};
use crate::error::{AppError, AppResult};

#[derive(Debug, Default)]
struct MemoryState {
    works: HashMap<Uuid, Work>,
    partner_stocks: HashMap<(Uuid, Uuid), PartnerStock>,
    movements: Vec<StockMovement>,
    orders: HashMap<Uuid, Order>,
    audit: Vec<AuditLog>,
    chains: Vec<NotificationChain>,
    clients: HashMap<Uuid, ClientContact>,
    /// When set, chain writes fail with this message
    chain_fault: Option<String>,
}

impl MemoryState {
    fn check_chain_writes(&self) -> AppResult<()> {
        match &self.chain_fault {
            Some(reason) => Err(AppError::Internal(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Both store traits over one mutex-guarded state.
///
/// `commit` stages every change, checks it, and only then applies it,
/// so a failed unit leaves the state untouched.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the contact details a chain's client resolves to
    pub async fn insert_client(&self, client: ClientContact) {
        self.state.lock().await.clients.insert(client.id, client);
    }

    /// Make every later chain write fail, as a lost database connection would
    pub async fn fail_chain_writes(&self, reason: &str) {
        self.state.lock().await.chain_fault = Some(reason.to_string());
    }

    /// Every ledger entry in insertion order
    pub async fn all_movements(&self) -> Vec<StockMovement> {
        self.state.lock().await.movements.clone()
    }

    pub async fn all_orders(&self) -> Vec<Order> {
        self.state.lock().await.orders.values().cloned().collect()
    }

    pub async fn all_partner_stocks(&self) -> Vec<PartnerStock> {
        self.state.lock().await.partner_stocks.values().cloned().collect()
    }
}

fn page<T: Clone>(items: Vec<T>, page: &Pagination) -> (Vec<T>, u64) {
    let total = items.len() as u64;
    let data = items
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect();
    (data, total)
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn insert_work(&self, work: &Work) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.works.contains_key(&work.id) {
            return Err(AppError::Conflict {
                resource: "work".to_string(),
                message: format!("Work {} already exists", work.id),
                message_fr: "Cette œuvre existe déjà".to_string(),
            });
        }
        state.works.insert(work.id, work.clone());
        Ok(())
    }

    async fn work(&self, id: Uuid) -> AppResult<Option<Work>> {
        Ok(self.state.lock().await.works.get(&id).cloned())
    }

    async fn partner_stock(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
    ) -> AppResult<Option<PartnerStock>> {
        Ok(self
            .state
            .lock()
            .await
            .partner_stocks
            .get(&(partner_id, work_id))
            .cloned())
    }

    async fn partner_stocks(&self, partner_id: Uuid) -> AppResult<Vec<PartnerStock>> {
        let state = self.state.lock().await;
        let mut stocks: Vec<PartnerStock> = state
            .partner_stocks
            .values()
            .filter(|s| s.partner_id == partner_id)
            .cloned()
            .collect();
        stocks.sort_by_key(|s| s.created_at);
        Ok(stocks)
    }

    async fn movement(&self, id: Uuid) -> AppResult<Option<StockMovement>> {
        let state = self.state.lock().await;
        Ok(state.movements.iter().find(|m| m.id == id).cloned())
    }

    async fn movements(
        &self,
        filter: &MovementFilter,
        pagination: &Pagination,
    ) -> AppResult<(Vec<StockMovement>, u64)> {
        let state = self.state.lock().await;
        let matching: Vec<StockMovement> = state
            .movements
            .iter()
            .rev()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();
        Ok(page(matching, pagination))
    }

    async fn insert_order(&self, order: &Order, chains: &[NotificationChain]) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if !chains.is_empty() {
            state.check_chain_writes()?;
        }
        state.orders.insert(order.id, order.clone());
        state.chains.extend(chains.iter().cloned());
        Ok(())
    }

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn update_order_payment(
        &self,
        order_id: Uuid,
        expected_remaining: Decimal,
        remaining: Decimal,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
        if order.remaining_amount != expected_remaining {
            return Err(AppError::Conflict {
                resource: "payment".to_string(),
                message: "Remaining amount changed concurrently".to_string(),
                message_fr: "Le montant restant a changé entre-temps".to_string(),
            });
        }
        order.remaining_amount = remaining;
        order.payment_status = status;
        order.updated_at = at;
        Ok(order.clone())
    }

    async fn audit_logs(&self, pagination: &Pagination) -> AppResult<(Vec<AuditLog>, u64)> {
        let state = self.state.lock().await;
        let logs: Vec<AuditLog> = state.audit.iter().rev().cloned().collect();
        Ok(page(logs, pagination))
    }

    async fn commit(&self, unit: LedgerUnit) -> AppResult<CommitReceipt> {
        let net = unit.net_effects()?;
        let mut state = self.state.lock().await;

        // Stage
        if let Some(change) = &unit.order_change {
            let order = state
                .orders
                .get(&change.order_id)
                .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
            check_order_change(order.status, change)?;
        }

        let mut staged_stock = Vec::with_capacity(net.stock.len());
        for (work_id, delta) in &net.stock {
            let work = state
                .works
                .get(work_id)
                .ok_or_else(|| AppError::NotFound("Work".to_string()))?;
            let next = apply_stock(*work_id, work.stock, unit.expected_stock_for(*work_id), delta)?;
            let physical = work.physical_stock.checked_add(delta.delta).ok_or_else(|| {
                AppError::IntegrityViolation(format!("quantity overflow on work {}", work_id))
            })?;
            staged_stock.push((*work_id, next, physical));
        }

        let mut staged_partner = Vec::with_capacity(net.partner.len());
        for (key, delta) in &net.partner {
            let current = state.partner_stocks.get(key).map(PartnerStock::counts);
            let next = apply_consignment(key.1, current, delta)?;
            staged_partner.push((*key, next));
        }

        for (work_id, _) in &unit.price_updates {
            if !state.works.contains_key(work_id) {
                return Err(AppError::NotFound("Work".to_string()));
            }
        }

        // Apply
        let mut receipt = CommitReceipt::default();
        let mut touched_works = Vec::new();

        for (work_id, next, physical) in staged_stock {
            if let Some(work) = state.works.get_mut(&work_id) {
                work.stock = next;
                work.physical_stock = physical;
                work.updated_at = unit.at;
            }
            touched_works.push(work_id);
        }
        for (work_id, price) in &unit.price_updates {
            if let Some(work) = state.works.get_mut(work_id) {
                work.price = *price;
                work.updated_at = unit.at;
            }
            if !touched_works.contains(work_id) {
                touched_works.push(*work_id);
            }
        }
        for work_id in touched_works {
            if let Some(work) = state.works.get(&work_id) {
                receipt.works.push(work.clone());
            }
        }

        for ((partner_id, work_id), counts) in staged_partner {
            let stock = state
                .partner_stocks
                .entry((partner_id, work_id))
                .or_insert_with(|| PartnerStock {
                    id: Uuid::new_v4(),
                    partner_id,
                    work_id,
                    allocated_quantity: 0,
                    sold_quantity: 0,
                    returned_quantity: 0,
                    created_at: unit.at,
                    updated_at: unit.at,
                });
            stock.apply_counts(counts);
            stock.updated_at = unit.at;
            receipt.partner_stocks.push(stock.clone());
        }

        if let Some(change) = &unit.order_change {
            if let Some(order) = state.orders.get_mut(&change.order_id) {
                order.status = change.to;
                order.updated_at = change.at;
                receipt.order = Some(order.clone());
            }
        }

        state.movements.extend(unit.movements.iter().cloned());
        receipt.movements = unit.movements;

        if let Some(audit) = unit.audit {
            state.audit.push(audit);
        }

        Ok(receipt)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_chain(&self, chain: &NotificationChain) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.check_chain_writes()?;
        state.chains.push(chain.clone());
        Ok(())
    }

    async fn chain(&self, id: Uuid) -> AppResult<Option<NotificationChain>> {
        let state = self.state.lock().await;
        Ok(state.chains.iter().find(|c| c.id == id).cloned())
    }

    async fn chains_for_order(&self, order_id: Uuid) -> AppResult<Vec<NotificationChain>> {
        let state = self.state.lock().await;
        let mut chains: Vec<NotificationChain> = state
            .chains
            .iter()
            .filter(|c| c.order_id == Some(order_id))
            .cloned()
            .collect();
        chains.sort_by_key(|c| c.scheduled_date);
        Ok(chains)
    }

    async fn set_chain_status(
        &self,
        id: Uuid,
        status: ChainStatus,
    ) -> AppResult<NotificationChain> {
        let mut state = self.state.lock().await;
        let chain = state
            .chains
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound("Notification chain".to_string()))?;
        chain.status = status;
        Ok(chain.clone())
    }

    async fn deactivate_unsent_chains(&self, order_id: Uuid) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut changed = 0;
        for chain in state
            .chains
            .iter_mut()
            .filter(|c| c.order_id == Some(order_id) && !c.is_sent)
        {
            if chain.status == ChainStatus::Active {
                chain.status = ChainStatus::Inactive;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn due_chains(&self, now: DateTime<Utc>) -> AppResult<Vec<DueChain>> {
        let state = self.state.lock().await;
        let mut due: Vec<DueChain> = state
            .chains
            .iter()
            .filter(|c| c.is_due(now))
            .map(|chain| DueChain {
                chain: chain.clone(),
                client: chain
                    .client_id
                    .and_then(|id| state.clients.get(&id))
                    .cloned(),
                order: chain
                    .order_id
                    .and_then(|id| state.orders.get(&id))
                    .map(|order| ChainOrderSummary {
                        id: order.id,
                        reference: order.reference(),
                        total: order.total(),
                        payment_due_date: order.payment_due_date,
                    }),
            })
            .collect();
        due.sort_by_key(|d| d.chain.scheduled_date);
        Ok(due)
    }

    async fn mark_chain_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let chain = state
            .chains
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound("Notification chain".to_string()))?;
        chain.is_sent = true;
        chain.sent_at = Some(sent_at);
        chain.failure_reason = None;
        Ok(())
    }

    async fn record_chain_failure(&self, id: Uuid, reason: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let chain = state
            .chains
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound("Notification chain".to_string()))?;
        chain.failure_reason = Some(reason.to_string());
        Ok(())
    }
}
