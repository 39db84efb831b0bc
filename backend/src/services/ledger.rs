//! Stock ledger: the single writer for publisher and partner stock counters
//!
//! Every stock-affecting event becomes one immutable [`StockMovement`]
//! committed together with its counter update.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    partner_availability, validate_positive_quantity, validate_price, validate_reason, AuditLog,
    MovementFilter, MovementShape, MovementType, PaginatedResponse, Pagination,
    PartnerAvailability, PartnerStock, StockLevel, StockMovement, Work, WorkStatus,
};
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::store::{CommitReceipt, CounterAdjustment, Guard, InventoryStore, LedgerUnit};

/// Who and why behind a ledger entry
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub performed_by: Uuid,
    pub reason: String,
    pub reference: Option<String>,
    pub order_id: Option<Uuid>,
    pub unit_price: Option<Decimal>,
}

impl MovementContext {
    pub fn new(performed_by: Uuid, reason: impl Into<String>) -> Self {
        Self {
            performed_by,
            reason: reason.into(),
            ..Default::default()
        }
    }

    pub fn with_order(mut self, order_id: Uuid, reference: String) -> Self {
        self.order_id = Some(order_id);
        self.reference = Some(reference);
        self
    }

    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// Build a ledger entry for `shape`; ids and timestamps are assigned here
pub fn build_entry(
    work_id: Uuid,
    partner_id: Option<Uuid>,
    movement_type: MovementType,
    shape: MovementShape,
    ctx: &MovementContext,
    at: DateTime<Utc>,
) -> StockMovement {
    let (partner_counter, partner_quantity) = match shape.partner {
        Some((counter, delta)) => (Some(counter), delta),
        None => (None, 0),
    };
    let primary = match shape.partner {
        Some((_, delta)) => delta,
        None => shape.stock_delta,
    };
    let reference = ctx.reference.clone().unwrap_or_else(|| {
        format!(
            "{}_{}_{}",
            movement_type.as_str(),
            work_id.simple(),
            at.timestamp_millis()
        )
    });

    StockMovement {
        id: Uuid::new_v4(),
        work_id,
        partner_id,
        movement_type,
        quantity: shape.stock_delta,
        partner_counter,
        partner_quantity,
        unit_price: ctx.unit_price,
        total_amount: ctx
            .unit_price
            .map(|price| price * Decimal::from(primary.abs())),
        reason: ctx.reason.clone(),
        reference,
        performed_by: ctx.performed_by,
        order_id: ctx.order_id,
        is_correction: false,
        correction_reason: None,
        corrected_movement_id: None,
        resulting_stock: None,
        created_at: at,
    }
}

/// Input for registering a new title
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWorkInput {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 10, max = 17))]
    pub isbn: String,
    pub price: Decimal,
    #[serde(default)]
    pub initial_stock: i64,
    #[serde(default)]
    pub min_stock: i64,
    pub max_stock: Option<i64>,
    pub status: Option<WorkStatus>,
}

/// Input for a publisher-side stock entry or a partner operation
#[derive(Debug, Clone, Deserialize)]
pub struct StockEntryInput {
    pub quantity: i64,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartnerOperationInput {
    pub work_id: Uuid,
    pub quantity: i64,
    pub reason: Option<String>,
}

/// Stock position of a work
#[derive(Debug, Clone, Serialize)]
pub struct WorkStockView {
    #[serde(flatten)]
    pub work: Work,
    pub available: i64,
    pub level: StockLevel,
}

/// One consignment with its derived availability
#[derive(Debug, Clone, Serialize)]
pub struct PartnerStockView {
    #[serde(flatten)]
    pub stock: PartnerStock,
    pub availability: PartnerAvailability,
}

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Append one movement and update the counter(s) it touches
    pub async fn record_movement(
        &self,
        work_id: Uuid,
        partner_id: Option<Uuid>,
        movement_type: MovementType,
        quantity: i64,
        ctx: MovementContext,
    ) -> AppResult<CommitReceipt> {
        validate_positive_quantity(quantity)
            .map_err(|e| AppError::validation("quantity", e, "La quantité doit être positive"))?;

        let shape = movement_type.shape(quantity).ok_or_else(|| {
            AppError::validation(
                "movement_type",
                "Corrections go through the correction service",
                "Les corrections passent par le service de correction",
            )
        })?;

        if movement_type.is_partner_movement() != partner_id.is_some() {
            return Err(AppError::validation(
                "partner_id",
                "Partner movements need a partner, publisher movements must not have one",
                "Partenaire requis pour les mouvements partenaires uniquement",
            ));
        }

        let at = self.clock.now();
        let entry = build_entry(work_id, partner_id, movement_type, shape, &ctx, at);
        let unit = LedgerUnit {
            at,
            movements: vec![entry],
            adjustments: vec![CounterAdjustment {
                work_id,
                partner_id,
                shape,
                guard: Guard::Availability,
            }],
            ..Default::default()
        };

        let receipt = self.store.commit(unit).await?;
        tracing::info!(
            work_id = %work_id,
            partner_id = ?partner_id,
            movement_type = movement_type.as_str(),
            quantity,
            "Stock movement recorded"
        );
        Ok(receipt)
    }

    /// Register a title, optionally seeding its stock through an initial entry
    pub async fn create_work(&self, actor_id: Uuid, input: CreateWorkInput) -> AppResult<WorkStockView> {
        input.validate()?;
        if input.title.trim().is_empty() {
            return Err(AppError::validation(
                "title",
                "Title is required",
                "Le titre est obligatoire",
            ));
        }
        validate_price(input.price)
            .map_err(|e| AppError::validation("price", e, "Le prix doit être positif"))?;
        if input.initial_stock != 0 {
            validate_positive_quantity(input.initial_stock).map_err(|e| {
                AppError::validation("initial_stock", e, "Stock initial invalide")
            })?;
        }

        let now = self.clock.now();
        let work = Work {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            isbn: input.isbn.trim().to_string(),
            price: input.price,
            stock: 0,
            physical_stock: 0,
            min_stock: input.min_stock.max(0),
            max_stock: input.max_stock,
            status: input.status.unwrap_or(WorkStatus::Published),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_work(&work).await?;
        tracing::info!(work_id = %work.id, title = %work.title, "Work registered");

        if input.initial_stock > 0 {
            self.initial_stock(
                work.id,
                input.initial_stock,
                MovementContext::new(actor_id, "Stock initial"),
            )
            .await?;
        }

        self.stock_view(work.id).await
    }

    /// Book copies coming in from a print run
    pub async fn initial_stock(
        &self,
        work_id: Uuid,
        quantity: i64,
        ctx: MovementContext,
    ) -> AppResult<CommitReceipt> {
        self.require_work(work_id).await?;
        self.record_movement(work_id, None, MovementType::InitialStock, quantity, ctx)
            .await
    }

    /// Ship copies from publisher stock into a partner's consignment
    pub async fn allocate(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
        quantity: i64,
        ctx: MovementContext,
    ) -> AppResult<CommitReceipt> {
        let work = self.require_work(work_id).await?;
        if !work.status.is_sellable() {
            return Err(AppError::validation(
                "work_id",
                "Only published works can be allocated",
                "Seules les œuvres publiées peuvent être allouées",
            ));
        }
        let ctx = MovementContext {
            unit_price: ctx.unit_price.or(Some(work.price)),
            ..ctx
        };
        self.record_movement(
            work_id,
            Some(partner_id),
            MovementType::PartnerAllocation,
            quantity,
            ctx,
        )
        .await
    }

    /// A partner sells copies out of its consignment
    pub async fn partner_sale(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
        quantity: i64,
        ctx: MovementContext,
    ) -> AppResult<CommitReceipt> {
        let work = self.require_work(work_id).await?;
        let ctx = MovementContext {
            unit_price: ctx.unit_price.or(Some(work.price)),
            ..ctx
        };
        self.record_movement(work_id, Some(partner_id), MovementType::PartnerSale, quantity, ctx)
            .await
    }

    /// A partner sends unsold copies back to the publisher
    pub async fn partner_return(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
        quantity: i64,
        ctx: MovementContext,
    ) -> AppResult<CommitReceipt> {
        self.require_work(work_id).await?;
        self.record_movement(
            work_id,
            Some(partner_id),
            MovementType::PartnerReturn,
            quantity,
            ctx,
        )
        .await
    }

    pub async fn require_work(&self, work_id: Uuid) -> AppResult<Work> {
        self.store
            .work(work_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Work".to_string()))
    }

    pub async fn stock_view(&self, work_id: Uuid) -> AppResult<WorkStockView> {
        let work = self.require_work(work_id).await?;
        let available = shared::work_availability(&work)?;
        let level = work.stock_level();
        Ok(WorkStockView {
            work,
            available,
            level,
        })
    }

    pub async fn partner_availability(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
    ) -> AppResult<PartnerAvailability> {
        let stock = self.store.partner_stock(partner_id, work_id).await?;
        Ok(partner_availability(work_id, stock.as_ref())?)
    }

    /// Every consignment a partner holds; an inconsistent row is an error, not a zero
    pub async fn partner_stock_views(&self, partner_id: Uuid) -> AppResult<Vec<PartnerStockView>> {
        let stocks = self.store.partner_stocks(partner_id).await?;
        stocks
            .into_iter()
            .map(|stock| -> AppResult<PartnerStockView> {
                let availability = partner_availability(stock.work_id, Some(&stock))?;
                Ok(PartnerStockView {
                    stock,
                    availability,
                })
            })
            .collect()
    }

    pub async fn history(
        &self,
        filter: &MovementFilter,
        pagination: &Pagination,
    ) -> AppResult<PaginatedResponse<StockMovement>> {
        let (movements, total) = self.store.movements(filter, pagination).await?;
        Ok(PaginatedResponse::new(movements, pagination, total))
    }

    /// Corrections and order decisions, newest first
    pub async fn audit_trail(&self, pagination: &Pagination) -> AppResult<PaginatedResponse<AuditLog>> {
        let (logs, total) = self.store.audit_logs(pagination).await?;
        Ok(PaginatedResponse::new(logs, pagination, total))
    }
}

/// Fall back to a default reason when the caller gave none
pub fn reason_or(reason: Option<String>, default: &str) -> AppResult<String> {
    match reason {
        Some(reason) => {
            validate_reason(&reason)
                .map_err(|e| AppError::validation("reason", e, "Motif invalide"))?;
            Ok(reason.trim().to_string())
        }
        None => Ok(default.to_string()),
    }
}
