//! Administrative stock corrections
//!
//! Corrections never edit history. Each one appends `CORRECTION` entries,
//! moves the counters by the resulting delta and writes an audit row, all
//! in one ledger unit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    validate_price, validate_quantity_magnitude, validate_reason, validate_stock_value, Actor,
    AuditAction, AuditLog, MovementShape, MovementType, RequestProvenance, StockMovement, Work,
};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::services::ledger::{build_entry, MovementContext};
use crate::store::{CounterAdjustment, Guard, InventoryStore, LedgerUnit};

/// What is being corrected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "correction_type", rename_all = "snake_case")]
pub enum CorrectionKind {
    /// Set publisher stock to an absolute value
    Quantity {
        original_value: i64,
        corrected_value: i64,
    },
    Price {
        original_value: Decimal,
        corrected_value: Decimal,
    },
    /// Reverse one ledger entry and replace it with a corrected one
    Movement {
        movement_id: Uuid,
        corrected_value: i64,
    },
}

impl CorrectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionKind::Quantity { .. } => "quantity",
            CorrectionKind::Price { .. } => "price",
            CorrectionKind::Movement { .. } => "movement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionRequest {
    pub work_id: Uuid,
    #[serde(flatten)]
    pub kind: CorrectionKind,
    pub reason: String,
}

impl CorrectionRequest {
    /// Parse a raw request body; anything malformed is a rejected correction
    pub fn from_json(value: serde_json::Value) -> AppResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| AppError::CorrectionRejected(format!("invalid correction request: {}", e)))
    }
}

/// Result of an applied correction
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionOutcome {
    pub work: Work,
    pub movements: Vec<StockMovement>,
    pub audit_id: Uuid,
}

#[derive(Clone)]
pub struct StockCorrectionService {
    store: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
}

impl StockCorrectionService {
    pub fn new(store: Arc<dyn InventoryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn correct(
        &self,
        request: CorrectionRequest,
        actor: &Actor,
        provenance: &RequestProvenance,
    ) -> AppResult<CorrectionOutcome> {
        validate_reason(&request.reason)
            .map_err(|e| AppError::CorrectionRejected(e.to_string()))?;
        let reason = request.reason.trim().to_string();

        let work = self
            .store
            .work(request.work_id)
            .await?
            .ok_or_else(|| {
                AppError::CorrectionRejected(format!("work {} does not exist", request.work_id))
            })?;

        let at = self.clock.now();
        let mut unit = LedgerUnit {
            at,
            ..Default::default()
        };

        let details = match &request.kind {
            CorrectionKind::Quantity {
                original_value,
                corrected_value,
            } => {
                plan_quantity(&work, *original_value, *corrected_value, &reason, actor, &mut unit)?
            }
            CorrectionKind::Price {
                original_value,
                corrected_value,
            } => plan_price(&work, *original_value, *corrected_value, &reason, actor, &mut unit)?,
            CorrectionKind::Movement {
                movement_id,
                corrected_value,
            } => {
                let original = self
                    .store
                    .movement(*movement_id)
                    .await?
                    .filter(|m| m.work_id == work.id)
                    .ok_or_else(|| {
                        AppError::CorrectionRejected(format!(
                            "movement {} does not exist for work {}",
                            movement_id, work.id
                        ))
                    })?;
                plan_movement(&original, *corrected_value, &reason, actor, &mut unit)?
            }
        };

        let audit = correction_audit(&request, details, &reason, actor, provenance, at);
        let audit_id = audit.id;
        unit.audit = Some(audit);

        let receipt = self.store.commit(unit).await?;
        let work = receipt
            .works
            .into_iter()
            .find(|w| w.id == request.work_id)
            .unwrap_or(work);

        tracing::info!(
            work_id = %work.id,
            correction_type = request.kind.as_str(),
            actor = %actor.id,
            "Stock correction applied"
        );

        Ok(CorrectionOutcome {
            work,
            movements: receipt.movements,
            audit_id,
        })
    }
}

fn correction_entry(
    work_id: Uuid,
    partner_id: Option<Uuid>,
    shape: MovementShape,
    reference: String,
    reason: &str,
    actor: &Actor,
    at: DateTime<Utc>,
) -> StockMovement {
    let ctx = MovementContext {
        performed_by: actor.id,
        reason: reason.to_string(),
        reference: Some(reference),
        ..Default::default()
    };
    let mut entry = build_entry(work_id, partner_id, MovementType::Correction, shape, &ctx, at);
    entry.is_correction = true;
    entry.correction_reason = Some(reason.to_string());
    entry
}

fn plan_quantity(
    work: &Work,
    original: i64,
    corrected: i64,
    reason: &str,
    actor: &Actor,
    unit: &mut LedgerUnit,
) -> AppResult<serde_json::Value> {
    validate_stock_value(corrected).map_err(|e| AppError::CorrectionRejected(e.to_string()))?;
    if work.stock != original {
        return Err(AppError::CorrectionRejected(format!(
            "stock of work {} is {}, not {}",
            work.id, work.stock, original
        )));
    }
    if corrected == original {
        return Err(AppError::CorrectionRejected(
            "corrected stock equals the current stock".to_string(),
        ));
    }

    let delta = corrected.checked_sub(original).ok_or_else(|| {
        AppError::CorrectionRejected("corrected stock is out of range".to_string())
    })?;
    let shape = MovementShape::publisher(delta);
    let mut entry = correction_entry(
        work.id,
        None,
        shape,
        format!("CORRECTION_{}_{}", work.id.simple(), unit.at.timestamp_millis()),
        reason,
        actor,
        unit.at,
    );
    entry.resulting_stock = Some(corrected);

    unit.movements.push(entry);
    unit.adjustments.push(CounterAdjustment {
        work_id: work.id,
        partner_id: None,
        shape,
        guard: Guard::Integrity,
    });
    unit.expected_stock.push((work.id, original));

    Ok(serde_json::json!({
        "before": { "stock": original, "physical_stock": work.physical_stock },
        "after": { "stock": corrected, "physical_stock": work.physical_stock.saturating_add(delta) },
        "delta": delta,
    }))
}

fn plan_price(
    work: &Work,
    original: Decimal,
    corrected: Decimal,
    reason: &str,
    actor: &Actor,
    unit: &mut LedgerUnit,
) -> AppResult<serde_json::Value> {
    validate_price(corrected).map_err(|e| AppError::CorrectionRejected(e.to_string()))?;
    if work.price != original {
        return Err(AppError::CorrectionRejected(format!(
            "price of work {} is {}, not {}",
            work.id, work.price, original
        )));
    }
    if corrected == original {
        return Err(AppError::CorrectionRejected(
            "corrected price equals the current price".to_string(),
        ));
    }

    let mut entry = correction_entry(
        work.id,
        None,
        MovementShape::publisher(0),
        format!("PRICE_CORRECTION_{}_{}", work.id.simple(), unit.at.timestamp_millis()),
        reason,
        actor,
        unit.at,
    );
    entry.unit_price = Some(corrected);
    entry.resulting_stock = Some(work.stock);

    unit.movements.push(entry);
    unit.price_updates.push((work.id, corrected));

    Ok(serde_json::json!({
        "before": { "price": original },
        "after": { "price": corrected },
    }))
}

/// Reversal-and-replace: cancel the original entry, book the corrected one,
/// and let the counters move by the net difference once
fn plan_movement(
    original: &StockMovement,
    corrected: i64,
    reason: &str,
    actor: &Actor,
    unit: &mut LedgerUnit,
) -> AppResult<serde_json::Value> {
    let original_shape = original.shape();
    if original_shape.is_zero() {
        return Err(AppError::CorrectionRejected(
            "entries that moved no stock cannot be corrected".to_string(),
        ));
    }
    validate_quantity_magnitude(corrected)
        .map_err(|e| AppError::CorrectionRejected(e.to_string()))?;
    if original.partner_counter.is_some() && corrected < 0 {
        return Err(AppError::CorrectionRejected(
            "partner quantities cannot be negative".to_string(),
        ));
    }

    let reversal_shape = original_shape.negated();
    let corrected_shape = original.reshaped(corrected);

    let mut reversal = correction_entry(
        original.work_id,
        original.partner_id,
        reversal_shape,
        format!("CANCEL_{}", original.reference),
        reason,
        actor,
        unit.at,
    );
    reversal.corrected_movement_id = Some(original.id);
    reversal.unit_price = original.unit_price;

    let mut replacement = correction_entry(
        original.work_id,
        original.partner_id,
        corrected_shape,
        format!("CORRECTED_{}", original.reference),
        reason,
        actor,
        unit.at,
    );
    replacement.corrected_movement_id = Some(original.id);
    replacement.unit_price = original.unit_price;
    replacement.total_amount = original
        .unit_price
        .map(|price| price * Decimal::from(corrected.abs()));

    for shape in [reversal_shape, corrected_shape] {
        unit.adjustments.push(CounterAdjustment {
            work_id: original.work_id,
            partner_id: original.partner_id,
            shape,
            guard: Guard::Integrity,
        });
    }
    unit.movements.push(reversal);
    unit.movements.push(replacement);

    Ok(serde_json::json!({
        "movement_id": original.id,
        "movement_type": original.movement_type.as_str(),
        "partner_id": original.partner_id,
        "before": { "quantity": original.primary_quantity() },
        "after": { "quantity": corrected },
        "net_stock_delta": corrected_shape
            .stock_delta
            .saturating_sub(original_shape.stock_delta),
    }))
}

fn correction_audit(
    request: &CorrectionRequest,
    mut details: serde_json::Value,
    reason: &str,
    actor: &Actor,
    provenance: &RequestProvenance,
    at: DateTime<Utc>,
) -> AuditLog {
    if let Some(map) = details.as_object_mut() {
        map.insert("work_id".to_string(), serde_json::json!(request.work_id));
        map.insert(
            "correction_type".to_string(),
            serde_json::json!(request.kind.as_str()),
        );
        map.insert("reason".to_string(), serde_json::json!(reason));
    }

    AuditLog {
        id: Uuid::new_v4(),
        user_id: actor.id,
        action: AuditAction::StockCorrection,
        details,
        ip_address: provenance.ip_address.clone(),
        user_agent: provenance.user_agent.clone(),
        created_at: at,
    }
}
