//! Stock ledger HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use shared::{MovementFilter, MovementType, Pagination, Role};
use uuid::Uuid;

use crate::middleware::CurrentUser;
use crate::services::ledger::{
    reason_or, CreateWorkInput, MovementContext, PartnerOperationInput, StockEntryInput,
};
use crate::AppState;

/// Query parameters for movement history
#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub work_id: Option<Uuid>,
    pub partner_id: Option<Uuid>,
    pub movement_type: Option<MovementType>,
    pub corrections_only: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl MovementQuery {
    fn pagination(&self) -> Pagination {
        let default = Pagination::default();
        Pagination {
            page: self.page.unwrap_or(default.page),
            per_page: self.per_page.unwrap_or(default.per_page),
        }
    }
}

/// Register a new work, optionally with its first print run
pub async fn create_work(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateWorkInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.ledger().create_work(user.user_id, input).await {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Stock position of one work
pub async fn get_work(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(work_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.ledger().stock_view(work_id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Book an initial stock entry (print run)
pub async fn record_stock_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(work_id): Path<Uuid>,
    Json(input): Json<StockEntryInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }
    let reason = match reason_or(input.reason, "Entrée de stock") {
        Ok(reason) => reason,
        Err(e) => return e.into_response(),
    };

    match state
        .ledger()
        .initial_stock(work_id, input.quantity, MovementContext::new(user.user_id, reason))
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Ledger history; partners only ever see their own entries
pub async fn list_movements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<MovementQuery>,
) -> impl IntoResponse {
    let partner_id = match user.role {
        Role::Partner => Some(user.user_id),
        _ if user.role.is_operator() => query.partner_id,
        _ => return crate::error::AppError::InsufficientPermissions.into_response(),
    };

    let filter = MovementFilter {
        work_id: query.work_id,
        partner_id,
        movement_type: query.movement_type,
        corrections_only: query.corrections_only,
    };

    match state.ledger().history(&filter, &query.pagination()).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Ship publisher stock into a partner's consignment
pub async fn allocate_to_partner(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(partner_id): Path<Uuid>,
    Json(input): Json<PartnerOperationInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }
    let reason = match reason_or(input.reason, "Allocation partenaire") {
        Ok(reason) => reason,
        Err(e) => return e.into_response(),
    };

    match state
        .ledger()
        .allocate(
            partner_id,
            input.work_id,
            input.quantity,
            MovementContext::new(user.user_id, reason),
        )
        .await
    {
        Ok(receipt) => (StatusCode::CREATED, Json(receipt)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Audit trail of corrections and order decisions
pub async fn list_audit_logs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(pagination): Query<Pagination>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.ledger().audit_trail(&pagination).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => e.into_response(),
    }
}
