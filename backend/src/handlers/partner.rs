//! Partner consignment HTTP handlers
//!
//! The partner is always the caller; these routes never act on another
//! partner's stock.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use shared::Role;

use crate::middleware::CurrentUser;
use crate::services::ledger::{reason_or, MovementContext, PartnerOperationInput};
use crate::AppState;

/// Consignments held by the calling partner
pub async fn get_partner_stock(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> impl IntoResponse {
    if let Err(e) = user.require_any(&[Role::Partner]) {
        return e.into_response();
    }

    match state.ledger().partner_stock_views(user.user_id).await {
        Ok(stocks) => {
            (StatusCode::OK, Json(serde_json::json!({ "stocks": stocks }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Register copies sold out of the caller's consignment
pub async fn record_partner_sale(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<PartnerOperationInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_any(&[Role::Partner]) {
        return e.into_response();
    }
    let reason = match reason_or(input.reason, "Vente partenaire") {
        Ok(reason) => reason,
        Err(e) => return e.into_response(),
    };

    match state
        .ledger()
        .partner_sale(
            user.user_id,
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

/// Send unsold copies back to the publisher
pub async fn record_partner_return(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<PartnerOperationInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_any(&[Role::Partner]) {
        return e.into_response();
    }
    let reason = match reason_or(input.reason, "Retour partenaire") {
        Ok(reason) => reason,
        Err(e) => return e.into_response(),
    };

    match state
        .ledger()
        .partner_return(
            user.user_id,
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
