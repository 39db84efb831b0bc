//! Order HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use shared::OrderChannel;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::order::{CreateOrderInput, OrderView, PaymentInput, TransitionInput};
use crate::AppState;

/// Create a pending order
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateOrderInput>,
) -> impl IntoResponse {
    if !user.role.can_create_orders() {
        return AppError::InsufficientPermissions.into_response();
    }
    if !matches!(input.channel, OrderChannel::Retail) && !user.role.can_create_partner_orders() {
        return AppError::InsufficientPermissions.into_response();
    }

    match state.orders().create(&user.actor(), input).await {
        Ok(order) => (StatusCode::CREATED, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get one order; buyers and creators see their own, the publisher sees all
pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.orders().get(order_id).await {
        Ok(view) if can_read(&user, &view) => (StatusCode::OK, Json(view)).into_response(),
        Ok(_) => AppError::NotFound("Order".to_string()).into_response(),
        Err(e) => e.into_response(),
    }
}

fn can_read(user: &crate::middleware::AuthUser, view: &OrderView) -> bool {
    user.role.is_operator()
        || view.order.buyer_id == user.user_id
        || view.order.created_by == user.user_id
}

/// Move an order through its lifecycle
pub async fn transition_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientInfo(provenance): ClientInfo,
    Path(order_id): Path<Uuid>,
    Json(input): Json<TransitionInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state
        .state_machine()
        .transition(order_id, input.status, &user.actor(), &provenance)
        .await
    {
        Ok(order) => (StatusCode::OK, Json(OrderView::from(order))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Record a payment against a deposit order
pub async fn record_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
    Json(input): Json<PaymentInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.orders().record_payment(order_id, input.amount).await {
        Ok(order) => (StatusCode::OK, Json(order)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Notification chains attached to an order
pub async fn list_order_chains(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(order_id): Path<Uuid>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.chains().for_order(order_id).await {
        Ok(chains) => {
            (StatusCode::OK, Json(serde_json::json!({ "chains": chains }))).into_response()
        }
        Err(e) => e.into_response(),
    }
}
