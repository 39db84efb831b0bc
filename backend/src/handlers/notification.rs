//! Notification chain HTTP handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;

use crate::middleware::{authorize_cron, CurrentUser};
use crate::services::notification::{ChainStatusInput, CreateChainInput};
use crate::AppState;

/// Schedule a chain by hand
pub async fn create_chain(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateChainInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.chains().create(&user.actor(), input).await {
        Ok(chain) => (StatusCode::CREATED, Json(chain)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Activate or deactivate an unsent chain
pub async fn set_chain_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(chain_id): Path<Uuid>,
    Json(input): Json<ChainStatusInput>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    match state.chains().set_status(chain_id, input.status).await {
        Ok(chain) => (StatusCode::OK, Json(chain)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Cron entry point: deliver every due chain once
pub async fn run_notification_chains(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> impl IntoResponse {
    let token = bearer.as_ref().map(|TypedHeader(auth)| auth.token());
    if let Err(e) = authorize_cron(token, &state) {
        return e.into_response();
    }

    match state.scheduler().run().await {
        Ok(summary) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "success": true,
                "processed": summary.total,
                "sent": summary.sent,
                "failed": summary.failed,
                "errors": summary.errors,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
