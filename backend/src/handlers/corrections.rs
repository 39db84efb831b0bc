//! Stock correction HTTP handler

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::middleware::{ClientInfo, CurrentUser};
use crate::services::correction::CorrectionRequest;
use crate::AppState;

/// Apply an administrative correction.
/// The body is taken raw so a malformed request surfaces as a rejected correction.
pub async fn apply_correction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ClientInfo(provenance): ClientInfo,
    Json(body): Json<serde_json::Value>,
) -> impl IntoResponse {
    if let Err(e) = user.require_operator() {
        return e.into_response();
    }

    let request = match CorrectionRequest::from_json(body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };

    match state
        .corrections()
        .correct(request, &user.actor(), &provenance)
        .await
    {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(e) => e.into_response(),
    }
}
