//! Route definitions for the publishing ledger

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Cron trigger (cron secret or publisher session, checked in the handler)
        .route(
            "/cron/notification-chains",
            post(handlers::run_notification_chains),
        )
        // Protected routes - orders
        .nest("/orders", order_routes(state.clone()))
        // Protected routes - stock ledger and corrections
        .nest("/stock", stock_routes(state.clone()))
        // Protected routes - partner consignments
        .nest("/partner", partner_routes(state.clone()))
        // Protected routes - notification chains
        .nest("/notifications", notification_routes(state.clone()))
        // Protected routes - audit trail
        .route(
            "/audit",
            get(handlers::list_audit_logs)
                .route_layer(middleware::from_fn_with_state(state, auth_middleware)),
        )
}

/// Order routes (protected)
fn order_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_order))
        .route("/:order_id", get(handlers::get_order))
        .route("/:order_id/transition", post(handlers::transition_order))
        .route("/:order_id/payments", post(handlers::record_payment))
        .route("/:order_id/chains", get(handlers::list_order_chains))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Stock routes (protected)
fn stock_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/works", post(handlers::create_work))
        .route("/works/:work_id", get(handlers::get_work))
        .route("/works/:work_id/entries", post(handlers::record_stock_entry))
        .route("/movements", get(handlers::list_movements))
        .route(
            "/partners/:partner_id/allocations",
            post(handlers::allocate_to_partner),
        )
        .route("/corrections", post(handlers::apply_correction))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Partner routes (protected)
fn partner_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/stock", get(handlers::get_partner_stock))
        .route("/sales", post(handlers::record_partner_sale))
        .route("/returns", post(handlers::record_partner_return))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Notification chain routes (protected)
fn notification_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chains", post(handlers::create_chain))
        .route("/chains/:chain_id/status", put(handlers::set_chain_status))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
