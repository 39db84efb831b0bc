//! Publishing Inventory & Fulfillment Ledger - backend library
//!
//! Order lifecycle, stock ledger, administrative corrections and payment
//! notification chains for a book publisher's back office.

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod clock;
pub mod config;
pub mod error;
pub mod external;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod store;

pub use config::Config;

use clock::Clock;
use external::{EmailTransport, SmsTransport};
use services::{
    NotificationChainScheduler, NotificationChainService, OrderService, OrderStateMachine,
    StockCorrectionService, StockLedger,
};
use store::{InventoryStore, NotificationStore};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub inventory: Arc<dyn InventoryStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub sms: Arc<dyn SmsTransport>,
    pub email: Arc<dyn EmailTransport>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.inventory.clone(), self.clock.clone())
    }

    pub fn state_machine(&self) -> OrderStateMachine {
        OrderStateMachine::new(self.inventory.clone(), self.clock.clone())
    }

    pub fn chains(&self) -> NotificationChainService {
        NotificationChainService::new(
            self.notifications.clone(),
            self.clock.clone(),
            self.config.scheduler.reminder_days_before,
        )
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.inventory.clone(), self.chains(), self.clock.clone())
    }

    pub fn corrections(&self) -> StockCorrectionService {
        StockCorrectionService::new(self.inventory.clone(), self.clock.clone())
    }

    pub fn scheduler(&self) -> NotificationChainScheduler {
        NotificationChainScheduler::new(
            self.notifications.clone(),
            self.sms.clone(),
            self.email.clone(),
            self.clock.clone(),
            self.config.channel_timeout(),
        )
    }
}

/// Create the application router with all routes and middleware
pub fn create_app(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", routes::api_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Root endpoint
async fn root() -> &'static str {
    "Publishing Ledger API v1.0"
}
