//! HTTP API Layer
//!
//! This crate exposes the billing engine over REST using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: bills, debt and health endpoints
//! - **Middleware**: bearer authentication and request audit logging
//! - **DTOs**: request/response shapes kept apart from domain types
//! - **Error Handling**: billing error classes mapped to status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(service, config)?;
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use core_kernel::{Currency, HealthCheckable, Timezone};
use domain_billing::BillingService;

use crate::config::ApiConfig;
use crate::handlers::{bills, debt, health};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BillingService>,
    pub config: ApiConfig,
    /// Decides which month a bill without an explicit period belongs to
    pub timezone: Timezone,
    /// Adapters probed by the readiness check
    pub health: Arc<Vec<Arc<dyn HealthCheckable>>>,
}

impl AppState {
    pub fn new(service: BillingService, config: ApiConfig) -> Result<Self, ::config::ConfigError> {
        let timezone = config.timezone()?;
        Ok(Self {
            service: Arc::new(service),
            config,
            timezone,
            health: Arc::new(Vec::new()),
        })
    }

    pub fn with_health_checks(mut self, adapters: Vec<Arc<dyn HealthCheckable>>) -> Self {
        self.health = Arc::new(adapters);
        self
    }

    /// Currency request amounts are read in
    pub fn currency(&self) -> Currency {
        self.service.settings().currency
    }
}

/// Creates the main API router
///
/// Health routes are public; everything under `/api/v1` requires a bearer
/// token.
pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let bill_routes = Router::new()
        .route("/", post(bills::create_bill))
        .route("/preview", post(bills::preview_bill))
        .route("/:id", get(bills::get_bill).delete(bills::delete_bill))
        .route("/:id/readings", put(bills::update_readings))
        .route("/:id/fees", post(bills::add_fee))
        .route("/:id/fees/:fee_id", axum::routing::delete(bills::remove_fee))
        .route("/:id/payment", put(bills::apply_payment))
        .route("/:id/paid", put(bills::set_paid))
        .route("/:id/recalculate", post(bills::recalculate))
        .route("/:id/history", get(bills::bill_history));

    let api_routes = Router::new()
        .nest("/bills", bill_routes)
        .route("/rooms/:id/debt", get(debt::get_room_debt))
        .route("/debt/warnings", get(debt::get_debt_warnings))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(state)
}
