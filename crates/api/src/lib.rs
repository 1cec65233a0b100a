//! HTTP API layer with Axum routes and middleware.
//!
//! This crate provides:
//! - REST API routes for companies and expenses
//! - Authentication middleware
//! - Mapping of expense errors to HTTP responses

pub mod error;
pub mod middleware;
pub mod routes;

use axum::Router;
use cofound_core::{Clock, EventBus};
use cofound_db::{CompanyRepository, ExpenseRepository, UserRepository};
use cofound_shared::JwtService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub db: Arc<DatabaseConnection>,
    /// JWT service for token operations.
    pub jwt_service: Arc<JwtService>,
    /// Time source for lifecycle decisions.
    pub clock: Arc<dyn Clock>,
    /// Lifecycle event bus.
    pub bus: EventBus,
    /// Nudge cooldown for companies without their own.
    pub default_nudge_cooldown_hours: u32,
}

impl AppState {
    /// Company repository over the shared pool.
    #[must_use]
    pub fn companies(&self) -> CompanyRepository {
        CompanyRepository::new((*self.db).clone())
    }

    /// User repository over the shared pool.
    #[must_use]
    pub fn users(&self) -> UserRepository {
        UserRepository::new((*self.db).clone(), self.clock.clone(), self.bus.clone())
    }

    /// Expense repository over the shared pool.
    #[must_use]
    pub fn expenses(&self) -> ExpenseRepository {
        ExpenseRepository::new(
            (*self.db).clone(),
            self.clock.clone(),
            self.bus.clone(),
            self.default_nudge_cooldown_hours,
        )
    }
}

/// Creates the main application router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes_with_state(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
