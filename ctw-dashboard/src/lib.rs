//! ctw-dashboard library interface
//!
//! Open-conversation wait-time dashboard: fetches open conversations from the
//! helpdesk API, enriches them with responsible, team, branch and regional,
//! and serves per-team aggregates over HTTP.

pub mod aggregate;
pub mod api;
pub mod contacts;
pub mod error;
pub mod intercom;
pub mod pipeline;
pub mod rows;
pub mod scheduler;

pub use crate::error::{ApiError, ApiResult};

use crate::aggregate::Thresholds;
use crate::scheduler::RefreshScheduler;
use axum::Router;
use chrono::{DateTime, Utc};
use ctw_common::events::EventBus;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<RefreshScheduler>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    pub thresholds: Thresholds,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(scheduler: Arc<RefreshScheduler>, event_bus: EventBus, thresholds: Thresholds) -> Self {
        Self {
            scheduler,
            event_bus,
            thresholds,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::ui_routes())
        .merge(api::dashboard_routes())
        .route("/api/events", get(api::dashboard_event_stream))
        .merge(api::health_routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
