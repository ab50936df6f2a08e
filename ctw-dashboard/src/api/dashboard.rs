//! Dashboard snapshot endpoints
//!
//! `GET /api/dashboard?regional=` returns the team aggregate, the ticket
//! view and the summary metrics for one regional selection, computed from
//! the scheduler's current snapshot. `GET /api/regionals` lists the
//! selectable filter values.

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use ctw_common::human_time::format_age_minutes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{
    build_view, filter_options, AggregateRow, RegionalFilter, SummaryMetrics, Thresholds,
    ALL_REGIONALS,
};
use crate::error::{ApiError, ApiResult};
use crate::rows::EnrichedRow;
use crate::scheduler::RefreshError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    pub regional: Option<String>,
}

/// Aggregate row with display helpers
#[derive(Debug, Serialize)]
pub struct TeamRowView {
    #[serde(flatten)]
    pub row: AggregateRow,
    pub mean_age_display: String,
    /// 0 for the lowest mean on screen, 1 for the highest
    pub heat: f64,
    /// Background colour, white to red
    pub color: String,
}

#[derive(Debug, Serialize)]
pub struct TicketView {
    #[serde(flatten)]
    pub row: EnrichedRow,
    pub age_display: String,
}

#[derive(Debug, Serialize)]
pub struct MetricsView {
    #[serde(flatten)]
    pub metrics: SummaryMetrics,
    pub mean_age_display: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ThresholdsView {
    pub ticket_minutes: f64,
    pub critical_minutes: f64,
}

/// GET /api/dashboard response
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub regional: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Served snapshot is past its window (the last refresh failed)
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<RefreshError>,
    pub thresholds: ThresholdsView,
    pub teams: Vec<TeamRowView>,
    pub tickets: Vec<TicketView>,
    pub metrics: MetricsView,
}

#[derive(Debug, Serialize)]
pub struct RegionalsResponse {
    pub regionals: Vec<String>,
    pub default: String,
}

/// White-to-red scale over the given values.
///
/// Returns `(heat, colour)` per value. A zero or non-finite range paints
/// everything white.
pub fn heat_scale(values: &[f64]) -> Vec<(f64, String)> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    if !range.is_finite() || range <= 0.0 {
        return values
            .iter()
            .map(|_| (0.0, "rgb(255,255,255)".to_string()))
            .collect();
    }

    values
        .iter()
        .map(|value| {
            let heat = ((value - min) / range).clamp(0.0, 1.0);
            let g = (255.0 * (1.0 - heat)).round() as u8;
            (heat, format!("rgb(255,{},{})", g, g))
        })
        .collect()
}

/// GET /api/dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> ApiResult<Json<DashboardResponse>> {
    let tables = state.scheduler.pipeline().tables();
    let filter = RegionalFilter::parse(query.regional.as_deref(), tables).ok_or_else(|| {
        ApiError::BadRequest(format!(
            "Unknown regional: {}",
            query.regional.as_deref().unwrap_or_default()
        ))
    })?;

    let now = Utc::now();
    let outcome = state.scheduler.current_at(now).await;
    let Some(snapshot) = outcome.snapshot else {
        let message = outcome
            .error
            .map(|e| e.message)
            .unwrap_or_else(|| "No snapshot available yet".to_string());
        return Err(ApiError::Unavailable(message));
    };

    let view = build_view(&snapshot.rows, &filter, state.thresholds);
    debug!(
        regional = %view.regional,
        teams = view.teams.len(),
        tickets = view.tickets.len(),
        "Serving dashboard view"
    );

    let means: Vec<f64> = view.teams.iter().map(|t| t.mean_age_minutes).collect();
    let teams = view
        .teams
        .into_iter()
        .zip(heat_scale(&means))
        .map(|(row, (heat, color))| TeamRowView {
            mean_age_display: format_age_minutes(row.mean_age_minutes),
            row,
            heat,
            color,
        })
        .collect();

    let tickets = view
        .tickets
        .into_iter()
        .map(|row| TicketView {
            age_display: format_age_minutes(row.age_minutes),
            row,
        })
        .collect();

    Ok(Json(DashboardResponse {
        regional: view.regional,
        generated_at: snapshot.generated_at,
        expires_at: snapshot.expires_at,
        stale: !snapshot.is_fresh(now),
        last_error: outcome.error,
        thresholds: ThresholdsView {
            ticket_minutes: state.thresholds.ticket_minutes,
            critical_minutes: state.thresholds.critical_minutes,
        },
        teams,
        tickets,
        metrics: MetricsView {
            mean_age_display: view.metrics.mean_age_minutes.map(format_age_minutes),
            metrics: view.metrics,
        },
    }))
}

/// GET /api/regionals
pub async fn get_regionals(State(state): State<AppState>) -> Json<RegionalsResponse> {
    Json(RegionalsResponse {
        regionals: filter_options(state.scheduler.pipeline().tables()),
        default: ALL_REGIONALS.to_string(),
    })
}

/// Build dashboard routes
pub fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/regionals", get(get_regionals))
}
