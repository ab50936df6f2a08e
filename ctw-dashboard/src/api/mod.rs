//! HTTP API handlers
//!
//! REST endpoints for the dashboard view and regional options, an SSE stream
//! of refresh events, and the embedded page.

pub mod dashboard;
pub mod health;
pub mod sse;
pub mod ui;

pub use dashboard::dashboard_routes;
pub use health::health_routes;
pub use sse::dashboard_event_stream;
pub use ui::ui_routes;
