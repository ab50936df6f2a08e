//! # Control Tower Common Library
//!
//! Shared code for the control-tower dashboard including:
//! - Error types
//! - Configuration loading (TOML, environment, credentials)
//! - Text normalization used as the join key for every lookup
//! - Static reference tables (teams, branches, regionals)
//! - Dashboard event types and the broadcast event bus
//! - Human-readable age formatting

pub mod config;
pub mod error;
pub mod events;
pub mod human_time;
pub mod normalize;
pub mod reference;

pub use error::{Error, Result};
pub use normalize::normalize;
pub use reference::ReferenceTables;
