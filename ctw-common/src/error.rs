//! Common error types for the control tower

use thiserror::Error;

/// Common result type for control tower operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the dashboard crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Helpdesk bearer credential absent from every source
    #[error("Missing credential: {0}")]
    MissingCredential(String),
}
