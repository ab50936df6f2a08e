//! Helpdesk gateway
//!
//! The refresh pipeline talks to the helpdesk only through
//! [`HelpdeskGateway`], so tests can substitute canned data for the HTTP
//! client.

pub mod client;
pub mod types;

pub use client::IntercomClient;
pub use types::{AdminMap, ContactInfo, RawConversation, TagFilter};

use async_trait::async_trait;
use thiserror::Error;

/// Gateway errors
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Remote source of conversations, admins and contacts
#[async_trait]
pub trait HelpdeskGateway: Send + Sync {
    /// All open conversations matching `filter`, flattened in page order
    async fn search_open_conversations(
        &self,
        filter: &TagFilter,
    ) -> Result<Vec<RawConversation>, GatewayError>;

    /// Admin id -> display name
    async fn list_admins(&self) -> Result<AdminMap, GatewayError>;

    /// City and branch label for one contact
    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, GatewayError>;
}
