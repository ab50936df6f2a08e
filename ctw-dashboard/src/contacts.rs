//! Contact enrichment cache
//!
//! One cache per refresh cycle. Each contact id is looked up at most once
//! per cycle; a failed lookup is remembered as [`ContactLookup::Unknown`] and
//! not retried until the next cycle builds a fresh cache.

use crate::intercom::{ContactInfo, HelpdeskGateway};
use std::collections::HashMap;
use tracing::debug;

/// Outcome of resolving a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContactLookup {
    Resolved(ContactInfo),
    /// No id, or the lookup failed
    Unknown,
}

impl ContactLookup {
    /// City/branch info; empty for [`ContactLookup::Unknown`]
    pub fn info(&self) -> ContactInfo {
        match self {
            ContactLookup::Resolved(info) => info.clone(),
            ContactLookup::Unknown => ContactInfo::default(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, ContactLookup::Resolved(_))
    }
}

/// Memoized contact lookups scoped to one refresh cycle
#[derive(Debug, Default)]
pub struct ContactCache {
    entries: HashMap<String, ContactLookup>,
    remote_lookups: usize,
    failures: usize,
}

impl ContactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a contact, calling the gateway only on a cache miss.
    ///
    /// A missing or empty id short-circuits to `Unknown` without a call.
    pub async fn resolve(
        &mut self,
        gateway: &dyn HelpdeskGateway,
        contact_id: Option<&str>,
    ) -> ContactLookup {
        let Some(contact_id) = contact_id.filter(|id| !id.is_empty()) else {
            return ContactLookup::Unknown;
        };

        if let Some(cached) = self.entries.get(contact_id) {
            return cached.clone();
        }

        self.remote_lookups += 1;
        let lookup = match gateway.get_contact(contact_id).await {
            Ok(info) => ContactLookup::Resolved(info),
            Err(e) => {
                self.failures += 1;
                debug!(contact_id = %contact_id, "Contact lookup failed, treating as unknown: {}", e);
                ContactLookup::Unknown
            }
        };

        self.entries.insert(contact_id.to_string(), lookup.clone());
        lookup
    }

    /// Gateway calls made by this cache
    pub fn remote_lookups(&self) -> usize {
        self.remote_lookups
    }

    /// Gateway calls that failed
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
