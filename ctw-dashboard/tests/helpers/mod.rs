//! Shared fixtures for ctw-dashboard integration tests
//!
//! `FakeGateway` serves canned conversations, admins and contacts and counts
//! every call, so tests can assert on caching and single-flight behaviour.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use ctw_common::config::DashboardConfig;
use ctw_common::ReferenceTables;
use ctw_dashboard::intercom::{
    AdminMap, ContactInfo, GatewayError, HelpdeskGateway, RawConversation, TagFilter,
};
use ctw_dashboard::pipeline::RefreshPipeline;
use ctw_dashboard::rows::RowRules;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fixed reference instant for deterministic ages
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

pub fn secs_before(now: DateTime<Utc>, secs: i64) -> i64 {
    (now - Duration::seconds(secs)).timestamp()
}

/// Open conversation JSON as the search endpoint returns it
pub fn open_conversation(id: &str, created_at: i64, admin: &str, contact: Option<&str>) -> Value {
    let contacts: Vec<Value> = contact
        .map(|c| vec![json!({ "type": "contact", "id": c })])
        .unwrap_or_default();
    json!({
        "id": id,
        "created_at": created_at,
        "state": "open",
        "open": true,
        "admin_assignee_id": admin,
        "contacts": { "type": "contact.list", "contacts": contacts },
        "tags": { "type": "tag.list", "tags": [] },
        "custom_attributes": {}
    })
}

pub fn filter() -> TagFilter {
    TagFilter {
        required_tag_id: "11077847".to_string(),
        excluded_tag_id: None,
    }
}

#[derive(Default)]
pub struct FakeGateway {
    conversations: Mutex<Vec<Value>>,
    admins: Mutex<AdminMap>,
    contacts: Mutex<HashMap<String, ContactInfo>>,
    fail_search: AtomicBool,
    fail_admins: AtomicBool,
    search_delay: Mutex<Option<std::time::Duration>>,
    pub search_calls: AtomicUsize,
    pub admin_calls: AtomicUsize,
    pub contact_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(self, conversations: Vec<Value>) -> Self {
        *self.conversations.lock().unwrap() = conversations;
        self
    }

    pub fn with_admin(self, id: &str, name: &str) -> Self {
        self.admins
            .lock()
            .unwrap()
            .insert(id.to_string(), name.to_string());
        self
    }

    pub fn with_contact_city(self, id: &str, city: &str) -> Self {
        self.contacts.lock().unwrap().insert(
            id.to_string(),
            ContactInfo {
                city: city.to_string(),
                branch_label: String::new(),
            },
        );
        self
    }

    pub fn set_conversations(&self, conversations: Vec<Value>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn set_fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_admins(&self, fail: bool) {
        self.fail_admins.store(fail, Ordering::SeqCst);
    }

    /// Hold every search call for `delay` so concurrent callers overlap
    pub fn set_search_delay(&self, delay: std::time::Duration) {
        *self.search_delay.lock().unwrap() = Some(delay);
    }

    /// Total calls across all endpoints
    pub fn total_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
            + self.admin_calls.load(Ordering::SeqCst)
            + self.contact_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HelpdeskGateway for FakeGateway {
    async fn search_open_conversations(
        &self,
        _filter: &TagFilter,
    ) -> Result<Vec<RawConversation>, GatewayError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.search_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(GatewayError::Network("connection refused".to_string()));
        }
        let items = self.conversations.lock().unwrap().clone();
        items
            .into_iter()
            .map(|item| {
                serde_json::from_value(item).map_err(|e| GatewayError::Parse(e.to_string()))
            })
            .collect()
    }

    async fn list_admins(&self) -> Result<AdminMap, GatewayError> {
        self.admin_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_admins.load(Ordering::SeqCst) {
            return Err(GatewayError::Api(500, "boom".to_string()));
        }
        Ok(self.admins.lock().unwrap().clone())
    }

    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, GatewayError> {
        self.contact_calls.fetch_add(1, Ordering::SeqCst);
        self.contacts
            .lock()
            .unwrap()
            .get(contact_id)
            .cloned()
            .ok_or_else(|| GatewayError::Api(404, "contact not found".to_string()))
    }
}

/// Gateway holding the three conversations of the reference scenario:
/// Thaís in Curitiba (10 min), unmapped Zeca without contact (20 min), and
/// an excluded responsible (1 min).
pub fn scenario_gateway(now: DateTime<Utc>) -> FakeGateway {
    FakeGateway::new()
        .with_admin("10", "Thaís")
        .with_admin("20", "Zeca")
        .with_admin("30", "Suporte Mottu")
        .with_contact_city("c-curitiba", "Curitiba")
        .with_conversations(vec![
            open_conversation("a", secs_before(now, 600), "10", Some("c-curitiba")),
            open_conversation("b", secs_before(now, 1200), "20", None),
            open_conversation("c", secs_before(now, 60), "30", Some("c-curitiba")),
        ])
}

pub fn pipeline(gateway: Arc<FakeGateway>) -> RefreshPipeline {
    let tables = ReferenceTables::builtin().unwrap();
    RefreshPipeline::new(
        gateway,
        Arc::new(tables),
        filter(),
        RowRules::from_config(&DashboardConfig::default()),
    )
}
