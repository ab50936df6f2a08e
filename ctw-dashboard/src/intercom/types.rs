//! Helpdesk API wire types
//!
//! Conversations are slimmed on receipt: only the fields below survive
//! deserialization. Fields that arrive with an unexpected JSON type become
//! `None` instead of failing the whole page.

use ctw_common::config::IntercomConfig;
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Admin id (string-coerced) -> display name
pub type AdminMap = HashMap<String, String>;

/// Fields requested from the conversation search endpoint
pub const CONVERSATION_FIELDS: &[&str] = &[
    "id",
    "created_at",
    "state",
    "open",
    "admin_assignee_id",
    "contacts",
    "tags",
    "statistics",
    "custom_attributes",
];

/// Deserialize any JSON value, keeping it only if it fits `T`
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize an id that may arrive as a string or a number
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_id(&value))
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A conversation as received from the search endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawConversation {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    /// Epoch seconds; kept raw so the row builder can reject bad values
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub open: Option<bool>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub admin_assignee_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub contacts: Option<ContactRefs>,
    #[serde(default, deserialize_with = "lenient")]
    pub tags: Option<TagRefs>,
    #[serde(default)]
    pub statistics: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    pub custom_attributes: Option<Map<String, Value>>,
}

impl RawConversation {
    /// Creation time in epoch seconds, if present and numeric.
    ///
    /// Numeric strings are accepted; non-finite values are not.
    pub fn created_at_secs(&self) -> Option<f64> {
        let secs = match self.created_at.as_ref()? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        secs.is_finite().then_some(secs)
    }

    /// Open flag set and state equal to `"open"`
    pub fn is_open(&self) -> bool {
        self.open == Some(true) && self.state.as_deref() == Some("open")
    }

    /// First embedded contact id, if any
    pub fn first_contact_id(&self) -> Option<&str> {
        self.contacts
            .as_ref()?
            .as_slice()
            .first()?
            .id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    /// Tag names in received order
    pub fn tag_names(&self) -> impl Iterator<Item = &str> {
        self.tags
            .as_ref()
            .map(TagRefs::as_slice)
            .unwrap_or_default()
            .iter()
            .filter_map(|tag| tag.name.as_deref())
    }

    /// String custom attribute, trimmed; empty when absent or not a string
    pub fn custom_attribute(&self, key: &str) -> String {
        self.custom_attributes
            .as_ref()
            .and_then(|attrs| attrs.get(key))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    }
}

/// Contact references, either wrapped in a list object or bare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContactRefs {
    Wrapped { contacts: Vec<ContactRef> },
    Bare(Vec<ContactRef>),
}

impl ContactRefs {
    pub fn as_slice(&self) -> &[ContactRef] {
        match self {
            ContactRefs::Wrapped { contacts } => contacts,
            ContactRefs::Bare(contacts) => contacts,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
}

/// Tag references, either wrapped in a list object or bare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRefs {
    Wrapped { tags: Vec<TagRef> },
    Bare(Vec<TagRef>),
}

impl TagRefs {
    pub fn as_slice(&self) -> &[TagRef] {
        match self {
            TagRefs::Wrapped { tags } => tags,
            TagRefs::Bare(tags) => tags,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagRef {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

/// City and branch label known for a contact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub city: String,
    pub branch_label: String,
}

// ============================================================================
// Request bodies
// ============================================================================

/// Tag constraints applied to every conversation search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub required_tag_id: String,
    pub excluded_tag_id: Option<String>,
}

impl TagFilter {
    pub fn from_config(config: &IntercomConfig) -> Self {
        Self {
            required_tag_id: config.required_tag_id.clone(),
            excluded_tag_id: config
                .excluded_tag_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: QueryGroup,
    pub fields: FieldSelection,
    pub pagination: PaginationRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryGroup {
    pub operator: &'static str,
    pub value: Vec<QueryClause>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryClause {
    pub field: &'static str,
    pub operator: &'static str,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldSelection {
    pub conversations: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationRequest {
    pub per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_after: Option<String>,
}

impl SearchRequest {
    /// Open conversations carrying the required tag (and not the excluded one)
    pub fn open_conversations(
        filter: &TagFilter,
        per_page: u32,
        starting_after: Option<String>,
    ) -> Self {
        let mut clauses = vec![
            QueryClause {
                field: "open",
                operator: "=",
                value: Value::Bool(true),
            },
            QueryClause {
                field: "state",
                operator: "=",
                value: Value::from("open"),
            },
            QueryClause {
                field: "tag_ids",
                operator: "IN",
                value: Value::from(vec![filter.required_tag_id.clone()]),
            },
        ];
        if let Some(excluded) = &filter.excluded_tag_id {
            clauses.push(QueryClause {
                field: "tag_ids",
                operator: "NIN",
                value: Value::from(vec![excluded.clone()]),
            });
        }

        Self {
            query: QueryGroup {
                operator: "AND",
                value: clauses,
            },
            fields: FieldSelection {
                conversations: CONVERSATION_FIELDS.to_vec(),
            },
            pagination: PaginationRequest {
                per_page,
                starting_after,
            },
        }
    }
}

// ============================================================================
// Response bodies
// ============================================================================

/// One page of conversation search results
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub conversations: Option<Vec<Value>>,
    /// Some API versions return the list under `data`
    #[serde(default)]
    pub data: Option<Vec<Value>>,
    #[serde(default)]
    pub pagination: Option<Value>,
    #[serde(default)]
    pub pages: Option<Value>,
}

impl SearchPage {
    /// Items on this page, in received order
    pub fn items(&self) -> &[Value] {
        self.conversations
            .as_deref()
            .filter(|items| !items.is_empty())
            .or(self.data.as_deref())
            .unwrap_or_default()
    }

    /// Continuation cursor: `pagination.next`, or `pages.next.starting_after`
    pub fn next_cursor(&self) -> Option<String> {
        let from_pagination = self
            .pagination
            .as_ref()
            .and_then(|p| p.get("next"))
            .and_then(cursor_value);
        let from_pages = || {
            self.pages
                .as_ref()
                .and_then(|p| p.get("next"))
                .and_then(|next| next.get("starting_after").or(Some(next)))
                .and_then(cursor_value)
        };
        from_pagination.or_else(from_pages)
    }
}

fn cursor_value(value: &Value) -> Option<String> {
    value.as_str().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminsResponse {
    #[serde(default)]
    pub admins: Vec<AdminRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminRecord {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub name: Option<String>,
}

impl AdminsResponse {
    /// Admin map; records without an id are dropped
    pub fn into_admin_map(self) -> AdminMap {
        self.admins
            .into_iter()
            .filter_map(|admin| Some((admin.id?, admin.name.unwrap_or_default())))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub location: Option<ContactLocation>,
    #[serde(default, deserialize_with = "lenient")]
    pub custom_attributes: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactLocation {
    #[serde(default, deserialize_with = "lenient")]
    pub city: Option<String>,
}

impl ContactResponse {
    /// City and branch label, reading the branch from `branch_attribute`
    pub fn into_contact_info(self, branch_attribute: &str) -> ContactInfo {
        let city = self
            .location
            .and_then(|loc| loc.city)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        let branch_label = self
            .custom_attributes
            .as_ref()
            .and_then(|attrs| attrs.get(branch_attribute))
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default();
        ContactInfo { city, branch_label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slimming_drops_unrequested_fields() {
        let conv: RawConversation = serde_json::from_value(json!({
            "id": "123",
            "created_at": 1700000000,
            "state": "open",
            "open": true,
            "admin_assignee_id": 42,
            "source": { "body": "large payload" },
            "contacts": { "type": "contact.list", "contacts": [{ "type": "contact", "id": "c1" }] }
        }))
        .unwrap();

        assert_eq!(conv.id.as_deref(), Some("123"));
        assert_eq!(conv.admin_assignee_id.as_deref(), Some("42"));
        assert_eq!(conv.first_contact_id(), Some("c1"));
        assert_eq!(conv.created_at_secs(), Some(1700000000.0));
        assert!(conv.is_open());
    }

    #[test]
    fn test_wrong_types_become_none() {
        let conv: RawConversation = serde_json::from_value(json!({
            "id": 7,
            "created_at": "not a number",
            "state": 5,
            "open": "true",
            "contacts": "garbage",
            "tags": 3
        }))
        .unwrap();

        assert_eq!(conv.id.as_deref(), Some("7"));
        assert_eq!(conv.created_at_secs(), None);
        assert_eq!(conv.state, None);
        assert_eq!(conv.open, None);
        assert!(!conv.is_open());
        assert_eq!(conv.first_contact_id(), None);
        assert_eq!(conv.tag_names().count(), 0);
    }

    #[test]
    fn test_created_at_accepts_numeric_strings() {
        let conv = RawConversation {
            created_at: Some(json!(" 1700000000.5 ")),
            ..Default::default()
        };
        assert_eq!(conv.created_at_secs(), Some(1700000000.5));

        let missing = RawConversation::default();
        assert_eq!(missing.created_at_secs(), None);
    }

    #[test]
    fn test_bare_contact_and_tag_lists() {
        let conv: RawConversation = serde_json::from_value(json!({
            "contacts": [{ "id": "c9" }, { "id": "c10" }],
            "tags": [{ "id": "1", "name": "a-b-c-d" }]
        }))
        .unwrap();
        assert_eq!(conv.first_contact_id(), Some("c9"));
        assert_eq!(conv.tag_names().collect::<Vec<_>>(), vec!["a-b-c-d"]);
    }

    #[test]
    fn test_search_request_body() {
        let filter = TagFilter {
            required_tag_id: "11077847".to_string(),
            excluded_tag_id: Some("999".to_string()),
        };
        let body = serde_json::to_value(SearchRequest::open_conversations(
            &filter,
            150,
            Some("cursor-1".to_string()),
        ))
        .unwrap();

        assert_eq!(body["query"]["operator"], "AND");
        let clauses = body["query"]["value"].as_array().unwrap();
        assert_eq!(clauses.len(), 4);
        assert_eq!(clauses[0], json!({"field": "open", "operator": "=", "value": true}));
        assert_eq!(clauses[2]["value"], json!(["11077847"]));
        assert_eq!(clauses[3]["operator"], "NIN");
        assert_eq!(body["pagination"]["per_page"], 150);
        assert_eq!(body["pagination"]["starting_after"], "cursor-1");
        assert!(body["fields"]["conversations"]
            .as_array()
            .unwrap()
            .contains(&json!("contacts")));
    }

    #[test]
    fn test_first_page_has_no_cursor_field() {
        let filter = TagFilter {
            required_tag_id: "1".to_string(),
            excluded_tag_id: None,
        };
        let body = serde_json::to_value(SearchRequest::open_conversations(&filter, 10, None)).unwrap();
        assert!(body["pagination"].get("starting_after").is_none());
        assert_eq!(body["query"]["value"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_next_cursor_shapes() {
        let page: SearchPage =
            serde_json::from_value(json!({"conversations": [], "pagination": {"next": "abc"}})).unwrap();
        assert_eq!(page.next_cursor().as_deref(), Some("abc"));

        let page: SearchPage = serde_json::from_value(
            json!({"conversations": [], "pages": {"next": {"starting_after": "xyz"}}}),
        )
        .unwrap();
        assert_eq!(page.next_cursor().as_deref(), Some("xyz"));

        let page: SearchPage =
            serde_json::from_value(json!({"conversations": [], "pagination": {"next": null}})).unwrap();
        assert_eq!(page.next_cursor(), None);
    }

    #[test]
    fn test_items_fall_back_to_data() {
        let page: SearchPage = serde_json::from_value(json!({"data": [{"id": "1"}]})).unwrap();
        assert_eq!(page.items().len(), 1);
    }

    #[test]
    fn test_admin_map_drops_null_ids() {
        let response: AdminsResponse = serde_json::from_value(json!({
            "admins": [
                { "id": 1, "name": "Thaís" },
                { "id": null, "name": "Ghost" },
                { "id": "2", "name": "Zeca" }
            ]
        }))
        .unwrap();
        let map = response.into_admin_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map["1"], "Thaís");
        assert_eq!(map["2"], "Zeca");
    }

    #[test]
    fn test_contact_info_extraction() {
        let response: ContactResponse = serde_json::from_value(json!({
            "location": { "city": " Curitiba " },
            "custom_attributes": { "filial": "Mottu Curitiba", "other": 1 }
        }))
        .unwrap();
        let info = response.into_contact_info("filial");
        assert_eq!(info.city, "Curitiba");
        assert_eq!(info.branch_label, "Mottu Curitiba");

        let empty: ContactResponse = serde_json::from_value(json!({"location": null})).unwrap();
        assert_eq!(empty.into_contact_info("filial"), ContactInfo::default());
    }
}
