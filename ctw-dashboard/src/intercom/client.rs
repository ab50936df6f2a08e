//! Helpdesk REST client
//!
//! Cursor-paginated conversation search, admin listing and per-contact
//! lookup. Every request carries the bearer token, the API version header
//! and JSON accept/content-type headers; gzip/deflate are negotiated by
//! reqwest and connections are pooled (keep-alive).
//!
//! Nothing here retries. A failed call surfaces as a [`GatewayError`] and the
//! next scheduled refresh is the retry.

use super::types::{
    AdminMap, AdminsResponse, ContactInfo, ContactResponse, RawConversation, SearchPage,
    SearchRequest, TagFilter,
};
use super::{GatewayError, HelpdeskGateway};
use async_trait::async_trait;
use ctw_common::config::{IntercomConfig, IntercomCredentials};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("ctw-dashboard/", env!("CARGO_PKG_VERSION"));
const VERSION_HEADER: &str = "intercom-version";

/// Helpdesk API client
pub struct IntercomClient {
    http_client: reqwest::Client,
    base_url: String,
    per_page: u32,
    branch_attribute: String,
}

impl IntercomClient {
    pub fn new(
        credentials: &IntercomCredentials,
        config: &IntercomConfig,
        branch_attribute: &str,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", credentials.bearer))
            .map_err(|e| GatewayError::Config(format!("Invalid bearer token: {}", e)))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static(VERSION_HEADER),
            HeaderValue::from_str(&credentials.version)
                .map_err(|e| GatewayError::Config(format!("Invalid API version: {}", e)))?,
        );

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: credentials.base_url.trim_end_matches('/').to_string(),
            per_page: config.per_page.max(1),
            branch_attribute: branch_attribute.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check status and decode the JSON body
    async fn read_json<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))
    }

    /// `{base}/contacts/{id}` with the id escaped as a single path segment
    fn contact_url(&self, contact_id: &str) -> Result<reqwest::Url, GatewayError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Config(format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                GatewayError::Config(format!("Base URL cannot hold a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .push("contacts")
            .push(contact_id);
        Ok(url)
    }

    async fn search_page(
        &self,
        filter: &TagFilter,
        starting_after: Option<String>,
    ) -> Result<SearchPage, GatewayError> {
        let url = format!("{}/conversations/search", self.base_url);
        let body = SearchRequest::open_conversations(filter, self.per_page, starting_after);

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Self::read_json(response).await
    }
}

#[async_trait]
impl HelpdeskGateway for IntercomClient {
    async fn search_open_conversations(
        &self,
        filter: &TagFilter,
    ) -> Result<Vec<RawConversation>, GatewayError> {
        let mut conversations = Vec::new();
        let mut starting_after: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let requested = starting_after.take();
            let page = self.search_page(filter, requested.clone()).await?;
            pages += 1;

            let items = page.items();
            if items.is_empty() {
                break;
            }

            for item in items {
                match serde_json::from_value::<RawConversation>(item.clone()) {
                    Ok(conversation) => conversations.push(conversation),
                    Err(e) => warn!(page = pages, "Skipping malformed conversation: {}", e),
                }
            }

            debug!(page = pages, items = items.len(), "Fetched conversation page");

            match page.next_cursor() {
                Some(cursor) if requested.as_deref() == Some(cursor.as_str()) => {
                    warn!(
                        page = pages,
                        cursor = %cursor,
                        "Cursor did not advance, stopping pagination"
                    );
                    break;
                }
                Some(cursor) => starting_after = Some(cursor),
                None => break,
            }
        }

        info!(
            conversations = conversations.len(),
            pages = pages,
            "Fetched open conversations"
        );
        Ok(conversations)
    }

    async fn list_admins(&self) -> Result<AdminMap, GatewayError> {
        let url = format!("{}/admins", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let admins: AdminsResponse = Self::read_json(response).await?;
        let map = admins.into_admin_map();
        debug!(admins = map.len(), "Fetched admin list");
        Ok(map)
    }

    async fn get_contact(&self, contact_id: &str) -> Result<ContactInfo, GatewayError> {
        let url = self.contact_url(contact_id)?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let contact: ContactResponse = Self::read_json(response).await?;
        Ok(contact.into_contact_info(&self.branch_attribute))
    }
}
