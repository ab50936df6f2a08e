//! One refresh cycle: fetch, enrich, collect rows
//!
//! The cycle runs sequentially. Conversation search and admin listing are
//! fatal for the cycle; contact lookups degrade to unknown per contact.

use crate::contacts::ContactCache;
use crate::intercom::{GatewayError, HelpdeskGateway, TagFilter};
use crate::rows::{EnrichedRow, RowBuilder, RowRules, SkipReason};
use chrono::{DateTime, Utc};
use ctw_common::ReferenceTables;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Counters for one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    pub fetched: usize,
    pub rows: usize,
    pub skipped_not_open: usize,
    pub skipped_bad_timestamp: usize,
    pub skipped_excluded_responsible: usize,
    pub skipped_excluded_team: usize,
    pub contact_lookups: usize,
    pub contact_failures: usize,
}

impl CycleStats {
    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::NotOpen => self.skipped_not_open += 1,
            SkipReason::BadTimestamp => self.skipped_bad_timestamp += 1,
            SkipReason::ExcludedResponsible => self.skipped_excluded_responsible += 1,
            SkipReason::ExcludedTeam => self.skipped_excluded_team += 1,
        }
    }
}

/// Rows produced by a successful cycle
#[derive(Debug, Clone)]
pub struct CycleOutput {
    pub rows: Vec<EnrichedRow>,
    pub stats: CycleStats,
}

/// Fetch -> enrich pipeline bound to a gateway and reference tables
pub struct RefreshPipeline {
    gateway: Arc<dyn HelpdeskGateway>,
    tables: Arc<ReferenceTables>,
    tag_filter: TagFilter,
    rules: RowRules,
}

impl RefreshPipeline {
    pub fn new(
        gateway: Arc<dyn HelpdeskGateway>,
        tables: Arc<ReferenceTables>,
        tag_filter: TagFilter,
        rules: RowRules,
    ) -> Self {
        Self {
            gateway,
            tables,
            tag_filter,
            rules,
        }
    }

    pub fn tables(&self) -> &Arc<ReferenceTables> {
        &self.tables
    }

    /// Run one cycle with `now` as the age reference
    pub async fn run(&self, now: DateTime<Utc>) -> Result<CycleOutput, GatewayError> {
        let conversations = self
            .gateway
            .search_open_conversations(&self.tag_filter)
            .await?;
        let admins = self.gateway.list_admins().await?;

        let now_secs = now.timestamp_millis() as f64 / 1000.0;
        let builder = RowBuilder::new(&self.tables, &admins, &self.rules, now_secs);
        let mut cache = ContactCache::new();
        let mut stats = CycleStats {
            fetched: conversations.len(),
            ..Default::default()
        };

        let mut rows = Vec::with_capacity(conversations.len());
        for conversation in &conversations {
            let pending = match builder.prepare(conversation) {
                Ok(pending) => pending,
                Err(reason) => {
                    debug!(
                        conversation_id = conversation.id.as_deref().unwrap_or(""),
                        reason = ?reason,
                        "Skipping conversation"
                    );
                    stats.record_skip(reason);
                    continue;
                }
            };

            let contact = cache
                .resolve(self.gateway.as_ref(), pending.contact_id.as_deref())
                .await;
            rows.push(builder.finish(pending, &contact));
        }

        stats.rows = rows.len();
        stats.contact_lookups = cache.remote_lookups();
        stats.contact_failures = cache.failures();

        info!(
            fetched = stats.fetched,
            rows = stats.rows,
            contact_lookups = stats.contact_lookups,
            contact_failures = stats.contact_failures,
            "Refresh cycle complete"
        );

        Ok(CycleOutput { rows, stats })
    }
}
