//! Row builder
//!
//! Joins one raw conversation with the admin map, the contact lookup and the
//! reference tables into an [`EnrichedRow`]. Building happens in two steps so
//! that conversations which are going to be skipped never cost a contact
//! lookup: [`RowBuilder::prepare`] applies every rule that does not need the
//! contact, [`RowBuilder::finish`] adds branch and regional.

use crate::contacts::ContactLookup;
use crate::intercom::{AdminMap, RawConversation};
use ctw_common::config::DashboardConfig;
use ctw_common::normalize;
use ctw_common::reference::{ReferenceTables, UNASSIGNED};
use serde::Serialize;
use std::collections::HashSet;

/// One open conversation, enriched. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedRow {
    pub conversation_id: String,
    pub team: String,
    /// Minutes since creation, never negative
    pub age_minutes: f64,
    pub responsible_name: String,
    pub contact_id: Option<String>,
    pub city: String,
    pub branch_label: String,
    pub branch_code: Option<u32>,
    /// Base regional name or the unmapped sentinel
    pub regional: String,
    pub subject: String,
    pub description: String,
}

/// Why a conversation produced no row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NotOpen,
    BadTimestamp,
    ExcludedResponsible,
    ExcludedTeam,
}

/// Exclusion rules and attribute keys
#[derive(Debug, Clone, Default)]
pub struct RowRules {
    /// Exact responsible names
    pub excluded_responsibles: HashSet<String>,
    /// Normalized team names
    pub excluded_teams: HashSet<String>,
    pub description_attribute: String,
}

impl RowRules {
    pub fn from_config(config: &DashboardConfig) -> Self {
        Self {
            excluded_responsibles: config.excluded_responsibles.iter().cloned().collect(),
            excluded_teams: config
                .excluded_teams
                .iter()
                .map(|team| normalize(team))
                .filter(|team| !team.is_empty())
                .collect(),
            description_attribute: config.description_attribute.clone(),
        }
    }
}

/// A conversation that passed every contact-independent rule
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRow {
    pub conversation_id: String,
    pub team: String,
    pub age_minutes: f64,
    pub responsible_name: String,
    pub contact_id: Option<String>,
    pub subject: String,
    pub description: String,
}

pub struct RowBuilder<'a> {
    tables: &'a ReferenceTables,
    admins: &'a AdminMap,
    rules: &'a RowRules,
    now_secs: f64,
}

impl<'a> RowBuilder<'a> {
    /// `now_secs` is the cycle's reference time in epoch seconds (UTC)
    pub fn new(
        tables: &'a ReferenceTables,
        admins: &'a AdminMap,
        rules: &'a RowRules,
        now_secs: f64,
    ) -> Self {
        Self {
            tables,
            admins,
            rules,
            now_secs,
        }
    }

    /// Apply the open check, age, responsible, team and exclusion rules
    pub fn prepare(&self, conversation: &RawConversation) -> Result<PendingRow, SkipReason> {
        if !conversation.is_open() {
            return Err(SkipReason::NotOpen);
        }

        let created_at = conversation
            .created_at_secs()
            .ok_or(SkipReason::BadTimestamp)?;
        let age_minutes = age_minutes(self.now_secs, created_at);

        let responsible_name = self.responsible_for(conversation.admin_assignee_id.as_deref());
        if self.rules.excluded_responsibles.contains(&responsible_name) {
            return Err(SkipReason::ExcludedResponsible);
        }

        let team = self.tables.map_to_team(&responsible_name);
        if self.rules.excluded_teams.contains(&normalize(&team)) {
            return Err(SkipReason::ExcludedTeam);
        }

        Ok(PendingRow {
            conversation_id: conversation.id.clone().unwrap_or_default(),
            team,
            age_minutes,
            responsible_name,
            contact_id: conversation.first_contact_id().map(str::to_string),
            subject: extract_subject(conversation.tag_names()),
            description: conversation.custom_attribute(&self.rules.description_attribute),
        })
    }

    /// Attach branch and regional from the contact lookup
    pub fn finish(&self, pending: PendingRow, contact: &ContactLookup) -> EnrichedRow {
        let info = contact.info();

        let branch_code = Some(info.branch_label.as_str())
            .filter(|label| !label.is_empty())
            .and_then(|label| self.tables.branch_code(label))
            .or_else(|| {
                Some(info.city.as_str())
                    .filter(|city| !city.is_empty())
                    .and_then(|city| self.tables.code_for_city(city))
            });

        let branch_label = match branch_code.and_then(|code| self.tables.branch_label(code)) {
            Some(label) => label.to_string(),
            None if !info.branch_label.is_empty() => info.branch_label.clone(),
            None if !info.city.is_empty() => {
                format!("{}{}", self.tables.branch_prefix(), info.city)
            }
            None => String::new(),
        };

        EnrichedRow {
            conversation_id: pending.conversation_id,
            team: pending.team,
            age_minutes: pending.age_minutes,
            responsible_name: pending.responsible_name,
            contact_id: pending.contact_id,
            city: info.city,
            branch_label,
            branch_code,
            regional: self.tables.regional_or_unmapped(branch_code),
            subject: pending.subject,
            description: pending.description,
        }
    }

    /// Admin display name, or [`UNASSIGNED`] when the id is absent or unknown
    fn responsible_for(&self, admin_id: Option<&str>) -> String {
        admin_id
            .and_then(|id| self.admins.get(id))
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNASSIGNED)
            .to_string()
    }
}

/// Minutes between `created_at` and `now`, clamped at zero
pub fn age_minutes(now_secs: f64, created_at_secs: f64) -> f64 {
    ((now_secs - created_at_secs) / 60.0).max(0.0)
}

fn is_dash(ch: char) -> bool {
    matches!(ch, '-' | '\u{2013}' | '\u{2014}')
}

/// Subject encoded in a tag name such as `"CS - Billing - Late fee - 2"`.
///
/// The first tag with at least three hyphen-separated segments and at least
/// four dash-delimited parts (hyphen, en dash or em dash) yields its third
/// hyphen segment, trimmed. No qualifying tag yields an empty subject.
pub fn extract_subject<'t>(tag_names: impl IntoIterator<Item = &'t str>) -> String {
    for name in tag_names {
        let segments: Vec<&str> = name.split('-').collect();
        let parts = name.split(is_dash).count();
        if segments.len() >= 3 && parts >= 4 {
            return segments[2].trim().to_string();
        }
    }
    String::new()
}
