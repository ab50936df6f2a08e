//! Aggregation of enriched rows
//!
//! Per-team counts and mean ages, the ticket-level over-threshold view and
//! the summary metrics, all computed over a regional-filtered row set.

use crate::rows::EnrichedRow;
use ctw_common::human_time::round2;
use ctw_common::reference::{ReferenceTables, UNMAPPED_REGIONAL};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Filter value meaning "no regional filter"
pub const ALL_REGIONALS: &str = "All";

/// Regional filter applied before aggregation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionalFilter {
    All,
    /// Rows whose regional equals this base regional
    Regional(String),
    /// Rows whose branch code is in a synthetic group
    Codes { label: String, codes: BTreeSet<u32> },
    /// Rows carrying the unmapped sentinel
    Unmapped,
}

impl RegionalFilter {
    /// Parse a selection; `None`, empty and [`ALL_REGIONALS`] mean no filter.
    ///
    /// Returns `None` for names that are not selectable.
    pub fn parse(selection: Option<&str>, tables: &ReferenceTables) -> Option<Self> {
        let selection = selection.map(str::trim).unwrap_or_default();
        if selection.is_empty() || selection == ALL_REGIONALS {
            return Some(RegionalFilter::All);
        }
        if selection == UNMAPPED_REGIONAL {
            return Some(RegionalFilter::Unmapped);
        }
        if selection == tables.all_regions_label() {
            let codes = tables.codes_for_regional(selection)?.clone();
            return Some(RegionalFilter::Codes {
                label: selection.to_string(),
                codes,
            });
        }
        tables
            .regional_names()
            .any(|name| name == selection)
            .then(|| RegionalFilter::Regional(selection.to_string()))
    }

    pub fn matches(&self, row: &EnrichedRow) -> bool {
        match self {
            RegionalFilter::All => true,
            RegionalFilter::Regional(name) => row.regional == *name,
            RegionalFilter::Codes { codes, .. } => {
                row.branch_code.is_some_and(|code| codes.contains(&code))
            }
            RegionalFilter::Unmapped => row.regional == UNMAPPED_REGIONAL,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            RegionalFilter::All => ALL_REGIONALS,
            RegionalFilter::Regional(name) => name.as_str(),
            RegionalFilter::Codes { label, .. } => label.as_str(),
            RegionalFilter::Unmapped => UNMAPPED_REGIONAL,
        }
    }
}

/// Filter options in display order: all, sorted regionals, unmapped
pub fn filter_options(tables: &ReferenceTables) -> Vec<String> {
    let mut options = vec![ALL_REGIONALS.to_string()];
    options.extend(tables.selectable_regionals());
    options.push(UNMAPPED_REGIONAL.to_string());
    options
}

/// One team's count and mean age
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub team: String,
    pub count: usize,
    /// Rounded to two decimals
    pub mean_age_minutes: f64,
}

/// Group by team, mean age descending.
///
/// Teams with equal means keep their first-appearance order.
pub fn aggregate_by_team<'r>(rows: impl IntoIterator<Item = &'r EnrichedRow>) -> Vec<AggregateRow> {
    let mut groups: Vec<(String, usize, f64)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        match index.get(&row.team) {
            Some(&i) => {
                groups[i].1 += 1;
                groups[i].2 += row.age_minutes;
            }
            None => {
                index.insert(row.team.clone(), groups.len());
                groups.push((row.team.clone(), 1, row.age_minutes));
            }
        }
    }

    let mut aggregates: Vec<AggregateRow> = groups
        .into_iter()
        .map(|(team, count, total)| AggregateRow {
            team,
            count,
            mean_age_minutes: round2(total / count as f64),
        })
        .collect();

    aggregates.sort_by(|a, b| b.mean_age_minutes.total_cmp(&a.mean_age_minutes));
    aggregates
}

/// Rows strictly older than `threshold_minutes`, oldest first.
///
/// Rows of equal age keep their input order.
pub fn tickets_over_threshold<'r>(
    rows: impl IntoIterator<Item = &'r EnrichedRow>,
    threshold_minutes: f64,
) -> Vec<EnrichedRow> {
    let mut tickets: Vec<EnrichedRow> = rows
        .into_iter()
        .filter(|row| row.age_minutes > threshold_minutes)
        .cloned()
        .collect();
    tickets.sort_by(|a, b| b.age_minutes.total_cmp(&a.age_minutes));
    tickets
}

/// Scalar metrics over the filtered (pre-threshold) row set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryMetrics {
    pub total: usize,
    /// Rounded to two decimals; `None` without rows
    pub mean_age_minutes: Option<f64>,
    /// Rows strictly older than the critical threshold
    pub critical_count: usize,
}

pub fn summary_metrics<'r>(
    rows: impl IntoIterator<Item = &'r EnrichedRow>,
    critical_threshold_minutes: f64,
) -> SummaryMetrics {
    let mut total = 0usize;
    let mut sum = 0.0;
    let mut critical_count = 0usize;
    for row in rows {
        total += 1;
        sum += row.age_minutes;
        if row.age_minutes > critical_threshold_minutes {
            critical_count += 1;
        }
    }

    SummaryMetrics {
        total,
        mean_age_minutes: (total > 0).then(|| round2(sum / total as f64)),
        critical_count,
    }
}

/// Age thresholds for the derived views
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub ticket_minutes: f64,
    pub critical_minutes: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ticket_minutes: 20.0,
            critical_minutes: 120.0,
        }
    }
}

/// Everything the dashboard shows for one regional selection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub regional: String,
    pub teams: Vec<AggregateRow>,
    pub tickets: Vec<EnrichedRow>,
    pub metrics: SummaryMetrics,
}

pub fn build_view(
    rows: &[EnrichedRow],
    filter: &RegionalFilter,
    thresholds: Thresholds,
) -> DashboardView {
    let filtered: Vec<&EnrichedRow> = rows.iter().filter(|row| filter.matches(row)).collect();

    DashboardView {
        regional: filter.label().to_string(),
        teams: aggregate_by_team(filtered.iter().copied()),
        tickets: tickets_over_threshold(filtered.iter().copied(), thresholds.ticket_minutes),
        metrics: summary_metrics(filtered.iter().copied(), thresholds.critical_minutes),
    }
}
