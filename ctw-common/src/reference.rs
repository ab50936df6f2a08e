//! Static reference tables
//!
//! Three source tables (responsible -> team, branch label -> code,
//! regional -> codes) plus the inverse maps derived from them at load time.
//! Tables are built once at startup and shared read-only.
//!
//! Two collisions are resolved by insertion order and never reported:
//! a code listed under two regionals resolves to the later regional, and two
//! branch labels whose cities normalize to the same key resolve to the later
//! label's code.

use crate::normalize::normalize;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info};

/// Regional assigned to rows whose branch code is unknown
pub const UNMAPPED_REGIONAL: &str = "UNMAPPED";

/// Responsible name used when a conversation has no resolvable assignee
pub const UNASSIGNED: &str = "Unassigned";

const BUILTIN_TABLES: &str = include_str!("reference_tables.toml");

fn default_branch_prefix() -> String {
    "Mottu ".to_string()
}

fn default_all_regions_label() -> String {
    "All Regions".to_string()
}

/// On-disk layout of the reference tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceTablesFile {
    /// Prefix stripped from branch labels to recover the city name
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    /// Name of the synthetic regional covering every base regional
    #[serde(default = "default_all_regions_label")]
    pub all_regions_label: String,
    #[serde(default)]
    pub teams: Vec<TeamEntry>,
    #[serde(default)]
    pub branches: Vec<BranchEntry>,
    #[serde(default)]
    pub regionals: Vec<RegionalEntry>,
    #[serde(default)]
    pub city_aliases: Vec<CityAlias>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamEntry {
    pub responsible: String,
    pub team: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchEntry {
    pub label: String,
    pub code: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionalEntry {
    pub name: String,
    pub codes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityAlias {
    pub alias: String,
    pub city: String,
}

/// Read-only lookup tables used by the row builder and the regional filter
#[derive(Debug, Clone)]
pub struct ReferenceTables {
    branch_prefix: String,
    /// normalized responsible name -> team
    team_map: HashMap<String, String>,
    /// branch label -> code, exact label as written in the table
    branch_codes: HashMap<String, u32>,
    /// normalized branch label -> code
    label_to_code: HashMap<String, u32>,
    /// code -> first label carrying it, in table order
    code_to_label: HashMap<u32, String>,
    /// base regionals in table order
    regional_groups: Vec<(String, BTreeSet<u32>)>,
    all_regions_label: String,
    all_regions_codes: BTreeSet<u32>,
    code_to_regional: HashMap<u32, String>,
    /// normalized city -> code
    city_to_code: HashMap<String, u32>,
}

impl ReferenceTables {
    /// Tables compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES)
    }

    /// Load tables from `path`, or the compiled-in tables when `path` is `None`
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!(
                        "Failed to read reference tables {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let tables = Self::from_toml_str(&content)?;
                info!("Reference tables loaded from {}", path.display());
                Ok(tables)
            }
            None => {
                let tables = Self::builtin()?;
                debug!("Using built-in reference tables");
                Ok(tables)
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ReferenceTablesFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse reference tables: {}", e)))?;
        Ok(Self::from_file(file))
    }

    /// Build every derived map from the raw tables
    pub fn from_file(file: ReferenceTablesFile) -> Self {
        let team_map: HashMap<String, String> = file
            .teams
            .iter()
            .filter(|entry| !entry.responsible.trim().is_empty())
            .map(|entry| (normalize(&entry.responsible), entry.team.clone()))
            .collect();

        let mut branch_codes = HashMap::new();
        let mut label_to_code = HashMap::new();
        let mut code_to_label = HashMap::new();
        let mut city_to_code = HashMap::new();
        for entry in &file.branches {
            branch_codes.insert(entry.label.clone(), entry.code);
            label_to_code.insert(normalize(&entry.label), entry.code);
            code_to_label
                .entry(entry.code)
                .or_insert_with(|| entry.label.clone());
            let city = city_from_label(&entry.label, &file.branch_prefix);
            city_to_code.insert(normalize(city), entry.code);
        }

        for alias in &file.city_aliases {
            if let Some(code) = city_to_code.get(&normalize(&alias.city)).copied() {
                city_to_code.insert(normalize(&alias.alias), code);
            }
        }

        let mut regional_groups: Vec<(String, BTreeSet<u32>)> = Vec::new();
        let mut code_to_regional = HashMap::new();
        let mut all_regions_codes = BTreeSet::new();
        for regional in &file.regionals {
            let codes: BTreeSet<u32> = regional.codes.iter().copied().collect();
            for code in &regional.codes {
                code_to_regional.insert(*code, regional.name.clone());
            }
            all_regions_codes.extend(codes.iter().copied());
            match regional_groups.iter_mut().find(|(name, _)| *name == regional.name) {
                Some((_, existing)) => *existing = codes,
                None => regional_groups.push((regional.name.clone(), codes)),
            }
        }

        Self {
            branch_prefix: file.branch_prefix,
            team_map,
            branch_codes,
            label_to_code,
            code_to_label,
            regional_groups,
            all_regions_label: file.all_regions_label,
            all_regions_codes,
            code_to_regional,
            city_to_code,
        }
    }

    /// Team mapped for a responsible name, if the table has a non-blank entry
    pub fn team_for(&self, responsible: &str) -> Option<&str> {
        self.team_map
            .get(&normalize(responsible))
            .map(|team| team.trim())
            .filter(|team| !team.is_empty())
    }

    /// Team for a responsible name, falling back to the name itself.
    ///
    /// An empty or whitespace-only name maps to [`UNASSIGNED`].
    pub fn map_to_team(&self, responsible: &str) -> String {
        let responsible = responsible.trim();
        match self.team_for(responsible) {
            Some(team) => team.to_string(),
            None if responsible.is_empty() => UNASSIGNED.to_string(),
            None => responsible.to_string(),
        }
    }

    /// Code for a branch label, matched exactly first and then normalized
    pub fn branch_code(&self, label: &str) -> Option<u32> {
        self.branch_codes
            .get(label)
            .or_else(|| self.label_to_code.get(&normalize(label)))
            .copied()
    }

    /// Code for a city name (accent, case and spacing insensitive)
    pub fn code_for_city(&self, city: &str) -> Option<u32> {
        self.city_to_code.get(&normalize(city)).copied()
    }

    /// Canonical label for a branch code
    pub fn branch_label(&self, code: u32) -> Option<&str> {
        self.code_to_label.get(&code).map(String::as_str)
    }

    /// Base regional owning a code. Never returns the synthetic regional.
    pub fn regional_for_code(&self, code: u32) -> Option<&str> {
        self.code_to_regional.get(&code).map(String::as_str)
    }

    /// Regional for an optional code, or [`UNMAPPED_REGIONAL`]
    pub fn regional_or_unmapped(&self, code: Option<u32>) -> String {
        code.and_then(|c| self.regional_for_code(c))
            .unwrap_or(UNMAPPED_REGIONAL)
            .to_string()
    }

    /// Codes covered by a regional, including the synthetic all-regions group
    pub fn codes_for_regional(&self, name: &str) -> Option<&BTreeSet<u32>> {
        if name == self.all_regions_label {
            return Some(&self.all_regions_codes);
        }
        self.regional_groups
            .iter()
            .find(|(regional, _)| regional == name)
            .map(|(_, codes)| codes)
    }

    pub fn all_regions_label(&self) -> &str {
        &self.all_regions_label
    }

    pub fn branch_prefix(&self) -> &str {
        &self.branch_prefix
    }

    /// Base regional names in table order
    pub fn regional_names(&self) -> impl Iterator<Item = &str> {
        self.regional_groups.iter().map(|(name, _)| name.as_str())
    }

    /// Selectable regionals: base regionals plus the synthetic group, sorted
    pub fn selectable_regionals(&self) -> Vec<String> {
        let mut names: Vec<String> = self.regional_names().map(str::to_string).collect();
        if !names.iter().any(|n| *n == self.all_regions_label) {
            names.push(self.all_regions_label.clone());
        }
        names.sort();
        names
    }

    /// Codes listed under more than one base regional, with every owner.
    ///
    /// Empty for well-formed tables.
    pub fn overlapping_codes(&self) -> Vec<(u32, Vec<String>)> {
        let mut owners: HashMap<u32, Vec<String>> = HashMap::new();
        for (name, codes) in &self.regional_groups {
            for code in codes {
                owners.entry(*code).or_default().push(name.clone());
            }
        }
        let mut overlaps: Vec<(u32, Vec<String>)> = owners
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .collect();
        overlaps.sort_by_key(|(code, _)| *code);
        overlaps
    }

    /// Number of distinct branch labels
    pub fn branch_count(&self) -> usize {
        self.branch_codes.len()
    }
}

/// Strip the branch prefix (ASCII case-insensitive) to recover the city
pub fn city_from_label<'a>(label: &'a str, prefix: &str) -> &'a str {
    match label.get(..prefix.len()) {
        Some(head) if !prefix.is_empty() && head.eq_ignore_ascii_case(prefix) => {
            label[prefix.len()..].trim()
        }
        _ => label.trim(),
    }
}
