//! Configuration loading and credential resolution
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. `CTW_CONFIG` environment variable
//! 3. `~/.config/ctw/ctw-dashboard.toml`
//! 4. Compiled defaults (a missing file is never fatal)
//!
//! The helpdesk credential resolves from `INTERCOM_BEARER` first, then the
//! `[auth]` section of the TOML file. Its absence is fatal.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CTW_CONFIG";
pub const BEARER_ENV_VAR: &str = "INTERCOM_BEARER";
pub const BASE_URL_ENV_VAR: &str = "INTERCOM_BASE_URL";
pub const VERSION_ENV_VAR: &str = "INTERCOM_VERSION";

pub const DEFAULT_BASE_URL: &str = "https://api.intercom.io";
pub const DEFAULT_API_VERSION: &str = "2.14";

/// Root of the TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Optional replacement for the built-in reference tables
    #[serde(default)]
    pub reference_tables: Option<PathBuf>,
    #[serde(default)]
    pub intercom: IntercomConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Helpdesk API connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntercomConfig {
    pub base_url: Option<String>,
    pub version: Option<String>,
    /// Conversations requested per search page
    pub per_page: u32,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Tag every listed conversation must carry
    pub required_tag_id: String,
    /// Tag that removes a conversation from the listing
    pub excluded_tag_id: Option<String>,
}

impl Default for IntercomConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            version: None,
            per_page: 150,
            connect_timeout_secs: 5,
            request_timeout_secs: 60,
            required_tag_id: "11077847".to_string(),
            excluded_tag_id: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub bearer: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Dashboard behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub bind: String,
    /// Snapshot validity window
    pub refresh_secs: u64,
    /// Tickets older than this appear in the ticket-level view
    pub ticket_threshold_minutes: f64,
    /// Tickets older than this are counted as critical
    pub critical_threshold_minutes: f64,
    /// Responsible names whose conversations never appear
    pub excluded_responsibles: Vec<String>,
    /// Teams whose conversations never appear (normalized match)
    pub excluded_teams: Vec<String>,
    /// Contact custom attribute holding the branch label
    pub branch_attribute: String,
    /// Conversation custom attribute holding the free-text description
    pub description_attribute: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5740".to_string(),
            refresh_secs: 600,
            ticket_threshold_minutes: 20.0,
            critical_threshold_minutes: 120.0,
            excluded_responsibles: vec![
                "Suporte Mottu".to_string(),
                crate::reference::UNASSIGNED.to_string(),
            ],
            excluded_teams: Vec::new(),
            branch_attribute: "filial".to_string(),
            description_attribute: "descricao".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolved helpdesk credentials
#[derive(Clone, PartialEq)]
pub struct IntercomCredentials {
    pub bearer: String,
    pub base_url: String,
    pub version: String,
}

impl fmt::Debug for IntercomCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntercomCredentials")
            .field("bearer", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("version", &self.version)
            .finish()
    }
}

/// Locate the config file: CLI argument, then env var, then the user config dir.
///
/// Returns `None` when no candidate exists.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("ctw").join("ctw-dashboard.toml"))
        .filter(|p| p.exists())
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Load the config, falling back to defaults when the file is absent.
///
/// A file that exists but does not parse is an error.
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = resolve_config_path(cli_arg) else {
        info!("No config file found, using compiled defaults");
        return Ok(TomlConfig::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} not found, using compiled defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let config = load_toml_config(&path)?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve the bearer credential, base URL and API version.
///
/// Environment variables take precedence over the TOML file.
pub fn resolve_credentials(config: &TomlConfig) -> Result<IntercomCredentials> {
    let bearer = non_blank(std::env::var(BEARER_ENV_VAR).ok())
        .or_else(|| non_blank(config.auth.bearer.clone()))
        .ok_or_else(|| {
            Error::MissingCredential(format!(
                "Helpdesk bearer token not configured. Set it using one of:\n\
                 1. Environment: {}=your-token\n\
                 2. TOML config: [auth] bearer = \"your-token\"",
                BEARER_ENV_VAR
            ))
        })?;

    let base_url = non_blank(std::env::var(BASE_URL_ENV_VAR).ok())
        .or_else(|| non_blank(config.intercom.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
        .trim_end_matches('/')
        .to_string();

    let version = non_blank(std::env::var(VERSION_ENV_VAR).ok())
        .or_else(|| non_blank(config.intercom.version.clone()))
        .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

    Ok(IntercomCredentials {
        bearer,
        base_url,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.intercom.per_page, 150);
        assert_eq!(config.intercom.required_tag_id, "11077847");
        assert_eq!(config.dashboard.refresh_secs, 600);
        assert_eq!(config.dashboard.ticket_threshold_minutes, 20.0);
        assert_eq!(config.logging.level, "info");
        assert!(config.reference_tables.is_none());
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            [intercom]
            per_page = 50

            [dashboard]
            refresh_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.intercom.per_page, 50);
        assert_eq!(config.intercom.request_timeout_secs, 60);
        assert_eq!(config.dashboard.refresh_secs, 60);
        assert_eq!(config.dashboard.bind, "127.0.0.1:5740");
    }

    #[test]
    fn test_debug_redacts_bearer() {
        let auth = AuthConfig {
            bearer: Some("secret-token".to_string()),
        };
        let printed = format!("{:?}", auth);
        assert!(!printed.contains("secret-token"));

        let creds = IntercomCredentials {
            bearer: "secret-token".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            version: DEFAULT_API_VERSION.to_string(),
        };
        assert!(!format!("{:?}", creds).contains("secret-token"));
    }
}
