//! Configuration file handling.
//!
//! This module provides loading and saving of depaudit configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/depaudit/config.toml`
//! - macOS: `~/Library/Application Support/depaudit/config.toml`
//! - Windows: `%APPDATA%\depaudit\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! cache_ttl_hours = 12
//! ecosystem = "golang"
//! default_format = "table"
//!
//! [component_report]
//! base_url = "https://ossindex.sonatype.org/api/v3"
//! username = "me@example.com"
//! token = "secret"
//!
//! [policy]
//! server_url = "http://localhost:8070"
//! application = "my-service"
//! stage = "build"
//!
//! [ignore]
//! packages = ["example.com/internal/*"]
//! vulnerabilities = ["CVE-2021-12345", "sonatype-2020-0001 until=2025-06-30"]
//! ```

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::warn;

use crate::cache::CACHE_TTL_HOURS;
use crate::checker::DEFAULT_CHUNK_SIZE;
use crate::model::CoordinateReport;

/// Application configuration.
///
/// This struct represents all configurable options for depaudit.
/// It can be loaded from a TOML file or created with default values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long to keep component reports in the cache, in hours.
    ///
    /// Default: 12 hours
    pub cache_ttl_hours: u64,

    /// Package-URL type used for manifest records.
    ///
    /// Default: "golang"
    pub ecosystem: String,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    /// Default: "table"
    pub default_format: String,

    pub component_report: ComponentReportConfig,

    pub policy: PolicyConfig,

    /// Ignore list configuration for suppressing known issues.
    pub ignore: IgnoreConfig,
}

/// Username and API token for HTTP basic auth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentReportConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Coordinates per request.
    pub chunk_size: usize,
}

impl ComponentReportConfig {
    /// Credentials, only when both username and token are set.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.token) {
            (Some(username), Some(token)) if !username.is_empty() && !token.is_empty() => {
                Some(Credentials {
                    username: username.clone(),
                    token: token.clone(),
                })
            }
            _ => None,
        }
    }
}

impl Default for ComponentReportConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ossindex.sonatype.org/api/v3".to_string(),
            username: None,
            token: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub server_url: String,
    pub username: String,
    pub token: String,
    /// Public application id; can be overridden on the command line.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    pub stage: String,
    /// Status checks after the first one before giving up.
    pub max_retries: u32,
    pub poll_interval_secs: u64,
}

impl PolicyConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.username.clone(),
            token: self.token.clone(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8070".to_string(),
            username: "admin".to_string(),
            token: "admin123".to_string(),
            application: None,
            stage: "develop".to_string(),
            max_retries: 300,
            poll_interval_secs: 1,
        }
    }
}

/// Configuration for ignoring specific packages or vulnerabilities.
///
/// Use this to suppress known false positives or accepted risks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to leave out of the audit.
    ///
    /// Supports glob patterns (e.g., "example.com/internal/*").
    pub packages: Vec<String>,

    /// Vulnerability ids or CVEs to exclude from results.
    ///
    /// An entry may be time-boxed with `until=YYYY-MM-DD`; after that date
    /// it no longer applies.
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, name: &str) -> bool {
        self.packages.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, name)
            } else {
                pattern == name
            }
        })
    }

    /// Ids of the vulnerability entries still in effect on `today`.
    fn active_vulnerability_ids(&self, today: NaiveDate) -> Vec<&str> {
        self.vulnerabilities
            .iter()
            .filter_map(|entry| {
                let mut parts = entry.split_whitespace();
                let id = parts.next()?;
                if id.starts_with('#') {
                    return None;
                }

                for option in parts {
                    let Some(until) = option.strip_prefix("until=") else {
                        warn!("Unknown option '{}' in ignore entry '{}'", option, entry);
                        continue;
                    };
                    match NaiveDate::parse_from_str(until, "%Y-%m-%d") {
                        Ok(date) if today > date => return None,
                        Ok(_) => {}
                        Err(_) => warn!("Invalid date '{}' in ignore entry '{}'", until, entry),
                    }
                }

                Some(id)
            })
            .collect()
    }

    /// Marks ignored vulnerabilities as excluded and returns how many were
    /// newly excluded. Only the given in-memory records are touched.
    pub fn apply(&self, records: &mut [CoordinateReport], today: NaiveDate) -> usize {
        let ids = self.active_vulnerability_ids(today);
        if ids.is_empty() {
            return 0;
        }

        let mut excluded = 0;
        for vuln in records.iter_mut().flat_map(|r| r.vulnerabilities.iter_mut()) {
            if !vuln.excluded && ids.iter().any(|id| vuln.is_identified_by(id)) {
                vuln.excluded = true;
                excluded += 1;
            }
        }
        excluded
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    // Check middle parts
    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_hours: CACHE_TTL_HOURS,
            ecosystem: "golang".to_string(),
            default_format: "table".to_string(),
            component_report: ComponentReportConfig::default(),
            policy: PolicyConfig::default(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        crate::platform::config_path()
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
