//! Audit settings.
//!
//! Loads and saves `~/.stackaudit/config.json`. Every field has a default,
//! so a missing file (or a file with only some keys) is valid.
//! A handful of `SA_*` environment variables override the file.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{global_stackaudit_dir, is_truthy};

/// Stack Audit configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    /// User-level kill switch for incremental audits.
    pub incremental_enabled: bool,
    /// Subtracted from the watermark before filtering incremental candidates.
    pub incremental_safety_margin_secs: u64,
    /// Delay between job status checks.
    pub poll_interval_secs: u64,
    /// Maximum rows per append batch.
    pub batch_size: usize,
    /// Pause between append batches.
    pub batch_pause_ms: u64,
    pub bigquery: BigQuerySettings,
    pub thresholds: Thresholds,
    pub audit_rules: Vec<AuditRule>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            incremental_enabled: true,
            incremental_safety_margin_secs: 300,
            poll_interval_secs: 10,
            batch_size: 500,
            batch_pause_ms: 100,
            bigquery: BigQuerySettings::default(),
            thresholds: Thresholds::default(),
            audit_rules: Vec::new(),
        }
    }
}

impl AuditConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    #[must_use]
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    #[must_use]
    pub fn safety_margin(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.incremental_safety_margin_secs).unwrap_or(0))
    }
}

/// BigQuery target for the alerting jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BigQuerySettings {
    pub project_id: Option<String>,
    /// GA4 export dataset, e.g. `analytics_123456789`.
    pub ga4_dataset: Option<String>,
    pub lookback_days: u32,
}

impl Default for BigQuerySettings {
    fn default() -> Self {
        Self {
            project_id: None,
            ga4_dataset: None,
            lookback_days: 7,
        }
    }
}

/// Severity thresholds used by the result finalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Thresholds {
    /// Drop (in percent) at or beyond which a heartbeat is CRITICAL.
    pub heartbeat_critical_drop_pct: f64,
    /// Drop (in percent) at or beyond which a heartbeat is WARNING.
    pub heartbeat_warning_drop_pct: f64,
    /// Rise (in percent) at or beyond which a heartbeat is WARNING.
    pub heartbeat_spike_pct: f64,
    /// Fill rate assumed when no audit rule matches.
    pub default_min_fill_rate: f64,
    /// Fill-rate deficit (percentage points) at or beyond which a parameter is CRITICAL.
    pub fill_rate_critical_deficit: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            heartbeat_critical_drop_pct: 50.0,
            heartbeat_warning_drop_pct: 20.0,
            heartbeat_spike_pct: 200.0,
            default_min_fill_rate: 90.0,
            fill_rate_critical_deficit: 20.0,
        }
    }
}

/// Expected parameter fill rate for an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRule {
    pub event_name: String,
    pub parameter_name: String,
    #[serde(default = "default_platform")]
    pub platform: String,
    pub min_fill_rate: f64,
    #[serde(default = "default_alert_type")]
    pub alert_type: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl AuditRule {
    /// Active GA4 fill-rate rule.
    #[must_use]
    pub fn new(event_name: &str, parameter_name: &str, min_fill_rate: f64) -> Self {
        Self {
            event_name: event_name.to_string(),
            parameter_name: parameter_name.to_string(),
            platform: default_platform(),
            min_fill_rate,
            alert_type: default_alert_type(),
            active: default_active(),
        }
    }

    /// Whether this rule applies to the event/parameter pair.
    #[must_use]
    pub fn covers(&self, event_name: &str, parameter_name: &str) -> bool {
        self.active
            && self.event_name.eq_ignore_ascii_case(event_name)
            && self.parameter_name.eq_ignore_ascii_case(parameter_name)
    }
}

fn default_platform() -> String {
    "GA4".to_string()
}

fn default_alert_type() -> String {
    "FILL_RATE".to_string()
}

fn default_active() -> bool {
    true
}

/// Get the config file path.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    global_stackaudit_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or(Error::Config("Could not determine home directory".into()))
}

/// Load the configuration from the default location.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<AuditConfig> {
    load_config_from(&config_path()?)
}

/// Load the configuration from an explicit path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<AuditConfig> {
    if !path.exists() {
        return Ok(AuditConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Save the configuration to the default location.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_config(config: &AuditConfig) -> Result<()> {
    save_config_to(&config_path()?, config)
}

/// Save the configuration to an explicit path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_config_to(path: &Path, config: &AuditConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::Config(format!("Failed to create config directory: {e}")))?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

    fs::write(path, content)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))?;

    Ok(())
}

/// Load the configuration and apply environment overrides.
///
/// # Errors
///
/// Returns an error if the config file is unreadable.
pub fn resolve_config() -> Result<AuditConfig> {
    let mut config = load_config()?;
    config.incremental_enabled = resolve_incremental_enabled(&config);
    config.bigquery.project_id = resolve_bigquery_project(&config);
    config.bigquery.ga4_dataset = resolve_ga4_dataset(&config);
    Ok(config)
}

/// Resolve the incremental kill switch.
///
/// Priority: `SA_INCREMENTAL` env var > config > enabled.
#[must_use]
pub fn resolve_incremental_enabled(config: &AuditConfig) -> bool {
    if let Ok(value) = std::env::var("SA_INCREMENTAL") {
        return is_truthy(&value);
    }
    config.incremental_enabled
}

/// Resolve the BigQuery project.
///
/// Priority: `SA_BQ_PROJECT` env var > config.
#[must_use]
pub fn resolve_bigquery_project(config: &AuditConfig) -> Option<String> {
    if let Ok(project) = std::env::var("SA_BQ_PROJECT") {
        if !project.is_empty() {
            return Some(project);
        }
    }
    config.bigquery.project_id.clone()
}

/// Resolve the GA4 export dataset.
///
/// Priority: `SA_GA4_DATASET` env var > config.
#[must_use]
pub fn resolve_ga4_dataset(config: &AuditConfig) -> Option<String> {
    if let Ok(dataset) = std::env::var("SA_GA4_DATASET") {
        if !dataset.is_empty() {
            return Some(dataset);
        }
    }
    config.bigquery.ga4_dataset.clone()
}

/// Resolve the OAuth bearer token for the BigQuery REST API.
///
/// Token acquisition itself is out of scope; the caller exports it.
#[must_use]
pub fn resolve_access_token() -> Option<String> {
    std::env::var("SA_ACCESS_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
}
