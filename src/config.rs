//! Build configuration: defaults, JSON config files and `PITFEAT_*` env overrides.

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BuildError;
use crate::observability::parse_bool;

pub const FEATURE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    Strict,
    ReportAndContinue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub id_col: String,
    pub month_col: String,
    pub dpd_col: String,
    pub status_col: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id_col: "id".to_string(),
            month_col: "as_of_month".to_string(),
            dpd_col: "days_past_due".to_string(),
            status_col: "status".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub depth_threshold: u32,
    pub delinquent_statuses: Vec<String>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            depth_threshold: 30,
            delinquent_statuses: vec![
                "Late (31-120 days)".to_string(),
                "Default".to_string(),
                "Charged Off".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticTableConfig {
    /// Id column of the static table when it differs from the panel's.
    pub id_col: Option<String>,
    pub derive_origination_fields: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub windows_months: Vec<u32>,
    pub horizon_months: u32,
    pub event: EventConfig,
    pub monthly: ColumnMapping,
    pub static_table: StaticTableConfig,
    pub gap_policy: GapPolicy,
    pub max_threads: Option<usize>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            windows_months: vec![3, 6, 12],
            horizon_months: 3,
            event: EventConfig::default(),
            monthly: ColumnMapping::default(),
            static_table: StaticTableConfig::default(),
            gap_policy: GapPolicy::ReportAndContinue,
            max_threads: None,
        }
    }
}

impl BuildConfig {
    pub fn static_id_col(&self) -> &str {
        self.static_table
            .id_col
            .as_deref()
            .unwrap_or(&self.monthly.id_col)
    }

    pub fn validate(&self) -> Result<(), BuildError> {
        if self.horizon_months == 0 {
            return Err(BuildError::InvalidConfig(
                "horizon_months must be > 0".to_string(),
            ));
        }

        if self.windows_months.is_empty() {
            return Err(BuildError::InvalidConfig(
                "windows_months must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for window in &self.windows_months {
            if *window == 0 {
                return Err(BuildError::InvalidConfig(
                    "windows_months entries must be > 0".to_string(),
                ));
            }
            if !seen.insert(*window) {
                return Err(BuildError::InvalidConfig(
                    "windows_months entries must be unique".to_string(),
                ));
            }
        }

        let mapping = &self.monthly;
        for (name, value) in [
            ("monthly.id_col", &mapping.id_col),
            ("monthly.month_col", &mapping.month_col),
            ("monthly.dpd_col", &mapping.dpd_col),
            ("monthly.status_col", &mapping.status_col),
        ] {
            if value.trim().is_empty() {
                return Err(BuildError::InvalidConfig(format!("{name} must not be empty")));
            }
        }
        if mapping.id_col == mapping.month_col {
            return Err(BuildError::InvalidConfig(
                "monthly.id_col and monthly.month_col must differ".to_string(),
            ));
        }
        if self.static_id_col().trim().is_empty() {
            return Err(BuildError::InvalidConfig(
                "static_table.id_col must not be empty".to_string(),
            ));
        }

        if self.max_threads == Some(0) {
            return Err(BuildError::InvalidConfig(
                "max_threads must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: '{value}'")]
    InvalidEnv { var: &'static str, value: String },
}

pub fn load_build_config(path: &Path) -> Result<BuildConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads `PITFEAT_CONFIG` (if set) and overlays the scalar env overrides.
pub fn build_config_from_env() -> Result<BuildConfig, ConfigError> {
    let base = match env::var("PITFEAT_CONFIG") {
        Ok(path) if !path.trim().is_empty() => load_build_config(Path::new(path.trim()))?,
        _ => BuildConfig::default(),
    };
    apply_env_overrides(base)
}

pub fn apply_env_overrides(mut config: BuildConfig) -> Result<BuildConfig, ConfigError> {
    if let Some(raw) = env_value("PITFEAT_HORIZON_MONTHS") {
        config.horizon_months = parse_env_u32("PITFEAT_HORIZON_MONTHS", &raw)?;
    }

    if let Some(raw) = env_value("PITFEAT_WINDOWS_MONTHS") {
        config.windows_months = raw
            .split(',')
            .map(|part| parse_env_u32("PITFEAT_WINDOWS_MONTHS", part))
            .collect::<Result<_, _>>()?;
    }

    if let Some(raw) = env_value("PITFEAT_DEPTH_THRESHOLD") {
        config.event.depth_threshold = parse_env_u32("PITFEAT_DEPTH_THRESHOLD", &raw)?;
    }

    if let Some(raw) = env_value("PITFEAT_GAP_POLICY") {
        config.gap_policy = match raw.to_ascii_lowercase().as_str() {
            "strict" => GapPolicy::Strict,
            "report_and_continue" | "report" => GapPolicy::ReportAndContinue,
            _ => {
                return Err(ConfigError::InvalidEnv {
                    var: "PITFEAT_GAP_POLICY",
                    value: raw,
                })
            }
        };
    }

    if let Some(raw) = env_value("PITFEAT_DERIVE_ORIGINATION") {
        config.static_table.derive_origination_fields =
            parse_bool(&raw).ok_or(ConfigError::InvalidEnv {
                var: "PITFEAT_DERIVE_ORIGINATION",
                value: raw,
            })?;
    }

    if let Some(raw) = env_value("PITFEAT_MAX_THREADS") {
        let threads = parse_env_u32("PITFEAT_MAX_THREADS", &raw)?;
        config.max_threads = Some(threads as usize);
    }

    Ok(config)
}

fn env_value(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn parse_env_u32(var: &'static str, raw: &str) -> Result<u32, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            value: raw.to_string(),
        })
}
