//! Shared logging configuration and initialization.

use std::env;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::assemble::FeatureTableSummary;
use crate::config::BuildConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            include_target: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingInitError {
    #[error("logging already initialized: {0}")]
    AlreadyInitialized(#[from] tracing::subscriber::SetGlobalDefaultError),
}

pub fn logging_config_from_env() -> LoggingConfig {
    let mut config = LoggingConfig::default();

    if let Ok(level) = env::var("PITFEAT_LOG_LEVEL") {
        let trimmed = level.trim();
        if !trimmed.is_empty() {
            config.level = trimmed.to_string();
        }
    }

    if let Ok(format) = env::var("PITFEAT_LOG_FORMAT") {
        if let Some(parsed) = parse_log_format(&format) {
            config.format = parsed;
        }
    }

    if let Ok(include_target) = env::var("PITFEAT_LOG_TARGET") {
        if let Some(parsed) = parse_bool(&include_target) {
            config.include_target = parsed;
        }
    }

    config
}

pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingInitError> {
    let env_filter =
        EnvFilter::try_new(config.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(config.include_target)
        .with_writer(std::io::stderr)
        .with_ansi(matches!(config.format, LogFormat::Pretty));

    match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }

    Ok(())
}

pub fn log_app_start(binary: &'static str, logging: &LoggingConfig, build: &BuildConfig) {
    info!(
        component = binary,
        event = "app.start",
        log_level = %logging.level,
        log_format = ?logging.format,
        include_target = logging.include_target,
        windows = ?build.windows_months,
        horizon_months = build.horizon_months,
        gap_policy = ?build.gap_policy,
        max_threads = build.max_threads
    );
}

pub fn log_build_summary(binary: &'static str, summary: &FeatureTableSummary) {
    info!(
        component = binary,
        event = "app.summary",
        rows = summary.rows,
        columns = summary.columns,
        entities = summary.entities,
        label_rate = summary.label_rate,
        entities_with_gaps = summary.entities_with_gaps,
        static_unmatched_entities = summary.static_unmatched_entities
    );
}

fn parse_log_format(raw: &str) -> Option<LogFormat> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" => Some(LogFormat::Pretty),
        _ => None,
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn with_log_env<R>(level: Option<&str>, format: Option<&str>, target: Option<&str>, f: impl FnOnce() -> R) -> R {
        let _guard = env_lock().lock().expect("env lock should not be poisoned");
        let vars = [
            ("PITFEAT_LOG_LEVEL", level),
            ("PITFEAT_LOG_FORMAT", format),
            ("PITFEAT_LOG_TARGET", target),
        ];
        let previous: Vec<(&str, Option<String>)> =
            vars.iter().map(|(key, _)| (*key, env::var(key).ok())).collect();

        for (key, value) in vars {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        let output = f();

        for (key, value) in previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }

        output
    }

    #[test]
    fn unset_env_gives_pretty_info_with_targets() {
        let cfg = with_log_env(None, None, None, logging_config_from_env);
        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn env_selects_json_level_and_target() {
        let cfg = with_log_env(Some("pitfeat=debug"), Some("JSON"), Some("off"), logging_config_from_env);
        assert_eq!(cfg.level, "pitfeat=debug");
        assert_eq!(cfg.format, LogFormat::Json);
        assert!(!cfg.include_target);
    }

    #[test]
    fn unknown_values_keep_defaults() {
        let cfg = with_log_env(Some("  "), Some("yaml"), Some("sometimes"), logging_config_from_env);
        assert_eq!(cfg, LoggingConfig::default());
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
