//! Build error taxonomy shared by the normalizer, the per-entity passes and the assembler.

use serde::Serialize;
use thiserror::Error;

use crate::month::YearMonth;
use crate::panel::PanelLoadError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Configuration,
    Parse,
    MergeIntegrity,
    Io,
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("missing required column '{column}' in {table} table; found columns: {found:?}")]
    MissingColumn {
        table: &'static str,
        column: String,
        found: Vec<String>,
    },
    #[error(
        "monthly table must contain either '{depth_col}' or '{status_col}'; found columns: {found:?}"
    )]
    MissingEventColumn {
        depth_col: String,
        status_col: String,
        found: Vec<String>,
    },
    #[error("invalid build config: {0}")]
    InvalidConfig(String),
    #[error("static column '{column}' collides with a computed feature column")]
    StaticColumnCollision { column: String },
    #[error("invalid month value '{value}' in column '{column}' (record {record}, entity '{entity_id}')")]
    InvalidMonth {
        column: String,
        record: usize,
        entity_id: String,
        value: String,
    },
    #[error(
        "invalid delinquency depth '{value}' in column '{column}' (record {record}, entity '{entity_id}')"
    )]
    InvalidDepth {
        column: String,
        record: usize,
        entity_id: String,
        value: String,
    },
    #[error("empty entity id in column '{column}' (record {record})")]
    EmptyEntityId { column: String, record: usize },
    #[error("duplicate month {month} for entity '{entity_id}'")]
    DuplicateMonth { entity_id: String, month: YearMonth },
    #[error("month gap for entity '{entity_id}': {previous} followed by {next} ({missing_months} missing months)")]
    MonthGap {
        entity_id: String,
        previous: YearMonth,
        next: YearMonth,
        missing_months: i64,
    },
    #[error("feature/label merge mismatch for entity '{entity_id}': {detail}")]
    MergeIntegrity { entity_id: String, detail: String },
    #[error(transparent)]
    Panel(#[from] PanelLoadError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingColumn { .. }
            | Self::MissingEventColumn { .. }
            | Self::InvalidConfig(_)
            | Self::StaticColumnCollision { .. } => ErrorKind::Configuration,
            Self::InvalidMonth { .. }
            | Self::InvalidDepth { .. }
            | Self::EmptyEntityId { .. }
            | Self::DuplicateMonth { .. }
            | Self::MonthGap { .. } => ErrorKind::Parse,
            Self::MergeIntegrity { .. } => ErrorKind::MergeIntegrity,
            Self::Panel(err) => err.kind(),
        }
    }
}
