//! Downstream quality gates over a written feature table.

use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::assemble::{
    assert_schema_compatible, build_feature_schema, count_column_name, max_depth_column_name,
    FeatureSchema,
};
use crate::config::BuildConfig;
use crate::error::BuildError;
use crate::panel::{load_table, PanelLoadError, RawTable};

#[derive(Debug, Error)]
pub enum QualityError {
    #[error(transparent)]
    Load(#[from] PanelLoadError),
    #[error("missing required column '{0}'")]
    MissingColumn(String),
    #[error("record {record}: null value in label column '{column}'")]
    NullLabel { column: String, record: usize },
    #[error("record {record}: non-binary value '{value}' in label column '{column}'")]
    NonBinaryLabel {
        column: String,
        record: usize,
        value: String,
    },
    #[error("record {record}: value '{value}' in column '{column}' is not a non-negative integer")]
    NegativeOrInvalid {
        column: String,
        record: usize,
        value: String,
    },
    #[error("written schema does not match the table: {0}")]
    SchemaMismatch(String),
    #[error(transparent)]
    Schema(#[from] BuildError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityGateSpec {
    pub id_col: String,
    pub month_col: String,
    pub horizon_months: u32,
    pub windows: Vec<u32>,
}

impl QualityGateSpec {
    pub fn from_config(cfg: &BuildConfig) -> Self {
        Self {
            id_col: cfg.monthly.id_col.clone(),
            month_col: cfg.monthly.month_col.clone(),
            horizon_months: cfg.horizon_months,
            windows: cfg.windows_months.clone(),
        }
    }

    pub fn label_column(&self) -> String {
        format!("label_next_{}m", self.horizon_months)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub rows: usize,
    pub columns: usize,
    pub label_column: String,
    pub positive_labels: usize,
    pub label_rate: f64,
}

pub fn check_feature_file(path: &Path, spec: &QualityGateSpec) -> Result<QualityReport, QualityError> {
    let table = load_table(path)?;
    check_feature_table(&table, spec)
}

pub fn check_feature_table(table: &RawTable, spec: &QualityGateSpec) -> Result<QualityReport, QualityError> {
    let label_column = spec.label_column();
    required_column(table, &spec.id_col)?;
    required_column(table, &spec.month_col)?;
    let label_idx = required_column(table, &label_column)?;

    let window_columns: Vec<(String, usize)> = spec
        .windows
        .iter()
        .flat_map(|w| [count_column_name(*w), max_depth_column_name(*w)])
        .filter_map(|name| table.column_index(&name).map(|idx| (name, idx)))
        .collect();

    let mut positive_labels = 0usize;
    for (idx, fields) in table.records().enumerate() {
        let record = idx + 1;
        let label = fields.get(label_idx).unwrap_or_default().trim();
        match label {
            "" => {
                return Err(QualityError::NullLabel {
                    column: label_column,
                    record,
                })
            }
            "1" => positive_labels += 1,
            "0" => {}
            other => {
                return Err(QualityError::NonBinaryLabel {
                    column: label_column,
                    record,
                    value: other.to_string(),
                })
            }
        }

        for (name, idx) in &window_columns {
            let raw = fields.get(*idx).unwrap_or_default().trim();
            if raw.parse::<u64>().is_err() {
                return Err(QualityError::NegativeOrInvalid {
                    column: name.clone(),
                    record,
                    value: raw.to_string(),
                });
            }
        }
    }

    let rows = table.len();
    let report = QualityReport {
        rows,
        columns: table.headers().len(),
        label_column,
        positive_labels,
        label_rate: if rows == 0 {
            0.0
        } else {
            positive_labels as f64 / rows as f64
        },
    };

    info!(
        component = "quality",
        event = "quality.check.passed",
        rows = report.rows,
        columns = report.columns,
        label_column = %report.label_column,
        label_rate = report.label_rate
    );

    Ok(report)
}

/// Checks a table against the schema written next to it: the header must match the written
/// columns, and the written version and fingerprint must match what `cfg` would build today.
pub fn check_written_schema(
    table: &RawTable,
    written: &FeatureSchema,
    cfg: &BuildConfig,
) -> Result<(), QualityError> {
    if table.headers() != written.column_names().as_slice() {
        return Err(QualityError::SchemaMismatch(format!(
            "header {:?} differs from written columns {:?}",
            table.headers(),
            written.column_names()
        )));
    }

    let computed = 5 + 2 * cfg.windows_months.len();
    let static_columns: Vec<String> = table
        .headers()
        .get(computed..)
        .ok_or_else(|| {
            QualityError::SchemaMismatch(format!(
                "{} columns cannot hold the {computed} computed columns",
                table.headers().len()
            ))
        })?
        .to_vec();
    let expected = build_feature_schema(cfg, &static_columns);
    assert_schema_compatible(written.version, &written.fingerprint, &expected)?;

    info!(
        component = "quality",
        event = "quality.schema.matched",
        version = written.version,
        fingerprint = %written.fingerprint
    );
    Ok(())
}

fn required_column(table: &RawTable, name: &str) -> Result<usize, QualityError> {
    table
        .column_index(name)
        .ok_or_else(|| QualityError::MissingColumn(name.to_string()))
}
