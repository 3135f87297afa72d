//! Output sinks for assembled feature tables: CSV on disk and a SQLite table.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::assemble::{CellValue, FeatureDType, FeatureSchema, FeatureTable};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid output path: {0}")]
    InvalidPath(PathBuf),
    #[error("invalid table name '{0}': use ASCII letters, digits and '_'")]
    InvalidTableName(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvWriteReport {
    pub path: PathBuf,
    pub rows: usize,
    pub bytes: usize,
    pub sha256: String,
}

/// Header row plus one line per feature row; missing static values render as empty cells.
pub fn render_feature_csv(table: &FeatureTable) -> Result<Vec<u8>, SinkError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(table.schema.columns.iter().map(|c| c.name.as_str()))?;

    for row in &table.rows {
        let fields: Vec<String> = row
            .cells()
            .into_iter()
            .map(|cell| match cell {
                CellValue::Int(v) => v.to_string(),
                CellValue::Text(text) => text,
                CellValue::Null => String::new(),
            })
            .collect();
        writer.write_record(&fields)?;
    }

    writer
        .into_inner()
        .map_err(|err| SinkError::Io(err.into_error()))
}

/// SHA-256 of the rendered CSV; identical inputs and config give identical digests.
pub fn table_digest(table: &FeatureTable) -> Result<String, SinkError> {
    let bytes = render_feature_csv(table)?;
    Ok(sha256_hex(&bytes))
}

/// Written CSV and schema sidecar, held under temp names until [`StagedCsv::publish`].
/// Dropping an unpublished stage removes the temp files.
#[derive(Debug)]
pub struct StagedCsv {
    report: CsvWriteReport,
    csv_tmp: Option<PathBuf>,
    schema_path: PathBuf,
    schema_tmp: Option<PathBuf>,
}

impl StagedCsv {
    pub fn report(&self) -> &CsvWriteReport {
        &self.report
    }

    pub fn publish(mut self) -> Result<CsvWriteReport, SinkError> {
        if let Some(tmp) = self.schema_tmp.take() {
            fs::rename(tmp, &self.schema_path)?;
        }
        if let Some(tmp) = self.csv_tmp.take() {
            fs::rename(tmp, &self.report.path)?;
        }

        info!(
            component = "sink",
            event = "sink.csv.written",
            path = %self.report.path.display(),
            rows = self.report.rows,
            bytes = self.report.bytes,
            sha256 = %self.report.sha256
        );

        Ok(self.report.clone())
    }
}

impl Drop for StagedCsv {
    fn drop(&mut self) {
        for tmp in [self.csv_tmp.take(), self.schema_tmp.take()].into_iter().flatten() {
            let _ = fs::remove_file(tmp);
        }
    }
}

/// `<csv file name>.schema.json` next to the CSV.
pub fn schema_sidecar_path(csv_path: &Path) -> PathBuf {
    let mut name = csv_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".schema.json");
    csv_path.with_file_name(name)
}

/// Writes the CSV and its schema sidecar to temp files; nothing is visible at `path` yet.
pub fn stage_feature_csv(table: &FeatureTable, path: &Path) -> Result<StagedCsv, SinkError> {
    let bytes = render_feature_csv(table)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let schema_path = schema_sidecar_path(path);
    let mut staged = StagedCsv {
        report: CsvWriteReport {
            path: path.to_path_buf(),
            rows: table.rows.len(),
            bytes: bytes.len(),
            sha256: sha256_hex(&bytes),
        },
        csv_tmp: None,
        schema_path,
        schema_tmp: None,
    };
    staged.csv_tmp = Some(write_temp(path, &bytes)?);
    let schema_json = serde_json::to_vec_pretty(&table.schema)?;
    staged.schema_tmp = Some(write_temp(&staged.schema_path, &schema_json)?);

    Ok(staged)
}

pub fn write_feature_csv(table: &FeatureTable, path: &Path) -> Result<CsvWriteReport, SinkError> {
    stage_feature_csv(table, path)?.publish()
}

pub fn read_feature_schema(path: &Path) -> Result<FeatureSchema, SinkError> {
    let raw = fs::read(path)?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Replaces `table_name` in the database with the feature table, keyed on (id, month).
pub fn write_feature_sqlite(
    table: &FeatureTable,
    db_path: &Path,
    table_name: &str,
) -> Result<usize, SinkError> {
    if !is_valid_table_name(table_name) {
        return Err(SinkError::InvalidTableName(table_name.to_string()));
    }
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut conn = Connection::open(db_path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        ",
    )?;

    let columns = &table.schema.columns;
    let column_defs: Vec<String> = columns
        .iter()
        .map(|c| {
            let sql_type = match c.dtype {
                FeatureDType::Int => "INTEGER NOT NULL",
                FeatureDType::Text => "TEXT",
            };
            format!("{} {sql_type}", quote_ident(&c.name))
        })
        .collect();
    let key = format!(
        "PRIMARY KEY ({}, {})",
        quote_ident(&columns[0].name),
        quote_ident(&columns[1].name)
    );
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let insert_sql = format!(
        "INSERT INTO {} VALUES ({})",
        quote_ident(table_name),
        placeholders.join(", ")
    );

    let tx = conn.transaction()?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {name};
         CREATE TABLE {name} ({defs}, {key});",
        name = quote_ident(table_name),
        defs = column_defs.join(", "),
    ))?;
    {
        let mut stmt = tx.prepare(&insert_sql)?;
        for row in &table.rows {
            let values = row.cells().into_iter().map(|cell| match cell {
                CellValue::Int(v) => Value::Integer(v),
                CellValue::Text(text) => Value::Text(text),
                CellValue::Null => Value::Null,
            });
            stmt.execute(params_from_iter(values))?;
        }
    }
    tx.commit()?;

    info!(
        component = "sink",
        event = "sink.sqlite.written",
        path = %db_path.display(),
        table = table_name,
        rows = table.rows.len()
    );

    Ok(table.rows.len())
}

fn write_temp(path: &Path, bytes: &[u8]) -> Result<PathBuf, SinkError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| SinkError::InvalidPath(path.to_path_buf()))?;
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(tmp_path)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn is_valid_table_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_restricted_to_identifiers() {
        assert!(is_valid_table_name("features"));
        assert!(is_valid_table_name("_monthly_v1"));
        assert!(!is_valid_table_name(""));
        assert!(!is_valid_table_name("1features"));
        assert!(!is_valid_table_name("features; DROP TABLE x"));
    }

    #[test]
    fn sidecar_sits_next_to_the_csv() {
        assert_eq!(
            schema_sidecar_path(Path::new("out/features.csv")),
            PathBuf::from("out/features.csv.schema.json")
        );
    }

    #[test]
    fn identifiers_escape_embedded_quotes() {
        assert_eq!(quote_ident("max_dpd_3m"), "\"max_dpd_3m\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
