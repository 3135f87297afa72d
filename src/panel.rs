//! Raw table loading for the monthly panel and the static attribute table.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use thiserror::Error;
use tracing::info;
use zip::ZipArchive;

use crate::error::ErrorKind;

const BOM: char = '\u{feff}';

#[derive(Debug, Error)]
pub enum PanelLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive at {path} has no entries")]
    EmptyZipArchive { path: PathBuf },
    #[error("archive at {path} has no CSV entry")]
    MissingCsvEntry { path: PathBuf },
    #[error("table at {source_name} has no header row")]
    MissingHeader { source_name: String },
}

impl PanelLoadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Csv(_) => ErrorKind::Parse,
            Self::MissingHeader { .. } => ErrorKind::Configuration,
            Self::Io(_)
            | Self::Zip(_)
            | Self::EmptyZipArchive { .. }
            | Self::MissingCsvEntry { .. } => ErrorKind::Io,
        }
    }
}

/// A headered table of raw string cells, in source row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    headers: Vec<String>,
    records: Vec<StringRecord>,
}

impl RawTable {
    pub fn new<H, R, C>(headers: H, rows: R) -> Self
    where
        H: IntoIterator,
        H::Item: AsRef<str>,
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: AsRef<str>,
    {
        let headers = headers
            .into_iter()
            .map(|h| clean_header(h.as_ref()))
            .collect();
        let records = rows
            .into_iter()
            .map(|row| row.into_iter().collect::<StringRecord>())
            .collect();
        Self { headers, records }
    }

    pub fn from_csv_reader<R: Read>(reader: R, source_name: &str) -> Result<Self, PanelLoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = reader.headers()?.iter().map(clean_header).collect();
        if headers.is_empty() || headers.iter().all(String::is_empty) {
            return Err(PanelLoadError::MissingHeader {
                source_name: source_name.to_string(),
            });
        }

        let mut records = Vec::new();
        for record in reader.records() {
            records.push(record?);
        }

        Ok(Self { headers, records })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &StringRecord> {
        self.records.iter()
    }

    pub fn cell(&self, record: usize, column: usize) -> Option<&str> {
        self.records.get(record)?.get(column)
    }
}

/// Loads a CSV file, or the first CSV entry of a `.zip` archive.
pub fn load_table(path: &Path) -> Result<RawTable, PanelLoadError> {
    let is_zip = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);

    let source_name = path.display().to_string();
    let table = if is_zip {
        let csv_buf = read_zip_csv_entry(path)?;
        RawTable::from_csv_reader(Cursor::new(csv_buf), &source_name)?
    } else {
        RawTable::from_csv_reader(fs::File::open(path)?, &source_name)?
    };

    info!(
        component = "panel",
        event = "panel.load.finish",
        path = %path.display(),
        archive = is_zip,
        rows = table.len(),
        columns = table.headers().len()
    );

    Ok(table)
}

fn read_zip_csv_entry(path: &Path) -> Result<Vec<u8>, PanelLoadError> {
    let file = fs::File::open(path)?;
    let mut zip = ZipArchive::new(file)?;
    if zip.is_empty() {
        return Err(PanelLoadError::EmptyZipArchive {
            path: path.to_path_buf(),
        });
    }

    for idx in 0..zip.len() {
        let mut entry = zip.by_index(idx)?;
        if entry.is_dir() {
            continue;
        }
        if !entry.name().to_ascii_lowercase().ends_with(".csv") {
            continue;
        }

        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        return Ok(buf);
    }

    Err(PanelLoadError::MissingCsvEntry {
        path: path.to_path_buf(),
    })
}

fn clean_header(raw: &str) -> String {
    raw.replace(BOM, "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_trimmed_and_stripped_of_bom() {
        let csv = "\u{feff}id , as_of_month,status\nA1,2024-01,Current\n";
        let table = RawTable::from_csv_reader(csv.as_bytes(), "inline").unwrap();

        assert_eq!(table.headers(), ["id", "as_of_month", "status"]);
        assert_eq!(table.column_index("as_of_month"), Some(1));
        assert_eq!(table.cell(0, 2), Some("Current"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn ragged_rows_are_rejected_as_parse_errors() {
        let csv = "id,as_of_month\nA1,2024-01,extra\n";
        let err = RawTable::from_csv_reader(csv.as_bytes(), "inline").unwrap_err();
        assert!(matches!(err, PanelLoadError::Csv(_)));
        assert_eq!(err.kind(), ErrorKind::Parse);
    }

    #[test]
    fn in_memory_tables_clean_headers_too() {
        let table = RawTable::new([" id"], [["7"]]);
        assert_eq!(table.headers(), ["id"]);
        assert_eq!(table.cell(0, 0), Some("7"));
        assert_eq!(table.cell(1, 0), None);
    }
}
