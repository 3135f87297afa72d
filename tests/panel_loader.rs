use std::fs;
use std::io::Write;
use std::path::Path;

use pitfeat::{build_feature_table, load_table, BuildConfig, BuildError, ErrorKind, PanelLoadError};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

const PANEL_CSV: &str = "\u{feff}id, as_of_month ,days_past_due\n\
L1,2024-01,0\n\
L1,2024-02,31.0\n\
L2,202401,\n";

fn write_zip(path: &Path, entries: &[(&str, &str)]) {
    let file = fs::File::create(path).expect("zip file should be created");
    let mut zip = zip::ZipWriter::new(file);
    for (name, body) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("zip entry should be created");
        zip.write_all(body.as_bytes())
            .expect("zip data should be written");
    }
    zip.finish().expect("zip should finalize");
}

#[test]
fn csv_panel_loads_with_clean_headers() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("panel.csv");
    fs::write(&path, PANEL_CSV).expect("panel should be written");

    let table = load_table(&path).expect("csv panel should load");
    assert_eq!(table.headers(), ["id", "as_of_month", "days_past_due"]);
    assert_eq!(table.len(), 3);

    let features = build_feature_table(&table, None, &BuildConfig::default())
        .expect("loaded panel should build");
    assert_eq!(features.rows.len(), 3);
    assert_eq!(features.rows[1].max_depths, vec![31, 31, 31]);
    assert_eq!(features.rows[2].entity_id, "L2");
    assert_eq!(features.rows[2].month.to_string(), "2024-01");
}

#[test]
fn zip_archive_reads_the_first_csv_entry() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("panel.zip");
    write_zip(
        &path,
        &[
            ("README.txt", "not a table"),
            ("monthly/panel.csv", PANEL_CSV),
            ("other.csv", "id\nignored\n"),
        ],
    );

    let table = load_table(&path).expect("zipped panel should load");
    assert_eq!(table.headers(), ["id", "as_of_month", "days_past_due"]);
    assert_eq!(table.len(), 3);
}

#[test]
fn zip_archive_without_csv_entry_is_an_io_error() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("panel.zip");
    write_zip(&path, &[("notes.txt", "nothing here")]);

    let err = load_table(&path).expect_err("archive without csv should fail");
    assert!(matches!(err, PanelLoadError::MissingCsvEntry { .. }));
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn missing_file_surfaces_through_build_errors() {
    let temp = tempdir().expect("temp dir should be created");
    let err: BuildError = load_table(&temp.path().join("absent.csv"))
        .expect_err("missing file should fail")
        .into();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test]
fn malformed_depth_in_a_loaded_panel_aborts_the_build() {
    let temp = tempdir().expect("temp dir should be created");
    let path = temp.path().join("panel.csv");
    fs::write(&path, "id,as_of_month,days_past_due\nL1,2024-01,thirty\n")
        .expect("panel should be written");

    let table = load_table(&path).expect("csv panel should load");
    let err = build_feature_table(&table, None, &BuildConfig::default())
        .expect_err("non-numeric depth should fail");
    assert_eq!(err.kind(), ErrorKind::Parse);
    assert!(matches!(err, BuildError::InvalidDepth { ref entity_id, .. } if entity_id == "L1"));
}
