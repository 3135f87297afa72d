use std::io;
use std::io::Write;
use std::sync::{Arc, Mutex};

use pitfeat::{
    build_feature_table, log_app_start, log_build_summary, write_feature_csv, BuildConfig,
    GapPolicy, LoggingConfig, RawTable,
};
use tempfile::tempdir;
use tracing::dispatcher::with_default;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriter;

#[derive(Clone, Default)]
struct SharedWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedWriter {
    fn output_string(&self) -> String {
        let bytes = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        String::from_utf8_lossy(&bytes).to_string()
    }
}

struct SharedWriterGuard {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl<'a> MakeWriter<'a> for SharedWriter {
    type Writer = SharedWriterGuard;

    fn make_writer(&'a self) -> Self::Writer {
        SharedWriterGuard {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Write for SharedWriterGuard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .inner
            .lock()
            .expect("writer lock should not be poisoned");
        out.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs(max_level: Level, f: impl FnOnce()) -> String {
    let writer = SharedWriter::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_ansi(false)
        .with_max_level(max_level)
        .with_writer(writer.clone())
        .finish();
    let dispatch = tracing::Dispatch::new(subscriber);

    with_default(&dispatch, f);
    writer.output_string()
}

fn gapped_panel() -> RawTable {
    RawTable::new(
        ["id", "as_of_month", "days_past_due"],
        [
            ["A", "2024-01", "0"],
            ["A", "2024-04", "30"],
            ["B", "2024-01", "0"],
        ],
    )
}

#[test]
fn build_emits_start_finish_and_gap_events() {
    let logs = capture_logs(Level::INFO, || {
        let table = build_feature_table(&gapped_panel(), None, &BuildConfig::default())
            .expect("report-and-continue build should succeed");
        assert_eq!(table.summary.entities_with_gaps, 1);
    });

    assert!(logs.contains("\"event\":\"features.build.start\""));
    assert!(logs.contains("\"event\":\"normalize.gaps_reported\""));
    assert!(logs.contains("\"event\":\"features.schema.built\""));
    assert!(logs.contains("\"event\":\"features.build.finish\""));
    assert!(!logs.contains("\"event\":\"normalize.gap_detected\""));
}

#[test]
fn per_entity_gap_events_are_debug_only() {
    let logs = capture_logs(Level::DEBUG, || {
        build_feature_table(&gapped_panel(), None, &BuildConfig::default())
            .expect("report-and-continue build should succeed");
    });

    assert!(logs.contains("\"event\":\"normalize.gap_detected\""));
    assert!(logs.contains("\"entity_id\":\"A\""));
}

#[test]
fn strict_gap_failure_does_not_log_a_finished_build() {
    let cfg = BuildConfig {
        gap_policy: GapPolicy::Strict,
        ..BuildConfig::default()
    };
    let logs = capture_logs(Level::INFO, || {
        build_feature_table(&gapped_panel(), Some(&RawTable::new(["id"], [["A"]])), &cfg)
            .expect_err("strict policy should reject the gap");
    });

    assert!(logs.contains("\"event\":\"features.build.start\""));
    assert!(logs.contains("\"event\":\"static.load.finish\""));
    assert!(!logs.contains("\"event\":\"features.build.finish\""));
}

#[test]
fn duplicate_static_ids_are_warned_about() {
    let statics = RawTable::new(["id", "grade"], [["A", "B"], ["A", "C"]]);
    let logs = capture_logs(Level::WARN, || {
        let table = build_feature_table(&gapped_panel(), Some(&statics), &BuildConfig::default())
            .expect("duplicates keep the first row");
        assert_eq!(table.rows[0].static_values, vec![Some("B".to_string())]);
    });

    assert!(logs.contains("\"event\":\"static.duplicate_ids\""));
    assert!(!logs.contains("\"event\":\"features.build.finish\""));
}

#[test]
fn binary_lifecycle_helpers_and_sink_emit_baseline_events() {
    let temp = tempdir().expect("temp dir should be created");
    let logs = capture_logs(Level::INFO, || {
        let cfg = BuildConfig::default();
        log_app_start("build_features", &LoggingConfig::default(), &cfg);
        let table = build_feature_table(&gapped_panel(), None, &cfg).expect("build succeeds");
        write_feature_csv(&table, &temp.path().join("features.csv")).expect("csv written");
        log_build_summary("build_features", &table.summary);
    });

    assert!(logs.contains("\"event\":\"app.start\""));
    assert!(logs.contains("\"event\":\"sink.csv.written\""));
    assert!(logs.contains("\"event\":\"app.summary\""));
    assert!(logs.contains("\"component\":\"build_features\""));
}
