//! Point-in-time monthly delinquency features and forward labels.
//!
//! Pipeline:
//! - panel loading (CSV or zipped CSV) and event normalization per entity
//! - trailing window aggregates, recency and on-time counts
//! - forward labels over a configurable horizon
//! - static attribute left join, assembly, sinks and quality gates

mod assemble;
mod config;
mod error;
mod labels;
mod month;
mod normalize;
mod observability;
mod panel;
mod quality;
mod recency;
mod sink;
mod static_attrs;
mod windows;

pub use assemble::{
    assemble_feature_table, assert_schema_compatible, build_entity_rows, build_feature_schema,
    build_feature_table, count_column_name, max_depth_column_name, on_time_column_name, CellValue,
    FeatureColumn, FeatureDType, FeatureRow, FeatureSchema, FeatureTable, FeatureTableSummary,
    MONTHS_SINCE_COLUMN,
};
pub use config::{
    apply_env_overrides, build_config_from_env, load_build_config, BuildConfig, ColumnMapping,
    ConfigError, EventConfig, GapPolicy, StaticTableConfig, FEATURE_SCHEMA_VERSION,
};
pub use error::{BuildError, ErrorKind};
pub use labels::{forward_labels, LabelSpec, MonthLabel};
pub use month::{MonthParseError, YearMonth};
pub use normalize::{
    canonical_entity_id, normalize_panel, parse_depth, AccountMonthRecord, EntityTimeline,
    EventPredicate, NormalizedPanel,
};
pub use observability::{
    init_logging, log_app_start, log_build_summary, logging_config_from_env, LogFormat,
    LoggingConfig, LoggingInitError,
};
pub use panel::{load_table, PanelLoadError, RawTable};
pub use quality::{
    check_feature_file, check_feature_table, check_written_schema, QualityError, QualityGateSpec,
    QualityReport,
};
pub use recency::{
    materialize_recency, months_since_last_event, on_time_counts, recency_features,
    RecencyFeatures, NO_EVENT_SENTINEL, ON_TIME_LOOKBACK_MONTHS,
};
pub use sink::{
    read_feature_schema, render_feature_csv, schema_sidecar_path, stage_feature_csv, table_digest,
    write_feature_csv, write_feature_sqlite, CsvWriteReport, SinkError, StagedCsv,
};
pub use static_attrs::{
    emp_length_years, interest_rate, join_static_attributes, term_months, JoinStats, StaticTable,
};
pub use windows::{aggregate_windows, trailing_window_features, WindowFeatures, WindowSpec};
