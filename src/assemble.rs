//! Dataset assembly: per-entity feature and label passes, merge, static join, schema and summary.

use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::{BuildConfig, FEATURE_SCHEMA_VERSION};
use crate::error::BuildError;
use crate::labels::{forward_labels, LabelSpec, MonthLabel};
use crate::month::YearMonth;
use crate::normalize::{normalize_panel, EntityTimeline, NormalizedPanel};
use crate::panel::RawTable;
use crate::recency::{materialize_recency, recency_features, ON_TIME_LOOKBACK_MONTHS};
use crate::static_attrs::{join_static_attributes, JoinStats, StaticTable};
use crate::windows::{aggregate_windows, WindowSpec};

pub const MONTHS_SINCE_COLUMN: &str = "months_since_last_30p";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureDType {
    Int,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureRow {
    pub entity_id: String,
    pub month: YearMonth,
    /// Aligned with the configured window order.
    pub event_counts: Vec<u32>,
    pub max_depths: Vec<u32>,
    pub months_since_last_event: Option<u32>,
    pub on_time_count_6m: u32,
    pub label: u8,
    /// Aligned with the static table's columns; empty when no static table is joined.
    pub static_values: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Int(i64),
    Text(String),
    Null,
}

impl FeatureRow {
    /// Cells in schema order; the recency sentinel is materialized here.
    pub fn cells(&self) -> Vec<CellValue> {
        let mut cells = Vec::with_capacity(
            5 + self.event_counts.len() + self.max_depths.len() + self.static_values.len(),
        );
        cells.push(CellValue::Text(self.entity_id.clone()));
        cells.push(CellValue::Text(self.month.to_string()));
        cells.extend(self.event_counts.iter().map(|v| CellValue::Int(i64::from(*v))));
        cells.extend(self.max_depths.iter().map(|v| CellValue::Int(i64::from(*v))));
        cells.push(CellValue::Int(i64::from(materialize_recency(
            self.months_since_last_event,
        ))));
        cells.push(CellValue::Int(i64::from(self.on_time_count_6m)));
        cells.push(CellValue::Int(i64::from(self.label)));
        cells.extend(self.static_values.iter().map(|v| match v {
            Some(text) => CellValue::Text(text.clone()),
            None => CellValue::Null,
        }));
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTableSummary {
    pub rows: usize,
    pub columns: usize,
    pub entities: usize,
    pub positive_labels: usize,
    pub label_rate: f64,
    pub entities_with_gaps: usize,
    pub static_matched_entities: usize,
    pub static_unmatched_entities: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    pub schema: FeatureSchema,
    pub rows: Vec<FeatureRow>,
    pub summary: FeatureTableSummary,
}

pub fn count_column_name(window: u32) -> String {
    format!("delinq_30p_count_{window}m")
}

pub fn max_depth_column_name(window: u32) -> String {
    format!("max_dpd_{window}m")
}

pub fn on_time_column_name() -> String {
    format!("on_time_count_{ON_TIME_LOOKBACK_MONTHS}m")
}

pub fn build_feature_schema(cfg: &BuildConfig, static_columns: &[String]) -> FeatureSchema {
    let int_column = |name: String| FeatureColumn {
        name,
        dtype: FeatureDType::Int,
    };

    let mut columns = vec![
        FeatureColumn {
            name: cfg.monthly.id_col.clone(),
            dtype: FeatureDType::Text,
        },
        FeatureColumn {
            name: cfg.monthly.month_col.clone(),
            dtype: FeatureDType::Text,
        },
    ];
    for window in &cfg.windows_months {
        columns.push(int_column(count_column_name(*window)));
    }
    for window in &cfg.windows_months {
        columns.push(int_column(max_depth_column_name(*window)));
    }
    columns.push(int_column(MONTHS_SINCE_COLUMN.to_string()));
    columns.push(int_column(on_time_column_name()));
    columns.push(int_column(format!("label_next_{}m", cfg.horizon_months)));
    for name in static_columns {
        columns.push(FeatureColumn {
            name: name.clone(),
            dtype: FeatureDType::Text,
        });
    }

    let fingerprint = schema_fingerprint(cfg, &columns);

    info!(
        component = "assemble",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        windows = ?cfg.windows_months,
        horizon_months = cfg.horizon_months,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), BuildError> {
    if expected_version != actual.version {
        return Err(BuildError::InvalidConfig(format!(
            "schema version mismatch: expected {expected_version}, got {}",
            actual.version
        )));
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(BuildError::InvalidConfig(format!(
            "schema fingerprint mismatch: expected {expected_fingerprint}, got {}",
            actual.fingerprint
        )));
    }

    Ok(())
}

/// Feature pass and label pass over the same timeline, merged on month.
pub fn build_entity_rows(
    timeline: &EntityTimeline,
    windows: &WindowSpec,
    label_spec: &LabelSpec,
) -> Result<Vec<FeatureRow>, BuildError> {
    let window_features = aggregate_windows(timeline, windows);
    let recency = recency_features(timeline);
    let labels = forward_labels(timeline, label_spec);

    let n = timeline.len();
    let entity_id = timeline.entity_id();
    let lengths_match = window_features
        .iter()
        .all(|w| w.event_counts.len() == n && w.max_depths.len() == n)
        && recency.months_since_last_event.len() == n
        && recency.on_time_counts.len() == n;
    if !lengths_match {
        return Err(BuildError::MergeIntegrity {
            entity_id: entity_id.to_string(),
            detail: format!("feature pass produced misaligned columns for {n} records"),
        });
    }
    check_label_alignment(timeline, &labels)?;

    let rows = timeline
        .records()
        .iter()
        .zip(labels)
        .enumerate()
        .map(|(idx, (record, label))| FeatureRow {
            entity_id: entity_id.to_string(),
            month: record.month(),
            event_counts: window_features.iter().map(|w| w.event_counts[idx]).collect(),
            max_depths: window_features.iter().map(|w| w.max_depths[idx]).collect(),
            months_since_last_event: recency.months_since_last_event[idx],
            on_time_count_6m: recency.on_time_counts[idx],
            label: label.label,
            static_values: Vec::new(),
        })
        .collect();

    Ok(rows)
}

fn check_label_alignment(timeline: &EntityTimeline, labels: &[MonthLabel]) -> Result<(), BuildError> {
    if labels.len() != timeline.len() {
        return Err(BuildError::MergeIntegrity {
            entity_id: timeline.entity_id().to_string(),
            detail: format!(
                "{} feature rows vs {} label rows",
                timeline.len(),
                labels.len()
            ),
        });
    }

    if let Some((record, label)) = timeline
        .records()
        .iter()
        .zip(labels)
        .find(|(record, label)| record.month() != label.month)
    {
        return Err(BuildError::MergeIntegrity {
            entity_id: timeline.entity_id().to_string(),
            detail: format!(
                "feature month {} has no matching label (found {})",
                record.month(),
                label.month
            ),
        });
    }

    Ok(())
}

/// Normalizes the panel, then assembles it with an optional static table.
pub fn build_feature_table(
    monthly: &RawTable,
    static_raw: Option<&RawTable>,
    cfg: &BuildConfig,
) -> Result<FeatureTable, BuildError> {
    cfg.validate()?;

    info!(
        component = "assemble",
        event = "features.build.start",
        monthly_records = monthly.len(),
        static_records = static_raw.map(RawTable::len),
        windows = ?cfg.windows_months,
        horizon_months = cfg.horizon_months,
        gap_policy = ?cfg.gap_policy
    );

    let static_table = static_raw
        .map(|raw| {
            StaticTable::from_raw(
                raw,
                cfg.static_id_col(),
                cfg.static_table.derive_origination_fields,
            )
        })
        .transpose()?;
    let normalized = normalize_panel(monthly, cfg)?;

    assemble_feature_table(normalized, static_table.as_ref(), cfg)
}

pub fn assemble_feature_table(
    normalized: NormalizedPanel,
    static_table: Option<&StaticTable>,
    cfg: &BuildConfig,
) -> Result<FeatureTable, BuildError> {
    cfg.validate()?;
    let windows = WindowSpec::new(cfg.windows_months.clone())?;
    let label_spec = LabelSpec::new(cfg.horizon_months)?;

    let static_columns: Vec<String> = static_table
        .map(|t| t.columns().to_vec())
        .unwrap_or_default();
    let schema = build_feature_schema(cfg, &static_columns);
    check_static_collisions(&schema, static_columns.len())?;

    let mut rows = compute_rows(&normalized.timelines, &windows, &label_spec, cfg.max_threads)?;

    let expected_rows: usize = normalized.timelines.iter().map(EntityTimeline::len).sum();
    if rows.len() != expected_rows {
        return Err(BuildError::MergeIntegrity {
            entity_id: "*".to_string(),
            detail: format!(
                "assembled {} rows from {expected_rows} normalized records",
                rows.len()
            ),
        });
    }

    let join_stats = match static_table {
        Some(table) => join_static_attributes(&mut rows, table),
        None => JoinStats {
            matched_entities: 0,
            unmatched_entities: normalized.timelines.len(),
        },
    };

    let positive_labels = rows.iter().filter(|row| row.label == 1).count();
    let label_rate = if rows.is_empty() {
        0.0
    } else {
        positive_labels as f64 / rows.len() as f64
    };

    let summary = FeatureTableSummary {
        rows: rows.len(),
        columns: schema.columns.len(),
        entities: normalized.timelines.len(),
        positive_labels,
        label_rate,
        entities_with_gaps: normalized.entities_with_gaps,
        static_matched_entities: join_stats.matched_entities,
        static_unmatched_entities: join_stats.unmatched_entities,
    };

    info!(
        component = "assemble",
        event = "features.build.finish",
        rows = summary.rows,
        columns = summary.columns,
        entities = summary.entities,
        positive_labels = summary.positive_labels,
        label_rate = summary.label_rate,
        entities_with_gaps = summary.entities_with_gaps,
        static_matched_entities = summary.static_matched_entities,
        static_unmatched_entities = summary.static_unmatched_entities
    );

    Ok(FeatureTable {
        schema,
        rows,
        summary,
    })
}

fn compute_rows(
    timelines: &[EntityTimeline],
    windows: &WindowSpec,
    label_spec: &LabelSpec,
    max_threads: Option<usize>,
) -> Result<Vec<FeatureRow>, BuildError> {
    let run = || {
        timelines
            .par_iter()
            .map(|timeline| build_entity_rows(timeline, windows, label_spec))
            .collect::<Result<Vec<_>, BuildError>>()
    };

    let per_entity = match max_threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|err| BuildError::InvalidConfig(format!("worker pool: {err}")))?
            .install(run)?,
        None => run()?,
    };

    Ok(per_entity.into_iter().flatten().collect())
}

fn check_static_collisions(schema: &FeatureSchema, static_count: usize) -> Result<(), BuildError> {
    let computed = schema.columns.len() - static_count;
    let mut names: HashSet<&str> = schema.columns[..computed]
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    for column in &schema.columns[computed..] {
        if !names.insert(column.name.as_str()) {
            return Err(BuildError::StaticColumnCollision {
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}

fn schema_fingerprint(cfg: &BuildConfig, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{FEATURE_SCHEMA_VERSION};"));
    hasher.update(format!("horizon_months:{};", cfg.horizon_months));
    hasher.update("windows:");
    for window in &cfg.windows_months {
        hasher.update(format!("{window},"));
    }
    hasher.update(";columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        match column.dtype {
            FeatureDType::Int => hasher.update(":int;"),
            FeatureDType::Text => hasher.update(":text;"),
        }
    }
    hex::encode(hasher.finalize())
}
