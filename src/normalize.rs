//! Event normalization: raw monthly rows into per-entity, month-ordered timelines.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BuildConfig, GapPolicy};
use crate::error::BuildError;
use crate::month::YearMonth;
use crate::panel::RawTable;

const NULL_TOKENS: [&str; 6] = ["", "na", "nan", "null", "none", "n/a"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EventPredicate {
    DepthAtLeast(u32),
    StatusIn(BTreeSet<String>),
}

impl EventPredicate {
    pub fn from_statuses<I, S>(statuses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::StatusIn(
            statuses
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .collect(),
        )
    }

    fn matches_depth(&self, depth: u32) -> bool {
        match self {
            Self::DepthAtLeast(threshold) => depth >= *threshold,
            Self::StatusIn(_) => false,
        }
    }

    fn matches_status(&self, status: &str) -> bool {
        match self {
            Self::StatusIn(statuses) => statuses.contains(status.trim()),
            Self::DepthAtLeast(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AccountMonthRecord {
    month: YearMonth,
    depth: u32,
    is_event: bool,
}

impl AccountMonthRecord {
    pub fn new(month: YearMonth, depth: u32, is_event: bool) -> Self {
        Self {
            month,
            depth,
            is_event,
        }
    }

    pub fn month(&self) -> YearMonth {
        self.month
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_event(&self) -> bool {
        self.is_event
    }
}

/// Records of one entity, strictly increasing by month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityTimeline {
    entity_id: String,
    records: Vec<AccountMonthRecord>,
}

impl EntityTimeline {
    pub fn new(
        entity_id: impl Into<String>,
        mut records: Vec<AccountMonthRecord>,
    ) -> Result<Self, BuildError> {
        let entity_id = entity_id.into();
        records.sort_by_key(|r| r.month);
        if let Some(pair) = records.windows(2).find(|pair| pair[0].month == pair[1].month) {
            return Err(BuildError::DuplicateMonth {
                entity_id,
                month: pair[0].month,
            });
        }
        Ok(Self { entity_id, records })
    }

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn records(&self) -> &[AccountMonthRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn months(&self) -> Vec<YearMonth> {
        self.records.iter().map(|r| r.month).collect()
    }

    /// First calendar gap, as `(previous, next)` months.
    pub fn first_gap(&self) -> Option<(YearMonth, YearMonth)> {
        self.records
            .windows(2)
            .find(|pair| pair[0].month.months_until(pair[1].month) > 1)
            .map(|pair| (pair[0].month, pair[1].month))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPanel {
    /// Ordered by canonical entity id.
    pub timelines: Vec<EntityTimeline>,
    pub predicate: EventPredicate,
    pub source_records: usize,
    pub entities_with_gaps: usize,
}

/// Trims whitespace and a BOM, and collapses integral float spellings (`"123.0"`) to `"123"`.
pub fn canonical_entity_id(raw: &str) -> String {
    let trimmed = raw.trim().trim_start_matches('\u{feff}').trim();
    if let Some((int_part, frac)) = trimmed.split_once('.') {
        let digits = int_part.strip_prefix('-').unwrap_or(int_part);
        let integral = !digits.is_empty()
            && digits.bytes().all(|b| b.is_ascii_digit())
            && !frac.is_empty()
            && frac.bytes().all(|b| b == b'0');
        if integral {
            return int_part.to_string();
        }
    }
    trimmed.to_string()
}

/// Empty and null-like cells read as 0; fractional values truncate toward zero.
pub fn parse_depth(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if NULL_TOKENS.contains(&trimmed.to_ascii_lowercase().as_str()) {
        return Some(0);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() || value < 0.0 || value >= f64::from(u32::MAX) {
        return None;
    }
    Some(value.trunc() as u32)
}

pub fn normalize_panel(table: &RawTable, cfg: &BuildConfig) -> Result<NormalizedPanel, BuildError> {
    let mapping = &cfg.monthly;
    let id_idx = require_column(table, "monthly", &mapping.id_col)?;
    let month_idx = require_column(table, "monthly", &mapping.month_col)?;

    let depth_idx = table.column_index(&mapping.dpd_col);
    let status_idx = table.column_index(&mapping.status_col);
    let predicate = match (depth_idx, status_idx) {
        (Some(_), _) => EventPredicate::DepthAtLeast(cfg.event.depth_threshold),
        (None, Some(_)) => {
            if cfg.event.delinquent_statuses.is_empty() {
                return Err(BuildError::InvalidConfig(
                    "event.delinquent_statuses must not be empty for a status-only panel"
                        .to_string(),
                ));
            }
            EventPredicate::from_statuses(&cfg.event.delinquent_statuses)
        }
        (None, None) => {
            return Err(BuildError::MissingEventColumn {
                depth_col: mapping.dpd_col.clone(),
                status_col: mapping.status_col.clone(),
                found: table.headers().to_vec(),
            })
        }
    };

    info!(
        component = "normalize",
        event = "normalize.start",
        records = table.len(),
        id_col = %mapping.id_col,
        month_col = %mapping.month_col,
        predicate = ?predicate
    );

    let mut grouped: BTreeMap<String, Vec<AccountMonthRecord>> = BTreeMap::new();
    for (idx, record) in table.records().enumerate() {
        let record_no = idx + 1;
        let raw_id = record.get(id_idx).unwrap_or_default();
        let entity_id = canonical_entity_id(raw_id);
        if entity_id.is_empty() {
            return Err(BuildError::EmptyEntityId {
                column: mapping.id_col.clone(),
                record: record_no,
            });
        }

        let raw_month = record.get(month_idx).unwrap_or_default();
        let month = YearMonth::parse(raw_month).map_err(|_| BuildError::InvalidMonth {
            column: mapping.month_col.clone(),
            record: record_no,
            entity_id: entity_id.clone(),
            value: raw_month.to_string(),
        })?;

        let (depth, is_event) = match depth_idx {
            Some(col) => {
                let raw_depth = record.get(col).unwrap_or_default();
                let depth = parse_depth(raw_depth).ok_or_else(|| BuildError::InvalidDepth {
                    column: mapping.dpd_col.clone(),
                    record: record_no,
                    entity_id: entity_id.clone(),
                    value: raw_depth.to_string(),
                })?;
                (depth, predicate.matches_depth(depth))
            }
            None => {
                let status = status_idx
                    .and_then(|col| record.get(col))
                    .unwrap_or_default();
                (0, predicate.matches_status(status))
            }
        };

        grouped
            .entry(entity_id)
            .or_default()
            .push(AccountMonthRecord::new(month, depth, is_event));
    }

    let mut timelines = Vec::with_capacity(grouped.len());
    let mut entities_with_gaps = 0usize;
    for (entity_id, records) in grouped {
        let timeline = EntityTimeline::new(entity_id, records)?;
        if let Some((previous, next)) = timeline.first_gap() {
            let missing_months = previous.months_until(next) - 1;
            match cfg.gap_policy {
                GapPolicy::Strict => {
                    return Err(BuildError::MonthGap {
                        entity_id: timeline.entity_id().to_string(),
                        previous,
                        next,
                        missing_months,
                    })
                }
                GapPolicy::ReportAndContinue => {
                    debug!(
                        component = "normalize",
                        event = "normalize.gap_detected",
                        entity_id = timeline.entity_id(),
                        previous = %previous,
                        next = %next,
                        missing_months
                    );
                    entities_with_gaps += 1;
                }
            }
        }
        timelines.push(timeline);
    }

    if entities_with_gaps > 0 {
        warn!(
            component = "normalize",
            event = "normalize.gaps_reported",
            entities_with_gaps,
            entities = timelines.len()
        );
    }

    info!(
        component = "normalize",
        event = "normalize.finish",
        records = table.len(),
        entities = timelines.len(),
        entities_with_gaps
    );

    Ok(NormalizedPanel {
        timelines,
        predicate,
        source_records: table.len(),
        entities_with_gaps,
    })
}

fn require_column(table: &RawTable, table_name: &'static str, column: &str) -> Result<usize, BuildError> {
    table
        .column_index(column)
        .ok_or_else(|| BuildError::MissingColumn {
            table: table_name,
            column: column.to_string(),
            found: table.headers().to_vec(),
        })
}

pub(crate) fn require_static_column(table: &RawTable, column: &str) -> Result<usize, BuildError> {
    require_column(table, "static", column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn ym(raw: &str) -> YearMonth {
        YearMonth::parse(raw).unwrap()
    }

    #[test]
    fn entity_ids_are_canonicalized_across_numeric_spellings() {
        assert_eq!(canonical_entity_id(" 123.0 "), "123");
        assert_eq!(canonical_entity_id("123"), "123");
        assert_eq!(canonical_entity_id("-7.00"), "-7");
        assert_eq!(canonical_entity_id("00123"), "00123");
        assert_eq!(canonical_entity_id("12.5"), "12.5");
        assert_eq!(canonical_entity_id("LC_0001"), "LC_0001");
    }

    #[test]
    fn depth_parsing_defaults_nulls_and_truncates() {
        assert_eq!(parse_depth(""), Some(0));
        assert_eq!(parse_depth("NaN"), Some(0));
        assert_eq!(parse_depth("35.0"), Some(35));
        assert_eq!(parse_depth("29.9"), Some(29));
        assert_eq!(parse_depth("abc"), None);
        assert_eq!(parse_depth("-5"), None);
    }

    #[test]
    fn rows_are_grouped_by_entity_and_sorted_by_month() {
        let table = RawTable::new(
            ["as_of_month", "id", "days_past_due"],
            [
                ["2024-03", "B", "0"],
                ["2024-02", "A", "45"],
                ["2024-01", "A", ""],
                ["2024-01", "B", "30"],
            ],
        );

        let panel = normalize_panel(&table, &BuildConfig::default()).unwrap();
        assert_eq!(panel.predicate, EventPredicate::DepthAtLeast(30));
        assert_eq!(panel.timelines.len(), 2);
        assert_eq!(panel.timelines[0].entity_id(), "A");
        assert_eq!(panel.timelines[0].months(), vec![ym("2024-01"), ym("2024-02")]);
        assert!(!panel.timelines[0].records()[0].is_event());
        assert!(panel.timelines[0].records()[1].is_event());
        assert_eq!(panel.timelines[1].entity_id(), "B");
        assert!(panel.timelines[1].records()[0].is_event());
        assert_eq!(panel.entities_with_gaps, 1);
    }

    #[test]
    fn status_panels_use_membership_and_zero_depth() {
        let table = RawTable::new(
            ["id", "as_of_month", "status"],
            [
                ["A", "2024-01", "Current"],
                ["A", "2024-02", " Charged Off "],
            ],
        );

        let panel = normalize_panel(&table, &BuildConfig::default()).unwrap();
        let records = panel.timelines[0].records();
        assert!(!records[0].is_event());
        assert!(records[1].is_event());
        assert_eq!(records[1].depth(), 0);
    }

    #[test]
    fn missing_columns_are_configuration_errors_naming_the_column() {
        let table = RawTable::new(["id", "days_past_due"], [["A", "0"]]);
        let err = normalize_panel(&table, &BuildConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(matches!(err, BuildError::MissingColumn { ref column, .. } if column == "as_of_month"));

        let table = RawTable::new(["id", "as_of_month"], [["A", "2024-01"]]);
        let err = normalize_panel(&table, &BuildConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::MissingEventColumn { .. }));
    }

    #[test]
    fn malformed_month_and_depth_report_the_offending_value() {
        let table = RawTable::new(
            ["id", "as_of_month", "days_past_due"],
            [["A", "2024-01", "0"], ["A", "24M1", "0"]],
        );
        let err = normalize_panel(&table, &BuildConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Parse);
        match err {
            BuildError::InvalidMonth {
                record,
                entity_id,
                value,
                ..
            } => {
                assert_eq!(record, 2);
                assert_eq!(entity_id, "A");
                assert_eq!(value, "24M1");
            }
            other => panic!("unexpected error: {other}"),
        }

        let table = RawTable::new(
            ["id", "as_of_month", "days_past_due"],
            [["A", "2024-01", "late"]],
        );
        let err = normalize_panel(&table, &BuildConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidDepth { ref value, .. } if value == "late"));
    }

    #[test]
    fn duplicate_months_are_rejected() {
        let table = RawTable::new(
            ["id", "as_of_month", "days_past_due"],
            [["7", "2024-01", "0"], ["7.0", "2024-01-31", "0"]],
        );
        let err = normalize_panel(&table, &BuildConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::DuplicateMonth { ref entity_id, .. } if entity_id == "7"));
    }

    #[test]
    fn strict_gap_policy_rejects_calendar_gaps() {
        let table = RawTable::new(
            ["id", "as_of_month", "days_past_due"],
            [["A", "2024-01", "0"], ["A", "2024-04", "0"]],
        );
        let cfg = BuildConfig {
            gap_policy: GapPolicy::Strict,
            ..BuildConfig::default()
        };
        match normalize_panel(&table, &cfg).unwrap_err() {
            BuildError::MonthGap {
                entity_id,
                previous,
                next,
                missing_months,
            } => {
                assert_eq!(entity_id, "A");
                assert_eq!(previous, ym("2024-01"));
                assert_eq!(next, ym("2024-04"));
                assert_eq!(missing_months, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
