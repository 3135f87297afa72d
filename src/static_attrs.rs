//! Time-invariant entity attributes and their left join onto feature rows.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::assemble::FeatureRow;
use crate::error::BuildError;
use crate::normalize::{canonical_entity_id, require_static_column};
use crate::panel::RawTable;

/// `(source column, derived column)` pairs for origination-time fields.
const ORIGINATION_FIELDS: [(&str, &str); 4] = [
    ("term", "term_months"),
    ("int_rate", "interest_rate"),
    ("emp_length", "emp_length_years"),
    ("fico_range_low", "fico_low"),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticTable {
    columns: Vec<String>,
    rows: HashMap<String, Vec<Option<String>>>,
    duplicate_ids: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct JoinStats {
    pub matched_entities: usize,
    pub unmatched_entities: usize,
}

impl StaticTable {
    /// Keys rows by canonical id; the first row wins for repeated ids.
    pub fn from_raw(
        table: &RawTable,
        id_col: &str,
        derive_origination_fields: bool,
    ) -> Result<Self, BuildError> {
        let id_idx = require_static_column(table, id_col)?;

        let attribute_indices: Vec<usize> = (0..table.headers().len())
            .filter(|idx| *idx != id_idx)
            .collect();
        let mut columns: Vec<String> = attribute_indices
            .iter()
            .map(|idx| table.headers()[*idx].clone())
            .collect();

        let derivations: Vec<(usize, &str)> = if derive_origination_fields {
            ORIGINATION_FIELDS
                .iter()
                .filter(|(_, derived)| table.column_index(derived).is_none())
                .filter_map(|(source, derived)| {
                    table.column_index(source).map(|idx| (idx, *derived))
                })
                .collect()
        } else {
            Vec::new()
        };
        columns.extend(derivations.iter().map(|(_, derived)| derived.to_string()));

        let mut rows = HashMap::with_capacity(table.len());
        let mut duplicate_ids = 0usize;
        for record in table.records() {
            let entity_id = canonical_entity_id(record.get(id_idx).unwrap_or_default());
            if entity_id.is_empty() {
                continue;
            }
            if rows.contains_key(&entity_id) {
                duplicate_ids += 1;
                continue;
            }

            let mut values: Vec<Option<String>> = attribute_indices
                .iter()
                .map(|idx| non_empty(record.get(*idx).unwrap_or_default()))
                .collect();
            for (source_idx, derived) in &derivations {
                let raw = record.get(*source_idx).unwrap_or_default();
                values.push(derive_origination_value(derived, raw));
            }
            rows.insert(entity_id, values);
        }

        if duplicate_ids > 0 {
            warn!(
                component = "static_attrs",
                event = "static.duplicate_ids",
                duplicate_ids,
                id_col
            );
        }

        info!(
            component = "static_attrs",
            event = "static.load.finish",
            entities = rows.len(),
            columns = columns.len(),
            derived_columns = derivations.len()
        );

        Ok(Self {
            columns,
            rows,
            duplicate_ids,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn attributes_for(&self, entity_id: &str) -> Option<&[Option<String>]> {
        self.rows.get(entity_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn duplicate_ids(&self) -> usize {
        self.duplicate_ids
    }
}

/// Left join: unmatched rows get one null per static column; no rows are added or dropped.
pub fn join_static_attributes(rows: &mut [FeatureRow], table: &StaticTable) -> JoinStats {
    let mut stats = JoinStats::default();
    let mut current_entity: Option<String> = None;

    for row in rows.iter_mut() {
        let attributes = table.attributes_for(&row.entity_id);
        if current_entity.as_deref() != Some(row.entity_id.as_str()) {
            if attributes.is_some() {
                stats.matched_entities += 1;
            } else {
                stats.unmatched_entities += 1;
            }
            current_entity = Some(row.entity_id.clone());
        }

        row.static_values = match attributes {
            Some(values) => values.to_vec(),
            None => vec![None; table.columns().len()],
        };
    }

    stats
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn derive_origination_value(derived: &str, raw: &str) -> Option<String> {
    match derived {
        "term_months" => term_months(raw).map(|v| v.to_string()),
        "interest_rate" => interest_rate(raw).map(|v| v.to_string()),
        "emp_length_years" => emp_length_years(raw).map(|v| v.to_string()),
        "fico_low" => numeric(raw).map(format_number),
        _ => None,
    }
}

pub fn term_months(raw: &str) -> Option<u32> {
    leading_digits(raw)
}

/// `"13.5%"` and `"13.5"` both become 0.135; values already at most 1.5 are kept as decimals.
pub fn interest_rate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Some(percent) = trimmed.strip_suffix('%') {
        return percent.trim().parse::<f64>().ok().map(|v| v / 100.0);
    }
    let value = trimmed.parse::<f64>().ok()?;
    Some(if value > 1.5 { value / 100.0 } else { value })
}

pub fn emp_length_years(raw: &str) -> Option<u32> {
    let lowered = raw.trim().to_ascii_lowercase();
    if matches!(lowered.as_str(), "" | "n/a" | "na") {
        return None;
    }
    if lowered.starts_with("10+") {
        return Some(10);
    }
    if lowered.contains('<') {
        return Some(0);
    }
    leading_digits(&lowered)
}

fn leading_digits(raw: &str) -> Option<u32> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

fn numeric(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
