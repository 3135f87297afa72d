//! Forward labels: did a qualifying event occur in the next `horizon` calendar months.

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::month::YearMonth;
use crate::normalize::EntityTimeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    horizon_months: u32,
}

impl LabelSpec {
    pub fn new(horizon_months: u32) -> Result<Self, BuildError> {
        if horizon_months == 0 {
            return Err(BuildError::InvalidConfig(
                "label horizon must be > 0".to_string(),
            ));
        }
        Ok(Self { horizon_months })
    }

    pub fn horizon_months(&self) -> u32 {
        self.horizon_months
    }

    pub fn column_name(&self) -> String {
        format!("label_next_{}m", self.horizon_months)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthLabel {
    pub month: YearMonth,
    pub label: u8,
}

/// Scans backwards tracking the month of the nearest later event; the current record never
/// labels itself and events more than `horizon` calendar months ahead never count.
pub fn forward_labels(timeline: &EntityTimeline, spec: &LabelSpec) -> Vec<MonthLabel> {
    let horizon = i64::from(spec.horizon_months);
    let mut labels = Vec::with_capacity(timeline.len());
    let mut next_event: Option<YearMonth> = None;

    for record in timeline.records().iter().rev() {
        let label = match next_event {
            Some(event_month) => {
                let ahead = record.month().months_until(event_month);
                u8::from((1..=horizon).contains(&ahead))
            }
            None => 0,
        };
        labels.push(MonthLabel {
            month: record.month(),
            label,
        });
        if record.is_event() {
            next_event = Some(record.month());
        }
    }

    labels.reverse();
    labels
}
