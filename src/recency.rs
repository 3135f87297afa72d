//! Months since the last qualifying event, and the trailing on-time count.

use serde::Serialize;

use crate::normalize::EntityTimeline;
use crate::windows::RollingWindow;

/// Output value for "no qualifying event observed yet".
pub const NO_EVENT_SENTINEL: u32 = 999;

pub const ON_TIME_LOOKBACK_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecencyFeatures {
    /// `None` until the entity's first qualifying event.
    pub months_since_last_event: Vec<Option<u32>>,
    pub on_time_counts: Vec<u32>,
}

pub fn months_since_last_event(timeline: &EntityTimeline) -> Vec<Option<u32>> {
    let mut out = Vec::with_capacity(timeline.len());
    let mut previous: Option<u32> = None;

    for record in timeline.records() {
        let current = if record.is_event() {
            Some(0)
        } else {
            previous.map(|months| months.saturating_add(1))
        };
        out.push(current);
        previous = current;
    }

    out
}

pub fn on_time_counts(timeline: &EntityTimeline, lookback: u32) -> Vec<u32> {
    let mut rolling = RollingWindow::new(lookback as usize);
    timeline
        .records()
        .iter()
        .map(|record| {
            rolling.push(record.is_event(), record.depth());
            rolling.non_event_count()
        })
        .collect()
}

pub fn recency_features(timeline: &EntityTimeline) -> RecencyFeatures {
    RecencyFeatures {
        months_since_last_event: months_since_last_event(timeline),
        on_time_counts: on_time_counts(timeline, ON_TIME_LOOKBACK_MONTHS),
    }
}

pub fn materialize_recency(value: Option<u32>) -> u32 {
    value.unwrap_or(NO_EVENT_SENTINEL)
}
