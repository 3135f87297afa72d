//! Trailing, current-month-inclusive window aggregates over an entity timeline.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::BuildError;
use crate::normalize::EntityTimeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    lengths: Vec<u32>,
}

impl WindowSpec {
    pub fn new(lengths: Vec<u32>) -> Result<Self, BuildError> {
        if lengths.is_empty() {
            return Err(BuildError::InvalidConfig(
                "window spec must contain at least one length".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for length in &lengths {
            if *length == 0 || !seen.insert(*length) {
                return Err(BuildError::InvalidConfig(format!(
                    "window lengths must be positive and unique, got {lengths:?}"
                )));
            }
        }
        Ok(Self { lengths })
    }

    pub fn lengths(&self) -> &[u32] {
        &self.lengths
    }
}

/// Per-record aggregates for one window length, aligned with the timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowFeatures {
    pub window: u32,
    pub event_counts: Vec<u32>,
    pub max_depths: Vec<u32>,
}

/// Fixed-length trailing buffer: event count plus a monotonic deque for the max depth.
#[derive(Debug, Clone)]
pub(crate) struct RollingWindow {
    length: usize,
    flags: VecDeque<bool>,
    event_count: u32,
    max_candidates: VecDeque<(usize, u32)>,
    pushed: usize,
}

impl RollingWindow {
    pub(crate) fn new(length: usize) -> Self {
        let length = length.max(1);
        Self {
            length,
            flags: VecDeque::with_capacity(length),
            event_count: 0,
            max_candidates: VecDeque::new(),
            pushed: 0,
        }
    }

    pub(crate) fn push(&mut self, is_event: bool, depth: u32) {
        self.flags.push_back(is_event);
        if is_event {
            self.event_count += 1;
        }
        if self.flags.len() > self.length && self.flags.pop_front() == Some(true) {
            self.event_count -= 1;
        }

        while self
            .max_candidates
            .back()
            .map(|(_, d)| *d <= depth)
            .unwrap_or(false)
        {
            self.max_candidates.pop_back();
        }
        self.max_candidates.push_back((self.pushed, depth));
        self.pushed += 1;

        let oldest = self.pushed - self.flags.len();
        while self
            .max_candidates
            .front()
            .map(|(idx, _)| *idx < oldest)
            .unwrap_or(false)
        {
            self.max_candidates.pop_front();
        }
    }

    pub(crate) fn event_count(&self) -> u32 {
        self.event_count
    }

    pub(crate) fn non_event_count(&self) -> u32 {
        self.flags.len() as u32 - self.event_count
    }

    pub(crate) fn max_depth(&self) -> u32 {
        self.max_candidates.front().map(|(_, d)| *d).unwrap_or(0)
    }
}

pub fn trailing_window_features(timeline: &EntityTimeline, window: u32) -> WindowFeatures {
    let mut rolling = RollingWindow::new(window as usize);
    let mut event_counts = Vec::with_capacity(timeline.len());
    let mut max_depths = Vec::with_capacity(timeline.len());

    for record in timeline.records() {
        rolling.push(record.is_event(), record.depth());
        event_counts.push(rolling.event_count());
        max_depths.push(rolling.max_depth());
    }

    WindowFeatures {
        window,
        event_counts,
        max_depths,
    }
}

pub fn aggregate_windows(timeline: &EntityTimeline, spec: &WindowSpec) -> Vec<WindowFeatures> {
    spec.lengths()
        .iter()
        .map(|window| trailing_window_features(timeline, *window))
        .collect()
}
