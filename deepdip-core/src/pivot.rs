//! Success/fail pivot over the event log.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::events::{AttemptEvent, AttemptResult};
use crate::floors::FloorIndex;

/// Counts for one `(user, floor, on_stream)` group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotRow {
    pub user: String,
    pub floor: FloorIndex,
    pub on_stream: bool,
    pub fail: u64,
    pub success: u64,
}

impl PivotRow {
    /// Grouping key used by downstream sheets, e.g. `BrenTM-4-False`.
    #[must_use]
    pub fn helper(&self) -> String {
        format!(
            "{}-{}-{}",
            self.user,
            self.floor,
            bool_label(self.on_stream)
        )
    }

    #[must_use]
    pub const fn attempts(&self) -> u64 {
        self.fail + self.success
    }
}

/// Render a flag the way the published tables spell it.
#[must_use]
pub const fn bool_label(value: bool) -> &'static str {
    if value { "True" } else { "False" }
}

/// Aggregated attempt counts ordered by user, floor and stream flag.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttemptPivot {
    pub rows: Vec<PivotRow>,
}

impl AttemptPivot {
    #[must_use]
    pub fn from_events(events: &[AttemptEvent]) -> Self {
        let mut groups: BTreeMap<(&str, FloorIndex, bool), (u64, u64)> = BTreeMap::new();
        for event in events {
            let counts = groups
                .entry((event.user.as_str(), event.floor, event.on_stream))
                .or_default();
            match event.result {
                AttemptResult::Fail => counts.0 += 1,
                AttemptResult::Success => counts.1 += 1,
            }
        }

        let rows = groups
            .into_iter()
            .map(|((user, floor, on_stream), (fail, success))| PivotRow {
                user: user.to_string(),
                floor,
                on_stream,
                fail,
                success,
            })
            .collect();
        Self { rows }
    }

    #[must_use]
    pub fn find(&self, user: &str, floor: FloorIndex, on_stream: bool) -> Option<&PivotRow> {
        self.rows
            .iter()
            .find(|row| row.user == user && row.floor == floor && row.on_stream == on_stream)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
