//! Attempt events emitted by the detector and the diagnostic fall tally.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::floors::FloorIndex;
use crate::readings::DayLabel;

/// Outcome of a floor attempt, serialized as the `floor_result` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum AttemptResult {
    /// The player fell from the floor.
    Fail,
    /// The player climbed past the floor.
    Success,
}

impl AttemptResult {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Fail => 0,
            Self::Success => 1,
        }
    }
}

impl From<AttemptResult> for u8 {
    fn from(result: AttemptResult) -> Self {
        result.code()
    }
}

impl TryFrom<u8> for AttemptResult {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Fail),
            1 => Ok(Self::Success),
            other => Err(format!("floor_result must be 0 or 1 (got {other})")),
        }
    }
}

impl fmt::Display for AttemptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fail => write!(f, "fail"),
            Self::Success => write!(f, "success"),
        }
    }
}

/// One detected floor attempt. Events are append-only once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptEvent {
    pub user: String,
    pub day: DayLabel,
    pub floor: FloorIndex,
    #[serde(rename = "floor_result")]
    pub result: AttemptResult,
    /// Raw source timestamp of the reading that confirmed the transition.
    pub timestamp: String,
    pub on_stream: bool,
}

/// Tally of confirmed falls keyed `"{from}-{to}"`.
///
/// Each player scan returns its own counter; the caller merges them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FallCounter {
    counts: BTreeMap<String, u64>,
}

impl FallCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn key(from: FloorIndex, to: FloorIndex) -> String {
        format!("{from}-{to}")
    }

    pub fn record(&mut self, from: FloorIndex, to: FloorIndex) {
        *self.counts.entry(Self::key(from, to)).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &Self) {
        for (key, count) in &other.counts {
            *self.counts.entry(key.clone()).or_insert(0) += count;
        }
    }

    #[must_use]
    pub fn get(&self, from: FloorIndex, to: FloorIndex) -> u64 {
        self.counts.get(&Self::key(from, to)).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Entries in ascending order of occurrence; ties keep key order.
    #[must_use]
    pub fn sorted_by_count(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<_> = self
            .counts
            .iter()
            .map(|(key, &count)| (key.as_str(), count))
            .collect();
        entries.sort_by_key(|&(_, count)| count);
        entries
    }
}
