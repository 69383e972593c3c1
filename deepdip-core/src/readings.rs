//! Height telemetry as delivered by the stats source and the local cache.
use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::constants::{JST_OFFSET_SECONDS, JST_TIMESTAMP_FORMAT, SOURCE_TIMESTAMP_FORMAT};

/// One sampled climb height for a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightReading {
    /// Cumulative climb in metres.
    pub height: f64,
    /// Source-local time such as `05/14, 09:41 PM`.
    pub timestamp: String,
}

impl HeightReading {
    #[must_use]
    pub fn new(height: f64, timestamp: impl Into<String>) -> Self {
        Self {
            height,
            timestamp: timestamp.into(),
        }
    }
}

/// Label of a tracked day, e.g. `Day 10`.
///
/// Labels order by their trailing number when they carry one, so `Day 9`
/// sorts before `Day 10`. Labels without a number sort first, by text.
/// Surrounding whitespace is dropped however the label is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DayLabel(pub String);

impl DayLabel {
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(value.trim().to_string())
    }

    /// Trailing day number, if the label ends in digits that fit a `u64`.
    #[must_use]
    pub fn number(&self) -> Option<u64> {
        self.trailing_digits()?.parse().ok()
    }

    /// Trailing digits without leading zeros (`"0"` when all zeros).
    fn trailing_digits(&self) -> Option<&str> {
        let digits_start = self
            .0
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(idx, _)| idx)?;
        let digits = self.0[digits_start..].trim_start_matches('0');
        Some(if digits.is_empty() { "0" } else { digits })
    }

    /// Orders numbers of any length: shorter digit strings are smaller.
    fn number_key(&self) -> Option<(usize, &str)> {
        self.trailing_digits().map(|digits| (digits.len(), digits))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for DayLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number_key()
            .cmp(&other.number_key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for DayLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DayLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DayLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DayLabel {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<DayLabel> for String {
    fn from(label: DayLabel) -> Self {
        label.0
    }
}

/// A player's full history: day label to readings in recording order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlayerHistory {
    #[serde(rename = "dailyData")]
    pub daily: BTreeMap<DayLabel, Vec<HeightReading>>,
}

impl PlayerHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a history from the stats API JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON does not match the `dailyData` shape.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Insert or replace a day.
    pub fn insert_day(&mut self, day: impl Into<DayLabel>, readings: Vec<HeightReading>) {
        self.daily.insert(day.into(), readings);
    }

    /// Fill in days that are missing from this history with days from `local`.
    ///
    /// Days already present are never overwritten. Returns the labels that
    /// were taken from `local`, in day order.
    pub fn merge_local(&mut self, local: Self) -> Vec<DayLabel> {
        let mut filled = Vec::new();
        for (day, readings) in local.daily {
            if self.daily.contains_key(&day) {
                continue;
            }
            filled.push(day.clone());
            self.daily.insert(day, readings);
        }
        filled
    }

    /// Iterate days in day order.
    pub fn days(&self) -> impl Iterator<Item = (&DayLabel, &[HeightReading])> {
        self.daily.iter().map(|(day, readings)| (day, readings.as_slice()))
    }

    #[must_use]
    pub fn reading_count(&self) -> usize {
        self.daily.values().map(Vec::len).sum()
    }
}

/// Raised when a reading carries a timestamp the source format cannot express.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("malformed timestamp {raw:?}: {source}")]
pub struct TimestampError {
    pub raw: String,
    #[source]
    pub source: chrono::ParseError,
}

/// Parse a source timestamp (`%m/%d, %I:%M %p`) pinned to `year`, as UTC.
///
/// # Errors
///
/// Returns [`TimestampError`] when the text does not match the source format
/// or names a date that does not exist in `year`.
pub fn parse_source_timestamp(raw: &str, year: i32) -> Result<DateTime<Utc>, TimestampError> {
    let with_year = format!("{year}/{}", raw.trim());
    let format = format!("%Y/{SOURCE_TIMESTAMP_FORMAT}");
    NaiveDateTime::parse_from_str(&with_year, &format)
        .map(|naive| naive.and_utc())
        .map_err(|source| TimestampError {
            raw: raw.to_string(),
            source,
        })
}

/// Render a UTC instant as Japan Standard Time for diagnostics.
#[must_use]
pub fn to_jst(at: DateTime<Utc>) -> String {
    FixedOffset::east_opt(JST_OFFSET_SECONDS).map_or_else(
        || at.format(JST_TIMESTAMP_FORMAT).to_string(),
        |jst| at.with_timezone(&jst).format(JST_TIMESTAMP_FORMAT).to_string(),
    )
}
