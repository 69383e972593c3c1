//! Matching reading timestamps against archived stream recordings.
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

use crate::constants::{VIDEO_TIMESTAMP_FORMAT, VIDEO_URL_BASE};

const DURATION_PATTERN: &str = r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$";

/// Errors raised while parsing a recording duration such as `1h2m3s`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DurationParseError {
    #[error("recording duration is empty")]
    Empty,
    #[error("recording duration {raw:?} is not of the form 1h2m3s")]
    Malformed { raw: String },
    #[error("recording duration {raw:?} is out of range")]
    Overflow { raw: String },
}

/// Errors raised while resolving a recording window.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VideoError {
    #[error("video {id}: {source}")]
    Duration {
        id: String,
        #[source]
        source: DurationParseError,
    },
    #[error("video {id}: malformed creation time {raw:?}: {source}")]
    CreatedAt {
        id: String,
        raw: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Length of a recording as reported by the video platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamDuration {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl StreamDuration {
    /// Parse `XhYmZs`, where each component is optional but at least one is
    /// present and components appear in h, m, s order.
    ///
    /// # Errors
    ///
    /// Returns [`DurationParseError`] for empty, reordered, signed,
    /// fractional, or otherwise unexpected input.
    pub fn parse(raw: &str) -> Result<Self, DurationParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DurationParseError::Empty);
        }
        let malformed = || DurationParseError::Malformed {
            raw: raw.to_string(),
        };
        let captures = duration_pattern()
            .and_then(|re| re.captures(trimmed))
            .ok_or_else(malformed)?;

        let component = |idx: usize| -> Result<u32, DurationParseError> {
            captures.get(idx).map_or(Ok(0), |m| {
                m.as_str().parse().map_err(|_| DurationParseError::Overflow {
                    raw: raw.to_string(),
                })
            })
        };
        Ok(Self {
            hours: component(1)?,
            minutes: component(2)?,
            seconds: component(3)?,
        })
    }

    #[must_use]
    pub fn as_delta(self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.hours))
            + TimeDelta::minutes(i64::from(self.minutes))
            + TimeDelta::seconds(i64::from(self.seconds))
    }
}

fn duration_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(DURATION_PATTERN).ok())
        .as_ref()
}

/// Archived recording metadata in the video platform's JSON shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: String,
    /// Recording start, `%Y-%m-%dT%H:%M:%SZ`.
    pub created_at: String,
    /// Recording length, e.g. `3h12m5s`.
    pub duration: String,
}

impl VideoRecord {
    /// Inclusive `[start, end]` window covered by the recording.
    ///
    /// # Errors
    ///
    /// Returns [`VideoError`] if the creation time or duration is malformed.
    pub fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), VideoError> {
        let start = NaiveDateTime::parse_from_str(&self.created_at, VIDEO_TIMESTAMP_FORMAT)
            .map_err(|source| VideoError::CreatedAt {
                id: self.id.clone(),
                raw: self.created_at.clone(),
                source,
            })?
            .and_utc();
        let duration = StreamDuration::parse(&self.duration).map_err(|source| {
            VideoError::Duration {
                id: self.id.clone(),
                source,
            }
        })?;
        let end = start
            .checked_add_signed(duration.as_delta())
            .ok_or_else(|| VideoError::Duration {
                id: self.id.clone(),
                source: DurationParseError::Overflow {
                    raw: self.duration.clone(),
                },
            })?;
        Ok((start, end))
    }
}

/// A recording that covers a given instant, with the offset into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMatch {
    pub video_id: String,
    pub offset: TimeDelta,
}

impl VideoMatch {
    /// Link that opens the recording at the matched instant.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{VIDEO_URL_BASE}{}?t={}", self.video_id, OffsetLabel(self.offset))
    }
}

struct OffsetLabel(TimeDelta);

impl fmt::Display for OffsetLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.num_seconds().max(0);
        let hours = total / 3_600;
        let minutes = (total % 3_600) / 60;
        let seconds = total % 60;
        write!(f, "{hours}h{minutes}m{seconds}s")
    }
}

/// Find the first recording whose window contains `at`.
///
/// # Errors
///
/// Returns [`VideoError`] as soon as a recording with malformed metadata is
/// reached; a bad record is never treated as a miss.
pub fn locate_video(
    videos: &[VideoRecord],
    at: DateTime<Utc>,
) -> Result<Option<VideoMatch>, VideoError> {
    for video in videos {
        let (start, end) = video.window()?;
        if start <= at && at <= end {
            return Ok(Some(VideoMatch {
                video_id: video.id.clone(),
                offset: at - start,
            }));
        }
    }
    Ok(None)
}
