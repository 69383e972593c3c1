//! Deep Dip Analysis Engine
//!
//! Platform-agnostic floor attempt detection for Deep Dip progress
//! telemetry. This crate turns per-day height readings into success and fall
//! events and aggregates them; fetching data, caching, and export are left to
//! the tools built on top of it.

pub mod constants;
pub mod detector;
pub mod events;
pub mod floors;
pub mod pivot;
pub mod readings;
pub mod video;

use chrono::{DateTime, Utc};
use log::info;

// Re-export commonly used types
pub use constants::NO_FLOOR;
pub use detector::{
    DayFilter, DetectorConfig, DetectorConfigError, EventDetector, PlayerScan, PlayerScanState,
    ScanError, ScanOptions, Transition,
};
pub use events::{AttemptEvent, AttemptResult, FallCounter};
pub use floors::{FloorIndex, FloorMap, FloorMapError};
pub use pivot::{AttemptPivot, PivotRow, bool_label};
pub use readings::{
    DayLabel, HeightReading, PlayerHistory, TimestampError, parse_source_timestamp, to_jst,
};
pub use video::{
    DurationParseError, StreamDuration, VideoError, VideoMatch, VideoRecord, locate_video,
};

/// Trait for abstracting the remote stats service.
/// Tool-specific implementations should provide this
pub trait StatsSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch a player's full day-by-day history.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be retrieved or decoded.
    fn fetch_history(&self, player: &str) -> Result<PlayerHistory, Self::Error>;
}

/// Trait for abstracting previously saved histories.
pub trait LocalCache {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every cached history snapshot for a player.
    ///
    /// # Errors
    ///
    /// Returns an error if a cached snapshot exists but cannot be read.
    fn load_histories(&self, player: &str) -> Result<Vec<PlayerHistory>, Self::Error>;
}

/// Trait for abstracting the recording lookup used to flag on-stream attempts.
pub trait VideoLookup {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Link to the recording of `streamer` that covers `at`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the video platform cannot be queried.
    fn video_url(
        &mut self,
        streamer: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<String>, Self::Error>;
}

/// Errors raised while assembling a player's merged history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError<S, C> {
    #[error("failed to fetch remote history: {0}")]
    Remote(#[source] S),
    #[error("failed to load local cache: {0}")]
    Cache(#[source] C),
}

/// Fetch a player's remote history and fill gaps from the local cache.
///
/// Remote days always win; cached days only fill labels the remote source
/// does not have.
///
/// # Errors
///
/// Returns an error if either the remote fetch or the cache load fails.
pub fn load_merged_history<S, C>(
    source: Option<&S>,
    cache: &C,
    player: &str,
) -> Result<PlayerHistory, HistoryError<S::Error, C::Error>>
where
    S: StatsSource,
    C: LocalCache,
{
    let mut history = match source {
        Some(source) => source.fetch_history(player).map_err(HistoryError::Remote)?,
        None => PlayerHistory::new(),
    };
    for local in cache.load_histories(player).map_err(HistoryError::Cache)? {
        for day in history.merge_local(local) {
            info!("Merged {day} with local cache for {player}");
        }
    }
    Ok(history)
}

/// Adapt a [`VideoLookup`] into the per-transition callback used by
/// [`EventDetector::scan_player`]. Players without a mapped streamer are
/// never on stream.
pub fn stream_links<'a, L>(
    lookup: Option<&'a mut L>,
    streamer: Option<&'a str>,
) -> impl FnMut(DateTime<Utc>) -> Result<Option<String>, L::Error> + 'a
where
    L: VideoLookup,
{
    let mut target = lookup.zip(streamer);
    move |at| match target.as_mut() {
        Some((lookup, streamer)) => lookup.video_url(*streamer, at),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::convert::Infallible;

    struct FixtureSource {
        histories: HashMap<String, PlayerHistory>,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("unknown player {0}")]
    struct UnknownPlayer(String);

    impl StatsSource for FixtureSource {
        type Error = UnknownPlayer;

        fn fetch_history(&self, player: &str) -> Result<PlayerHistory, Self::Error> {
            self.histories
                .get(player)
                .cloned()
                .ok_or_else(|| UnknownPlayer(player.to_string()))
        }
    }

    struct FixtureCache(Vec<PlayerHistory>);

    impl LocalCache for FixtureCache {
        type Error = Infallible;

        fn load_histories(&self, _player: &str) -> Result<Vec<PlayerHistory>, Self::Error> {
            Ok(self.0.clone())
        }
    }

    struct FixedLookup {
        calls: usize,
    }

    impl VideoLookup for FixedLookup {
        type Error = Infallible;

        fn video_url(
            &mut self,
            streamer: &str,
            _at: DateTime<Utc>,
        ) -> Result<Option<String>, Self::Error> {
            self.calls += 1;
            Ok(Some(format!("https://example.invalid/{streamer}")))
        }
    }

    fn history(day: &str, height: f64) -> PlayerHistory {
        let mut history = PlayerHistory::new();
        history.insert_day(day, vec![HeightReading::new(height, "05/10, 09:00 PM")]);
        history
    }

    #[test]
    fn merged_history_prefers_remote_days() {
        let source = FixtureSource {
            histories: HashMap::from([("BrenTM".to_string(), history("Day 10", 400.0))]),
        };
        let cache = FixtureCache(vec![history("Day 10", 12.0), history("Day 9", 30.0)]);

        let merged = load_merged_history(Some(&source), &cache, "BrenTM").unwrap();

        let day10 = &merged.daily[&DayLabel::new("Day 10")];
        assert!((day10[0].height - 400.0).abs() < f64::EPSILON);
        assert!(merged.daily.contains_key(&DayLabel::new("Day 9")));
    }

    #[test]
    fn merged_history_surfaces_remote_errors() {
        let source = FixtureSource {
            histories: HashMap::new(),
        };
        let err = load_merged_history(Some(&source), &FixtureCache(Vec::new()), "ghost")
            .unwrap_err();
        assert!(matches!(err, HistoryError::Remote(_)));
    }

    #[test]
    fn offline_history_comes_from_cache_only() {
        let cache = FixtureCache(vec![history("Day 4", 80.0)]);
        let merged = load_merged_history::<FixtureSource, _>(None, &cache, "Larstm").unwrap();
        assert_eq!(merged.reading_count(), 1);
    }

    #[test]
    fn stream_links_require_a_mapped_streamer() {
        let at = parse_source_timestamp("05/10, 09:00 PM", 2024).unwrap();
        let mut lookup = FixedLookup { calls: 0 };

        {
            let mut unmapped = stream_links(Some(&mut lookup), None);
            assert_eq!(unmapped(at).unwrap(), None);
        }
        {
            let mut mapped = stream_links(Some(&mut lookup), Some("brentm"));
            assert_eq!(
                mapped(at).unwrap().as_deref(),
                Some("https://example.invalid/brentm")
            );
        }
        assert_eq!(lookup.calls, 1);

        let mut disabled = stream_links::<FixedLookup>(None, Some("brentm"));
        assert_eq!(disabled(at).unwrap(), None);
    }
}
