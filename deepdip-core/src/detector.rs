//! Floor attempt detection over a player's height telemetry.
//!
//! The detector turns a noisy, day-ordered height signal into discrete
//! ascent and fall events. A reading that crosses a floor boundary is only
//! trusted once the crossing has persisted for more than a configured number
//! of readings, which rejects single-sample jitter around the thresholds.
//!
//! Scan state is an explicit value owned by the caller ([`PlayerScanState`]),
//! so nothing leaks between players. State carries over from one day to the
//! next; it is reset only when a day opens with a height under the
//! session-reset sentinel, which is how a fresh climb from the bottom shows up
//! in the data.
use chrono::{DateTime, Datelike, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use thiserror::Error;

use crate::constants::{
    CREDITABLE_FLOOR_JUMP, DEFAULT_DAY_RESET_HEIGHT, DEFAULT_FALL_STEP_THRESHOLD,
    DEFAULT_PARTIAL_COMPLETION, DEFAULT_STEP_THRESHOLD, FALL_LOG_MIN_FLOOR, MIN_ASCENT_FLOOR,
    NO_FLOOR,
};
use crate::events::{AttemptEvent, AttemptResult, FallCounter};
use crate::floors::{FloorIndex, FloorMap};
use crate::readings::{DayLabel, PlayerHistory, TimestampError, parse_source_timestamp, to_jst};

/// Noise gates and crediting rules for the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Readings that must pass since the last ascent before another is trusted.
    #[serde(default = "DetectorConfig::default_step_threshold")]
    pub step_threshold: u32,
    /// Consecutive readings below the current floor needed to confirm a fall.
    #[serde(default = "DetectorConfig::default_fall_step_threshold")]
    pub fall_step_threshold: u32,
    /// A day whose first reading is below this height starts a new session.
    #[serde(default = "DetectorConfig::default_day_reset_height")]
    pub day_reset_height: f64,
    /// Credit single-floor climbs as full successes.
    #[serde(default = "DetectorConfig::default_partial_completion")]
    pub partial_completion: bool,
}

impl DetectorConfig {
    const fn default_step_threshold() -> u32 {
        DEFAULT_STEP_THRESHOLD
    }

    const fn default_fall_step_threshold() -> u32 {
        DEFAULT_FALL_STEP_THRESHOLD
    }

    const fn default_day_reset_height() -> f64 {
        DEFAULT_DAY_RESET_HEIGHT
    }

    const fn default_partial_completion() -> bool {
        DEFAULT_PARTIAL_COMPLETION
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns an error if the session-reset height is not a finite value.
    pub fn validate(&self) -> Result<(), DetectorConfigError> {
        if !self.day_reset_height.is_finite() {
            return Err(DetectorConfigError::ResetHeight {
                value: self.day_reset_height,
            });
        }
        Ok(())
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            step_threshold: Self::default_step_threshold(),
            fall_step_threshold: Self::default_fall_step_threshold(),
            day_reset_height: Self::default_day_reset_height(),
            partial_completion: Self::default_partial_completion(),
        }
    }
}

/// Errors raised when detector configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum DetectorConfigError {
    #[error("day_reset_height must be finite (got {value})")]
    ResetHeight { value: f64 },
}

/// Per-player streak state threaded through a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerScanState {
    pub prev_height: f64,
    /// Last confirmed floor.
    pub prev_floor: FloorIndex,
    /// Confirmed floor before `prev_floor`.
    pub prev_prev_floor: FloorIndex,
    pub steps_since_up: u32,
    pub steps_since_down: u32,
}

impl PlayerScanState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            prev_height: 0.0,
            prev_floor: NO_FLOOR,
            prev_prev_floor: NO_FLOOR,
            steps_since_up: 0,
            steps_since_down: 0,
        }
    }

    /// Forget the current climb. `prev_prev_floor` is kept.
    pub const fn reset_for_session(&mut self) {
        self.prev_height = 0.0;
        self.prev_floor = NO_FLOOR;
        self.steps_since_up = 0;
        self.steps_since_down = 0;
    }
}

impl Default for PlayerScanState {
    fn default() -> Self {
        Self::new()
    }
}

/// A confirmed floor transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Climbed from `from` to `reached`; the attempt at `reached - 1` succeeded.
    Ascent {
        from: FloorIndex,
        reached: FloorIndex,
        /// Whether the climb is creditable as a full success.
        qualified: bool,
    },
    /// Dropped from `from` down to `to`.
    Fall { from: FloorIndex, to: FloorIndex },
}

impl Transition {
    /// Floor the attempt is recorded against.
    #[must_use]
    pub const fn attempt_floor(&self) -> FloorIndex {
        match *self {
            Self::Ascent { reached, .. } => reached - 1,
            Self::Fall { from, .. } => from,
        }
    }

    /// Result to record, or `None` for an ascent that does not qualify.
    #[must_use]
    pub const fn result(&self) -> Option<AttemptResult> {
        match *self {
            Self::Ascent {
                qualified: true, ..
            } => Some(AttemptResult::Success),
            Self::Ascent {
                qualified: false, ..
            } => None,
            Self::Fall { .. } => Some(AttemptResult::Fail),
        }
    }
}

/// Which days of a history take part in a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayFilter {
    /// Skip every day ordered before this one.
    pub from_day: Option<DayLabel>,
    /// When non-empty, only these days are scanned.
    pub only_days: Vec<DayLabel>,
}

impl DayFilter {
    #[must_use]
    pub fn allows(&self, day: &DayLabel) -> bool {
        if let Some(from) = &self.from_day
            && day < from
        {
            return false;
        }
        self.only_days.is_empty() || self.only_days.contains(day)
    }
}

/// Options that shape a single player scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Year source timestamps are pinned to.
    pub year: i32,
    /// Abort on a malformed timestamp instead of skipping the reading.
    pub strict_timestamps: bool,
    pub days: DayFilter,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            year: Utc::now().year(),
            strict_timestamps: false,
            days: DayFilter::default(),
        }
    }
}

/// Everything one player scan produced.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlayerScan {
    pub user: String,
    pub events: Vec<AttemptEvent>,
    pub falls: FallCounter,
    pub days_scanned: usize,
    /// Readings dropped because their timestamp did not parse.
    pub skipped_readings: usize,
    /// Ascents that advanced state without a creditable result.
    pub unqualified_ascents: usize,
}

impl PlayerScan {
    #[must_use]
    pub fn count(&self, result: AttemptResult) -> usize {
        self.events.iter().filter(|e| e.result == result).count()
    }
}

/// Errors that abort a player scan.
#[derive(Debug, Error)]
pub enum ScanError<E> {
    #[error("player {user}: {source}")]
    Timestamp {
        user: String,
        #[source]
        source: TimestampError,
    },
    #[error("player {user}: stream lookup failed: {source}")]
    Enrichment {
        user: String,
        #[source]
        source: E,
    },
}

/// Stateless transition classifier; all mutable state lives in
/// [`PlayerScanState`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EventDetector {
    floors: FloorMap,
    config: DetectorConfig,
}

impl EventDetector {
    /// Create a detector over `floors`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(floors: FloorMap, config: DetectorConfig) -> Result<Self, DetectorConfigError> {
        config.validate()?;
        Ok(Self { floors, config })
    }

    #[must_use]
    pub const fn floors(&self) -> &FloorMap {
        &self.floors
    }

    #[must_use]
    pub const fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Apply the session-reset rule for the first reading of a day.
    /// Returns `true` when the state was reset.
    pub fn begin_day(&self, state: &mut PlayerScanState, first_height: f64) -> bool {
        if first_height < self.config.day_reset_height {
            state.reset_for_session();
            true
        } else {
            false
        }
    }

    /// Advance `state` by one reading and report a confirmed transition.
    pub fn step(&self, state: &mut PlayerScanState, height: f64) -> Option<Transition> {
        state.steps_since_up = state.steps_since_up.saturating_add(1);

        let prev_step_floor = self.floors.classify(state.prev_height);
        let curr_step_floor = self.floors.classify(height);

        if curr_step_floor != prev_step_floor {
            state.steps_since_down = 0;
        }
        if curr_step_floor < state.prev_floor {
            state.steps_since_down = state.steps_since_down.saturating_add(1);
        }

        let transition = if curr_step_floor > state.prev_floor
            && state.steps_since_up > self.config.step_threshold
            && curr_step_floor >= MIN_ASCENT_FLOOR
        {
            let qualified = self.config.partial_completion
                || state.prev_prev_floor + CREDITABLE_FLOOR_JUMP <= curr_step_floor
                || curr_step_floor <= MIN_ASCENT_FLOOR;
            let from = state.prev_floor;
            state.steps_since_up = 0;
            state.steps_since_down = 0;
            state.prev_prev_floor = state.prev_floor;
            state.prev_floor = curr_step_floor;
            Some(Transition::Ascent {
                from,
                reached: curr_step_floor,
                qualified,
            })
        } else if curr_step_floor < state.prev_floor
            && state.steps_since_down > self.config.fall_step_threshold
        {
            let from = state.prev_floor;
            state.steps_since_down = 0;
            state.prev_prev_floor = state.prev_floor;
            state.prev_floor = curr_step_floor;
            Some(Transition::Fall {
                from,
                to: curr_step_floor,
            })
        } else {
            None
        };

        state.prev_height = height;
        transition
    }

    /// Scan a player's history without stream enrichment.
    ///
    /// # Errors
    ///
    /// Returns an error only for malformed timestamps in strict mode.
    pub fn scan_offline(
        &self,
        user: &str,
        history: &PlayerHistory,
        options: &ScanOptions,
    ) -> Result<PlayerScan, ScanError<Infallible>> {
        self.scan_player(user, history, options, |_| Ok(None))
    }

    /// Scan a player's full history in day order.
    ///
    /// `video_url` is asked for the recording covering each transition that
    /// produces an event; `Some` marks the event as on stream.
    ///
    /// # Errors
    ///
    /// Returns an error if `video_url` fails, or if a timestamp is malformed
    /// and `options.strict_timestamps` is set. No partial result is returned.
    pub fn scan_player<F, E>(
        &self,
        user: &str,
        history: &PlayerHistory,
        options: &ScanOptions,
        mut video_url: F,
    ) -> Result<PlayerScan, ScanError<E>>
    where
        F: FnMut(DateTime<Utc>) -> Result<Option<String>, E>,
    {
        let mut scan = PlayerScan {
            user: user.to_string(),
            ..PlayerScan::default()
        };
        let mut state = PlayerScanState::new();

        for (day, readings) in history.days() {
            if !options.days.allows(day) {
                info!("[{user}] Skipping {day}");
                continue;
            }
            info!("[{user}] =========={day}==========");
            scan.days_scanned += 1;

            let mut session_checked = false;
            for reading in readings {
                let at = match parse_source_timestamp(&reading.timestamp, options.year) {
                    Ok(at) => at,
                    Err(source) if options.strict_timestamps => {
                        return Err(ScanError::Timestamp {
                            user: user.to_string(),
                            source,
                        });
                    }
                    Err(err) => {
                        warn!("[{user}] {day}: skipping reading at {:.1}m: {err}", reading.height);
                        scan.skipped_readings += 1;
                        continue;
                    }
                };

                // The day's first usable reading decides whether a new session starts.
                if !session_checked {
                    session_checked = true;
                    if self.begin_day(&mut state, reading.height) {
                        debug!("[{user}] {day} opens at {:.1}m, new session", reading.height);
                    }
                }

                let Some(transition) = self.step(&mut state, reading.height) else {
                    continue;
                };

                let result = transition.result();
                let url = if result.is_some() {
                    video_url(at).map_err(|source| ScanError::Enrichment {
                        user: user.to_string(),
                        source,
                    })?
                } else {
                    None
                };
                let link = url.as_deref().unwrap_or("-");

                match transition {
                    Transition::Ascent {
                        from,
                        reached,
                        qualified,
                    } => {
                        info!(
                            "[{user}] Reached floor {reached} from {from} {} {link} (qualified: {qualified})",
                            reading.timestamp
                        );
                    }
                    Transition::Fall { from, to } => {
                        scan.falls.record(from, to);
                        if from > FALL_LOG_MIN_FLOOR {
                            info!(
                                "[{user}] Fall detected at floor {from} to floor {to}, ts:{} ({} JST), new height {:.1}m {link}",
                                reading.timestamp,
                                to_jst(at),
                                reading.height
                            );
                        }
                    }
                }

                let Some(result) = result else {
                    scan.unqualified_ascents += 1;
                    continue;
                };
                scan.events.push(AttemptEvent {
                    user: user.to_string(),
                    day: day.clone(),
                    floor: transition.attempt_floor(),
                    result,
                    timestamp: reading.timestamp.clone(),
                    on_stream: url.is_some(),
                });
            }
        }

        Ok(scan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::HeightReading;

    /// Representative height inside each default floor.
    fn h(floor: FloorIndex) -> f64 {
        match floor {
            NO_FLOOR => 0.0,
            0 => 50.0,
            1 => 150.0,
            2 => 260.0,
            3 => 350.0,
            4 => 470.0,
            5 => 550.0,
            9 => 1_000.0,
            other => panic!("no fixture height for floor {other}"),
        }
    }

    fn run(detector: &EventDetector, floors: &[FloorIndex]) -> Vec<Option<Transition>> {
        let mut state = PlayerScanState::new();
        floors
            .iter()
            .map(|&floor| detector.step(&mut state, h(floor)))
            .collect()
    }

    fn confirmed(transitions: &[Option<Transition>]) -> Vec<Transition> {
        transitions.iter().flatten().copied().collect()
    }

    #[test]
    fn ascent_fires_once_streak_exceeds_threshold() {
        let detector = EventDetector::default();
        let transitions = run(&detector, &[-1, -1, -1, 1, 1, 1]);
        assert_eq!(
            transitions[3],
            Some(Transition::Ascent {
                from: NO_FLOOR,
                reached: 1,
                qualified: true
            })
        );
        let all = confirmed(&transitions);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].attempt_floor(), 0);
        assert_eq!(all[0].result(), Some(AttemptResult::Success));
    }

    #[test]
    fn early_ascent_waits_for_streak() {
        let detector = EventDetector::default();
        let transitions = run(&detector, &[1, 1, 1, 1]);
        assert_eq!(transitions[0], None);
        assert_eq!(transitions[1], None);
        assert!(matches!(
            transitions[2],
            Some(Transition::Ascent { reached: 1, .. })
        ));
        assert_eq!(transitions[3], None);
    }

    #[test]
    fn fall_needs_sustained_drop() {
        let detector = EventDetector::default();
        let transitions = run(&detector, &[5, 5, 5, 3, 3, 3, 3]);
        let all = confirmed(&transitions);
        assert_eq!(all.len(), 2);
        assert!(matches!(all[0], Transition::Ascent { reached: 5, .. }));
        assert_eq!(all[1], Transition::Fall { from: 5, to: 3 });
        assert_eq!(transitions[6], Some(Transition::Fall { from: 5, to: 3 }));
        assert_eq!(all[1].attempt_floor(), 5);
        assert_eq!(all[1].result(), Some(AttemptResult::Fail));
    }

    #[test]
    fn fall_streak_restarts_when_drop_changes_floor() {
        let detector = EventDetector::default();
        let transitions = run(&detector, &[5, 5, 5, 3, 3, 2, 2, 2, 2]);
        assert_eq!(transitions[6], None);
        assert_eq!(transitions[7], None);
        assert_eq!(transitions[8], Some(Transition::Fall { from: 5, to: 2 }));
        assert_eq!(confirmed(&transitions).len(), 2);
    }

    #[test]
    fn single_sample_jitter_is_ignored() {
        let detector = EventDetector::default();
        // Confirm floor 1, then one sample pokes into floor 2 and returns.
        let up_jitter = run(&detector, &[-1, -1, -1, 1, 2, 1, 1]);
        assert_eq!(confirmed(&up_jitter).len(), 1);

        // Confirm floor 5, then one sample dips to floor 3 and returns.
        let down_jitter = run(&detector, &[5, 5, 5, 3, 5, 5, 5, 5]);
        let all = confirmed(&down_jitter);
        assert_eq!(all.len(), 1);
        assert!(matches!(all[0], Transition::Ascent { reached: 5, .. }));
    }

    #[test]
    fn ascent_resets_both_streaks() {
        let detector = EventDetector::default();
        let mut state = PlayerScanState {
            prev_height: h(3),
            prev_floor: 2,
            prev_prev_floor: 1,
            steps_since_up: 10,
            steps_since_down: 10,
        };
        let transition = detector.step(&mut state, h(3));
        assert!(matches!(
            transition,
            Some(Transition::Ascent {
                from: 2,
                reached: 3,
                ..
            })
        ));
        assert_eq!(state.steps_since_up, 0);
        assert_eq!(state.steps_since_down, 0);
        assert_eq!(state.prev_prev_floor, 2);
        assert_eq!(state.prev_floor, 3);
    }

    #[test]
    fn climbing_back_after_one_floor_fall_needs_partial_credit() {
        let floors = [5, 5, 5, 4, 4, 4, 4, 5];
        let expected = |qualified| {
            vec![
                Transition::Ascent {
                    from: NO_FLOOR,
                    reached: 5,
                    qualified: true,
                },
                Transition::Fall { from: 5, to: 4 },
                Transition::Ascent {
                    from: 4,
                    reached: 5,
                    qualified,
                },
            ]
        };

        let lenient = EventDetector::default();
        assert_eq!(confirmed(&run(&lenient, &floors)), expected(true));

        let config = DetectorConfig {
            partial_completion: false,
            ..DetectorConfig::default()
        };
        let strict = EventDetector::new(FloorMap::default(), config).unwrap();
        let all = confirmed(&run(&strict, &floors));
        assert_eq!(all, expected(false));
        assert_eq!(all[2].result(), None);
    }

    #[test]
    fn multi_floor_jump_is_always_credited() {
        let config = DetectorConfig {
            partial_completion: false,
            ..DetectorConfig::default()
        };
        let detector = EventDetector::new(FloorMap::default(), config).unwrap();
        let all = confirmed(&run(&detector, &[-1, -1, -1, 2, 2, 2, 3, 3, 3, 4]));
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|t| t.result() == Some(AttemptResult::Success)));
    }

    #[test]
    fn no_floor_never_triggers_ascent() {
        let detector = EventDetector::default();
        let transitions = run(&detector, &[-1, -1, -1, -1, 0, 0, 0, 0]);
        assert!(confirmed(&transitions).is_empty());
    }

    #[test]
    fn session_reset_keeps_prev_prev_floor() {
        let detector = EventDetector::default();
        let mut state = PlayerScanState {
            prev_height: h(9),
            prev_floor: 9,
            prev_prev_floor: 8,
            steps_since_up: 4,
            steps_since_down: 2,
        };
        assert!(!detector.begin_day(&mut state, 950.0));
        assert_eq!(state.prev_floor, 9);
        assert!(detector.begin_day(&mut state, 50.0));
        assert_eq!(state.prev_floor, NO_FLOOR);
        assert_eq!(state.prev_prev_floor, 8);
        assert_eq!(state.steps_since_up, 0);
        assert!(state.prev_height.abs() < f64::EPSILON);
    }

    #[test]
    fn scan_skips_malformed_timestamps_unless_strict() {
        let detector = EventDetector::default();
        let mut history = PlayerHistory::new();
        history.insert_day(
            "Day 30",
            vec![
                HeightReading::new(50.0, "06/01, 07:00 PM"),
                HeightReading::new(50.0, "not a time"),
                HeightReading::new(50.0, "06/01, 07:01 PM"),
            ],
        );
        let options = ScanOptions {
            year: 2024,
            ..ScanOptions::default()
        };
        let scan = detector.scan_offline("Larstm", &history, &options).unwrap();
        assert_eq!(scan.skipped_readings, 1);
        assert_eq!(scan.days_scanned, 1);

        let strict = ScanOptions {
            strict_timestamps: true,
            ..options
        };
        let err = detector.scan_offline("Larstm", &history, &strict).unwrap_err();
        assert!(matches!(err, ScanError::Timestamp { .. }));
    }

    #[test]
    fn session_check_uses_first_parsed_reading() {
        let detector = EventDetector::default();
        let mut history = PlayerHistory::new();
        history.insert_day(
            "Day 30",
            (0..4)
                .map(|minute| HeightReading::new(h(9), format!("06/01, 07:0{minute} PM")))
                .collect(),
        );
        let mut day31 = vec![HeightReading::new(h(9), "garbled")];
        day31.extend((0..8).map(|minute| {
            let floor = if minute < 4 { 0 } else { 1 };
            HeightReading::new(h(floor), format!("06/02, 07:0{minute} PM"))
        }));
        history.insert_day("Day 31", day31);
        let options = ScanOptions {
            year: 2024,
            ..ScanOptions::default()
        };

        let scan = detector.scan_offline("Larstm", &history, &options).unwrap();

        assert_eq!(scan.skipped_readings, 1);
        assert!(scan.falls.is_empty());
        let last = scan.events.last().unwrap();
        assert_eq!(last.day, DayLabel::new("Day 31"));
        assert_eq!(last.floor, 0);
        assert_eq!(last.result, AttemptResult::Success);
    }

    #[test]
    fn uncredited_ascent_skips_stream_lookup() {
        let config = DetectorConfig {
            partial_completion: false,
            ..DetectorConfig::default()
        };
        let detector = EventDetector::new(FloorMap::default(), config).unwrap();
        let mut history = PlayerHistory::new();
        history.insert_day(
            "Day 30",
            [5, 5, 5, 4, 4, 4, 4, 5]
                .iter()
                .enumerate()
                .map(|(minute, &floor)| {
                    HeightReading::new(h(floor), format!("06/01, 07:0{minute} PM"))
                })
                .collect(),
        );
        let options = ScanOptions {
            year: 2024,
            ..ScanOptions::default()
        };

        let mut lookups = 0;
        let scan = detector
            .scan_player("Larstm", &history, &options, |_| {
                lookups += 1;
                if lookups > 2 {
                    Err("lookup after the last credited event")
                } else {
                    Ok(None)
                }
            })
            .unwrap();

        assert_eq!(scan.events.len(), 2);
        assert_eq!(scan.unqualified_ascents, 1);
        assert_eq!(lookups, 2);
    }

    #[test]
    fn day_filter_bounds_and_allow_list() {
        let filter = DayFilter {
            from_day: Some(DayLabel::new("Day 26")),
            only_days: Vec::new(),
        };
        assert!(!filter.allows(&DayLabel::new("Day 3")));
        assert!(filter.allows(&DayLabel::new("Day 26")));
        assert!(filter.allows(&DayLabel::new("Day 100")));

        let only = DayFilter {
            from_day: None,
            only_days: vec![DayLabel::new("Day 36")],
        };
        assert!(only.allows(&DayLabel::new("Day 36")));
        assert!(!only.allows(&DayLabel::new("Day 35")));
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: DetectorConfig = serde_json::from_str(r#"{"partial_completion": false}"#).unwrap();
        assert_eq!(config.step_threshold, 2);
        assert_eq!(config.fall_step_threshold, 3);
        assert!(!config.partial_completion);
        let bad = DetectorConfig {
            day_reset_height: f64::NAN,
            ..DetectorConfig::default()
        };
        assert!(EventDetector::new(FloorMap::default(), bad).is_err());
    }
}
