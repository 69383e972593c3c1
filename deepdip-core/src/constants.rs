//! Centralized detection constants for Deep Dip floor analysis.
//!
//! These values define the default noise gates and floor geometry. Callers
//! can override all of them through `DetectorConfig` and `FloorMap`, but the
//! defaults here are what the published tables are generated with.

/// Floor index used for heights that fall outside every defined interval.
pub const NO_FLOOR: i32 = -1;

// Detector tuning ----------------------------------------------------------
pub(crate) const DEFAULT_STEP_THRESHOLD: u32 = 2;
pub(crate) const DEFAULT_FALL_STEP_THRESHOLD: u32 = 3;
pub(crate) const DEFAULT_DAY_RESET_HEIGHT: f64 = 200.0;
pub(crate) const DEFAULT_PARTIAL_COMPLETION: bool = true;

/// Lowest floor an ascent must reach before it is reported.
pub(crate) const MIN_ASCENT_FLOOR: i32 = 1;
/// An ascent skipping at least this many floors is always creditable.
pub(crate) const CREDITABLE_FLOOR_JUMP: i32 = 2;
/// Falls from at or below this floor are too common to be worth logging.
pub(crate) const FALL_LOG_MIN_FLOOR: i32 = 1;

// Floor geometry -----------------------------------------------------------
/// Cumulative climb in metres at which each floor begins.
pub(crate) const DEFAULT_FLOOR_HEIGHTS: [f64; 19] = [
    0.0, 100.0, 209.0, 314.0, 420.0, 520.0, 620.0, 740.0, 815.0, 937.0, 1_045.0, 1_150.0,
    1_270.0, 1_378.0, 1_490.0, 1_584.0, 1_688.0, 1_800.0, 2_000.0,
];

// Time formats -------------------------------------------------------------
pub(crate) const SOURCE_TIMESTAMP_FORMAT: &str = "%m/%d, %I:%M %p";
pub(crate) const JST_TIMESTAMP_FORMAT: &str = "%Y/%m/%d, %I:%M %p";
pub(crate) const JST_OFFSET_SECONDS: i32 = 9 * 3_600;
pub(crate) const VIDEO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
pub(crate) const VIDEO_URL_BASE: &str = "https://www.twitch.tv/videos/";
