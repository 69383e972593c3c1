use deepdip_core::{DetectorConfig, DetectorConfigError, FloorMap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Players tracked when neither the command line nor the config names any.
pub const DEFAULT_PLAYERS: &[&str] = &["BrenTM", "Larstm", "Hazardu.", "eLconn21", "Schmaniol"];

/// Errors raised when the tool configuration cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no players configured")]
    NoPlayers,
    #[error("request_timeout_secs must be at least 1")]
    Timeout,
    #[error(transparent)]
    Detector(#[from] DetectorConfigError),
}

/// Tool configuration, loaded from JSON with every field optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "StatsConfig::default_players")]
    pub players: Vec<String>,
    /// Player stats endpoint; the player is sent as the `username` query.
    #[serde(default = "StatsConfig::default_api_url")]
    pub api_url: String,
    #[serde(default = "StatsConfig::default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "StatsConfig::default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "StatsConfig::default_log_file")]
    pub log_file: PathBuf,
    /// JSON object mapping player names to streamer logins.
    #[serde(default = "StatsConfig::default_streamer_map")]
    pub streamer_map: PathBuf,
    #[serde(default = "StatsConfig::default_token_file")]
    pub token_file: PathBuf,
    /// Days ordered before this label are not scanned.
    #[serde(default = "StatsConfig::default_from_day")]
    pub from_day: Option<String>,
    #[serde(default)]
    pub enable_twitch_url: bool,
    #[serde(default)]
    pub strict_timestamps: bool,
    #[serde(default = "StatsConfig::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub floors: FloorMap,
}

impl StatsConfig {
    fn default_players() -> Vec<String> {
        DEFAULT_PLAYERS.iter().map(ToString::to_string).collect()
    }

    fn default_api_url() -> String {
        "https://www.deepdipstats.com/api/playerstats".to_string()
    }

    fn default_cache_dir() -> PathBuf {
        PathBuf::from("cache")
    }

    fn default_output_dir() -> PathBuf {
        PathBuf::from("result")
    }

    fn default_log_file() -> PathBuf {
        PathBuf::from("debug.log")
    }

    fn default_streamer_map() -> PathBuf {
        PathBuf::from("tmuser_to_twitchuser.json")
    }

    fn default_token_file() -> PathBuf {
        PathBuf::from("oauth_token.json")
    }

    #[allow(clippy::unnecessary_wraps)]
    fn default_from_day() -> Option<String> {
        Some("Day 26".to_string())
    }

    const fn default_request_timeout_secs() -> u64 {
        30
    }

    /// Load configuration from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.players.iter().all(|p| p.trim().is_empty()) {
            return Err(ConfigError::NoPlayers);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Timeout);
        }
        self.detector.validate()?;
        Ok(())
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            players: Self::default_players(),
            api_url: Self::default_api_url(),
            cache_dir: Self::default_cache_dir(),
            output_dir: Self::default_output_dir(),
            log_file: Self::default_log_file(),
            streamer_map: Self::default_streamer_map(),
            token_file: Self::default_token_file(),
            from_day: Self::default_from_day(),
            enable_twitch_url: false,
            strict_timestamps: false,
            request_timeout_secs: Self::default_request_timeout_secs(),
            detector: DetectorConfig::default(),
            floors: FloorMap::default(),
        }
    }
}

/// Load the player to streamer mapping.
pub fn load_streamer_map(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
