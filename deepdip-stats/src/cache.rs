use deepdip_core::{LocalCache, PlayerHistory};
use log::debug;
use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache entry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cache entry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Directory of saved API responses, one JSON file per snapshot.
#[derive(Debug, Clone)]
pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Files belonging to `player`, sorted by name. Periods are dropped from
    /// the player name because snapshot file names never contain them.
    pub fn entries_for(&self, player: &str) -> Result<Vec<PathBuf>, CacheError> {
        if !self.root.is_dir() {
            debug!("Cache directory {} not found", self.root.display());
            return Ok(Vec::new());
        }
        let needle = player.replace('.', "");
        let read_err = |source| CacheError::Read {
            path: self.root.clone(),
            source,
        };
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            let matches = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(&needle));
            if matches && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl LocalCache for CacheDir {
    type Error = CacheError;

    fn load_histories(&self, player: &str) -> Result<Vec<PlayerHistory>, Self::Error> {
        self.entries_for(player)?
            .into_iter()
            .map(|path| {
                let text = fs::read_to_string(&path).map_err(|source| CacheError::Read {
                    path: path.clone(),
                    source,
                })?;
                debug!("Loaded cache entry {}", path.display());
                PlayerHistory::from_json(&text).map_err(|source| CacheError::Parse { path, source })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "deepdip-cache-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    const SNAPSHOT: &str =
        r#"{"dailyData": {"Day 3": [{"height": 150.0, "timestamp": "05/03, 08:00 PM"}]}}"#;

    #[test]
    fn matches_player_name_without_periods() {
        let dir = temp_dir("match");
        fs::write(dir.join("Hazardu_0503.json"), SNAPSHOT).unwrap();
        fs::write(dir.join("BrenTM_0503.json"), SNAPSHOT).unwrap();

        let cache = CacheDir::new(&dir);
        let histories = cache.load_histories("Hazardu.").unwrap();
        assert_eq!(histories.len(), 1);
        assert_eq!(histories[0].reading_count(), 1);
        assert_eq!(cache.entries_for("Larstm").unwrap().len(), 0);
    }

    #[test]
    fn missing_directory_is_empty() {
        let cache = CacheDir::new("/nonexistent/deepdip-cache");
        assert!(cache.load_histories("BrenTM").unwrap().is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let dir = temp_dir("corrupt");
        fs::write(dir.join("Larstm.json"), "{not json").unwrap();
        let err = CacheDir::new(&dir).load_histories("Larstm").unwrap_err();
        assert!(matches!(err, CacheError::Parse { .. }));

        fs::write(dir.join("Larstm.json"), r#"{"error": "player not found"}"#).unwrap();
        let err = CacheDir::new(&dir).load_histories("Larstm").unwrap_err();
        assert!(matches!(err, CacheError::Parse { .. }));
    }
}
