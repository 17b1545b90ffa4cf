use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard safety ceiling: files larger than this are always skipped during a
/// crawl, regardless of config, so a stray generated blob can't stall ingestion.
pub const ABSOLUTE_MAX_FILE_BYTES: u64 = 5_000_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// HTTP endpoint for an external embedding provider. `None` uses the
    /// offline hash-based vector (always available).
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file path override. Relative to `project_root` if not absolute.
    /// Defaults to `.hermes/graph.db` under the project root.
    pub db_path: Option<PathBuf>,

    /// Background auto-reindex interval, in seconds. 0 disables the worker.
    pub auto_reindex_interval_secs: u64,

    pub embedding: EmbeddingConfig,

    /// Max file size considered during crawl, in bytes.
    pub max_file_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            auto_reindex_interval_secs: 0,
            embedding: EmbeddingConfig::default(),
            max_file_bytes: 1_000_000,
        }
    }
}

impl Config {
    pub fn db_path_for(&self, project_root: &Path) -> PathBuf {
        let configured = self
            .db_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(".hermes/graph.db"));
        if configured.is_absolute() {
            configured
        } else {
            project_root.join(configured)
        }
    }
}

/// Load `.hermes.json` from `project_root`, falling back to defaults on any
/// I/O or parse failure — a missing or malformed config file is never fatal.
pub fn load_config(project_root: &Path) -> Config {
    let primary = project_root.join(".hermes.json");
    let Ok(text) = std::fs::read_to_string(&primary) else {
        return Config::default();
    };
    serde_json::from_str::<Config>(&text).unwrap_or_else(|_| Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.auto_reindex_interval_secs, 0);
    }

    #[test]
    fn db_path_defaults_under_project_root() {
        let cfg = Config::default();
        let root = Path::new("/repo");
        assert_eq!(cfg.db_path_for(root), Path::new("/repo/.hermes/graph.db"));
    }

    #[test]
    fn malformed_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".hermes.json"), "{not json").unwrap();
        let cfg = load_config(dir.path());
        assert_eq!(cfg.max_file_bytes, Config::default().max_file_bytes);
    }
}
