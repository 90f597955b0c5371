use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::stage::SubtitleSource;

/// Configuration for the media pipeline orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the project and file JSON records
    pub state_dir: PathBuf,
    /// Executable invoked to schedule a processing job
    pub scheduler_bin: PathBuf,
    /// Extra arguments placed before the job kind and file ids
    pub scheduler_args: Vec<String>,
    /// Seconds to wait for the scheduler to accept a job before treating it as rejected
    pub dispatch_timeout_secs: u64,
    /// Which latest file feeds subtitle generation
    pub subtitle_source: SubtitleSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl PipelineConfig {
    /// Create a default configuration with sensible values
    pub fn default_config() -> Self {
        Self {
            state_dir: PathBuf::from("/var/lib/mediaflow"),
            scheduler_bin: PathBuf::from("mediaflow-schedule"),
            scheduler_args: Vec::new(),
            dispatch_timeout_secs: 30,
            subtitle_source: SubtitleSource::Audio,
        }
    }

    /// Load configuration from a file, or return defaults if path is None or file doesn't exist
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default_config();

        if let Some(config_path) = path {
            if config_path.exists() {
                let content = std::fs::read_to_string(config_path)
                    .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

                if config_path.extension().and_then(|s| s.to_str()) == Some("toml") {
                    config = toml::from_str(&content)
                        .with_context(|| format!("Failed to parse TOML config: {}", config_path.display()))?;
                } else {
                    config = serde_json::from_str(&content)
                        .with_context(|| format!("Failed to parse JSON config: {}", config_path.display()))?;
                }
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let cfg = PipelineConfig::load_config(Some(Path::new("/nonexistent/mediaflow.toml"))).unwrap();
        assert_eq!(cfg.dispatch_timeout_secs, 30);
        assert_eq!(cfg.subtitle_source, SubtitleSource::Audio);
    }

    #[test]
    fn test_toml_partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "scheduler_bin = \"/usr/local/bin/jobctl\"\nsubtitle_source = \"video\"\n",
        )
        .unwrap();

        let cfg = PipelineConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.scheduler_bin, PathBuf::from("/usr/local/bin/jobctl"));
        assert_eq!(cfg.subtitle_source, SubtitleSource::Video);
        assert_eq!(cfg.dispatch_timeout_secs, 30);
    }

    #[test]
    fn test_json_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"state_dir": "/srv/state", "dispatch_timeout_secs": 5}"#).unwrap();

        let cfg = PipelineConfig::load_config(Some(&path)).unwrap();
        assert_eq!(cfg.state_dir, PathBuf::from("/srv/state"));
        assert_eq!(cfg.dispatch_timeout_secs, 5);
    }

    #[test]
    fn test_malformed_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(PipelineConfig::load_config(Some(&path)).is_err());
    }
}
