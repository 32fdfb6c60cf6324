//! Engine configuration loaded from an optional TOML file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

pub const CONFIG_FILE: &str = "spotify-sync.toml";

/// Tunables for the playback engine and the local device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Poll interval while no local device is rendering.
    pub idle_poll_interval_ms: u64,
    /// Poll interval once the local device is active.
    pub active_poll_interval_ms: u64,
    pub tick_interval_ms: u64,
    /// Largest jump of the displayed position in one tick.
    pub max_frame_step_ms: u64,
    /// `previous` restarts the track once past this position.
    pub restart_threshold_ms: u64,
    pub device_name: String,
    pub liked_songs_cache: PathBuf,
    pub lyrics_enabled: bool,
    pub lyrics_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval_ms: 2_000,
            active_poll_interval_ms: 5_000,
            tick_interval_ms: 50,
            max_frame_step_ms: 250,
            restart_threshold_ms: 3_000,
            device_name: "Spotify-Sync".to_string(),
            liked_songs_cache: PathBuf::from(".cache/liked_songs.json"),
            lyrics_enabled: true,
            lyrics_timeout_secs: 10,
        }
    }
}

impl EngineConfig {
    /// Load `path`, or defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let config = Self::parse(&raw).with_context(|| format!("parse config {:?}", path))?;
        tracing::info!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config = toml::from_str::<EngineConfig>(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.idle_poll_interval_ms == 0 || self.active_poll_interval_ms == 0 {
            anyhow::bail!("poll intervals must be positive");
        }
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be positive");
        }
        if self.device_name.trim().is_empty() {
            anyhow::bail!("device_name must not be empty");
        }
        Ok(())
    }

    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }

    pub fn active_poll_interval(&self) -> Duration {
        Duration::from_millis(self.active_poll_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn max_frame_step(&self) -> Duration {
        Duration::from_millis(self.max_frame_step_ms)
    }

    pub fn lyrics_timeout(&self) -> Duration {
        Duration::from_secs(self.lyrics_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(EngineConfig::parse("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config = EngineConfig::parse(
            r#"
            active_poll_interval_ms = 8000
            device_name = "Desk"
            lyrics_enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.active_poll_interval(), Duration::from_secs(8));
        assert_eq!(config.idle_poll_interval(), Duration::from_secs(2));
        assert_eq!(config.device_name, "Desk");
        assert!(!config.lyrics_enabled);
        assert_eq!(config.restart_threshold_ms, 3_000);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        assert!(EngineConfig::parse("tick_interval_ms = 0").is_err());
        assert!(EngineConfig::parse("idle_poll_interval_ms = 0").is_err());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let config = EngineConfig::load(Path::new("definitely/not/here.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
