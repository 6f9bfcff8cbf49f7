// Configuration management for Accompanist

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Quiet period after the last edit before a generation starts
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long playback waits for a running generation before giving up.
    /// Unset means wait as long as it takes.
    #[serde(default)]
    pub playback_wait_timeout_ms: Option<u64>,

    /// Whether background generation runs from startup
    #[serde(default = "default_true")]
    pub start_enabled: bool,

    /// Velocity factor reached at the end of a fade-out segment (0.0-1.0)
    #[serde(default = "default_fade_out_floor")]
    pub fade_out_floor: f32,

    /// MIDI export resolution
    #[serde(default = "default_ticks_per_beat")]
    pub export_ticks_per_beat: u16,

    /// Tempo written to exported MIDI files
    #[serde(default = "default_tempo_bpm")]
    pub export_tempo_bpm: f64,

    /// Where exported MIDI files go
    #[serde(default = "get_default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            playback_wait_timeout_ms: None,
            start_enabled: true,
            fade_out_floor: default_fade_out_floor(),
            export_ticks_per_beat: default_ticks_per_beat(),
            export_tempo_bpm: default_tempo_bpm(),
            output_dir: get_default_output_dir(),
        }
    }
}

impl Config {
    /// Load config from `path` or return default
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str(&contents) {
                    Ok(config) => return config,
                    Err(e) => {
                        log::warn!("Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config file: {}", e);
                }
            }
        }

        Self::default()
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn playback_wait_timeout(&self) -> Option<Duration> {
        self.playback_wait_timeout_ms.map(Duration::from_millis)
    }
}

/// Get the config file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("accompanist")
        .join("config.toml")
}

/// Get the default directory for exported MIDI files
fn get_default_output_dir() -> PathBuf {
    dirs::audio_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Music")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Accompanist")
}

fn default_debounce_ms() -> u64 {
    120
}

fn default_fade_out_floor() -> f32 {
    0.2
}

fn default_ticks_per_beat() -> u16 {
    480
}

fn default_tempo_bpm() -> f64 {
    120.0
}

/// Default true value (for serde)
fn default_true() -> bool {
    true
}
