use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::platform;

/// Bounds on the playback tick period, in milliseconds.
pub const MIN_PERIOD_MS: u64 = 50;
pub const MAX_PERIOD_MS: u64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
}

/// Where forecast listings and images are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Station to open on startup. Empty means it must come from the CLI.
    #[serde(default)]
    pub station: String,
    #[serde(default = "default_period_ms")]
    pub default_period_ms: u64,
    /// Frames skipped by a modified step (one day of hourly frames).
    #[serde(default = "default_day_step")]
    pub day_step: i64,
    #[serde(default = "default_scroll_pixels_per_unit")]
    pub scroll_pixels_per_unit: u32,
    /// Warm the whole frame cache as soon as the listing is known.
    #[serde(default = "default_prefetch")]
    pub prefetch: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            station: String::new(),
            default_period_ms: default_period_ms(),
            day_step: default_day_step(),
            scroll_pixels_per_unit: default_scroll_pixels_per_unit(),
            prefetch: default_prefetch(),
        }
    }
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl PlaybackConfig {
    /// Configured period, clamped into the range playback accepts.
    pub fn period_ms(&self) -> u64 {
        clamp_period_ms(self.default_period_ms)
    }
}

impl FreshnessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

pub fn clamp_period_ms(period_ms: u64) -> u64 {
    period_ms.clamp(MIN_PERIOD_MS, MAX_PERIOD_MS)
}

fn default_base_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    4_000
}

fn default_period_ms() -> u64 {
    100
}

fn default_day_step() -> i64 {
    24
}

fn default_scroll_pixels_per_unit() -> u32 {
    10
}

fn default_prefetch() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    300
}

impl Config {
    /// Load from the default location, writing defaults out on first run.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            info!("wrote default config to {}", path.display());
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
