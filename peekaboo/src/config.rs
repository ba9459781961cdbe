//! Engine configuration.
//!
//! Every knob has a default, so a config file only needs the fields it changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core_modules::fade::FadeTiming;
use crate::core_modules::geometry::{Point, Size};
use crate::core_modules::spawn_scheduler::SpawnInterval;
use crate::error::ConfigError;

/// Tunable behaviour of the popup engine and its sampling loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    /// Folder scanned for `png/jpg/jpeg/gif` popups.
    pub image_dir: Option<PathBuf>,
    /// Folder scanned for `mp4` popups.
    pub video_dir: Option<PathBuf>,
    /// Maximum number of simultaneously active popups.
    pub capacity: usize,
    /// `[min, max]` seconds between spawns while someone is present.
    pub spawn_interval_secs: [f64; 2],
    /// How long presence may be lost before every popup is closed.
    pub presence_grace_ms: u64,
    /// Fraction of the distance to the target covered per motion tick.
    pub motion_gain: f64,
    /// Random samples tried before accepting an overlapping position.
    pub placement_attempts: usize,
    /// `[min, max]` popup side length in pixels.
    pub popup_size: [u32; 2],
    pub motion_tick_ms: u64,
    pub fade_steps: u32,
    pub fade_step_ms: u64,
    /// Detector polling period.
    pub sample_period_ms: u64,
    /// Seed for every random choice; unseeded runs use OS entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            screen_width: 1920,
            screen_height: 1080,
            image_dir: Some(PathBuf::from("images")),
            video_dir: Some(PathBuf::from("videos")),
            capacity: 5,
            spawn_interval_secs: [2.0, 4.0],
            presence_grace_ms: 1000,
            motion_gain: 0.05,
            placement_attempts: 100,
            popup_size: [150, 300],
            motion_tick_ms: 50,
            fade_steps: 10,
            fade_step_ms: 30,
            sample_period_ms: 100,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Reads and validates a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.screen_width == 0 || self.screen_height == 0 {
            return invalid("screen size must be non-zero".into());
        }
        if self.capacity == 0 {
            return invalid("capacity must be at least 1".into());
        }
        let [lo, hi] = self.spawn_interval_secs;
        if !(lo >= 0.0 && lo <= hi && hi.is_finite()) {
            return invalid(format!("spawn interval [{lo}, {hi}] is not a valid range"));
        }
        if !(self.motion_gain > 0.0 && self.motion_gain <= 1.0) {
            return invalid(format!("motion gain {} must be in (0, 1]", self.motion_gain));
        }
        let [min_side, max_side] = self.popup_size;
        if min_side == 0 || min_side > max_side {
            return invalid(format!("popup size [{min_side}, {max_side}] is not a valid range"));
        }
        if self.motion_tick_ms == 0 || self.sample_period_ms == 0 {
            return invalid("tick periods must be non-zero".into());
        }
        Ok(())
    }

    pub fn screen(&self) -> Size {
        Size::new(self.screen_width as f64, self.screen_height as f64)
    }

    pub fn screen_center(&self) -> Point {
        Point::new(self.screen_width as f64 / 2.0, self.screen_height as f64 / 2.0)
    }

    pub fn spawn_interval(&self) -> SpawnInterval {
        SpawnInterval::new(self.spawn_interval_secs[0], self.spawn_interval_secs[1])
    }

    pub fn presence_grace(&self) -> Duration {
        Duration::from_millis(self.presence_grace_ms)
    }

    pub fn motion_tick(&self) -> Duration {
        Duration::from_millis(self.motion_tick_ms)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn fade_timing(&self) -> FadeTiming {
        FadeTiming {
            steps: self.fade_steps,
            step_delay: Duration::from_millis(self.fade_step_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.capacity, 5);
        assert_eq!(config.fade_timing().duration(), Duration::from_millis(330));
    }

    #[test]
    fn partial_files_fill_in_defaults() {
        let config = EngineConfig::from_json(r#"{ "capacity": 3, "screen_width": 800 }"#).unwrap();
        assert_eq!(config.capacity, 3);
        assert_eq!(config.screen_width, 800);
        assert_eq!(config.screen_height, 1080);
        assert_eq!(config.motion_gain, 0.05);
    }

    #[test]
    fn rejects_inconsistent_values() {
        for bad in [
            r#"{ "capacity": 0 }"#,
            r#"{ "spawn_interval_secs": [4.0, 2.0] }"#,
            r#"{ "motion_gain": 0.0 }"#,
            r#"{ "popup_size": [300, 150] }"#,
        ] {
            assert!(
                matches!(EngineConfig::from_json(bad), Err(ConfigError::Invalid(_))),
                "{bad}"
            );
        }
        assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
