//! Configuration management for the calibration flow
//!
//! Durations, thresholds and timer periods are loaded from a JSON file with
//! per-field defaults, so a shell can tune the flow without recompilation.
//! The configuration is validated once when a `FlowContext` is built and is
//! not re-checked mid-flow.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::CalibrationError;
use crate::signal::quality::MAX_CRITICAL_THRESHOLD;

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub timing: TimingConfig,
}

/// Stage durations and quality thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Settle countdown before recording starts (seconds)
    pub countdown_secs: u32,
    /// Full recording length (seconds)
    pub recording_secs: u32,
    /// Shortest recording that can still produce a usable baseline (seconds)
    pub min_recording_secs: u32,
    /// Scores strictly below this are critical
    pub critical_threshold: f32,
    /// Scores at or above this count as clean samples
    pub clean_threshold: f32,
    /// Clean-data percentage required for a successful recording
    pub min_clean_percentage: u8,
    /// Theta readings required before a baseline can be computed
    pub baseline_min_samples: usize,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 30,
            recording_secs: 300,
            min_recording_secs: 180,
            critical_threshold: 20.0,
            clean_threshold: 40.0,
            min_clean_percentage: 50,
            baseline_min_samples: 10,
        }
    }
}

/// Timer periods used by the stage drivers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Countdown / elapsed tick period
    pub tick_ms: u64,
    /// Signal sampling period while recording
    pub sample_ms: u64,
    /// Delay between countdown mount and the first tick
    pub start_delay_ms: u64,
    /// How long critical signal must persist before auto-pausing
    pub auto_pause_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tick_ms: 1000,
            sample_ms: 500,
            start_delay_ms: 500,
            auto_pause_ms: 10_000,
        }
    }
}

impl TimingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_millis(self.sample_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn auto_pause(&self) -> Duration {
        Duration::from_millis(self.auto_pause_ms)
    }

    /// Divide every period by `speed`, keeping each at least 1 ms
    ///
    /// Used by the simulator CLI to run a five-minute calibration in seconds.
    pub fn scaled(&self, speed: u32) -> Self {
        let speed = u64::from(speed.max(1));
        let scale = |ms: u64| (ms / speed).max(1);
        Self {
            tick_ms: scale(self.tick_ms),
            sample_ms: scale(self.sample_ms),
            start_delay_ms: scale(self.start_delay_ms),
            auto_pause_ms: scale(self.auto_pause_ms),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// # Arguments
    /// * `path` - Path to JSON config file
    ///
    /// # Returns
    /// The parsed configuration, or defaults if the file is missing or invalid
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    log::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }

    /// Check every bound the stage machines rely on
    pub fn validate(&self) -> Result<(), CalibrationError> {
        let cal = &self.calibration;
        let timing = &self.timing;

        if cal.recording_secs == 0 {
            return Err(invalid("recording_secs must be positive"));
        }
        if cal.min_recording_secs > cal.recording_secs {
            return Err(invalid(format!(
                "min_recording_secs {} exceeds recording_secs {}",
                cal.min_recording_secs, cal.recording_secs
            )));
        }
        for (name, value) in [
            ("critical_threshold", cal.critical_threshold),
            ("clean_threshold", cal.clean_threshold),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(format!("{} {} out of range [0, 100]", name, value)));
            }
        }
        if cal.critical_threshold > MAX_CRITICAL_THRESHOLD {
            return Err(invalid(format!(
                "critical_threshold {} exceeds {}",
                cal.critical_threshold, MAX_CRITICAL_THRESHOLD
            )));
        }
        if cal.min_clean_percentage > 100 {
            return Err(invalid("min_clean_percentage out of range [0, 100]"));
        }
        if cal.baseline_min_samples < 2 {
            return Err(invalid("baseline_min_samples must be at least 2"));
        }
        if timing.tick_ms == 0
            || timing.sample_ms == 0
            || timing.start_delay_ms == 0
            || timing.auto_pause_ms == 0
        {
            return Err(invalid("timer periods must be positive"));
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> CalibrationError {
    CalibrationError::InvalidConfig {
        reason: reason.into(),
    }
}
