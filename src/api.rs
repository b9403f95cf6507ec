// Public API for flutter_rust_bridge integration
// Pure, synchronous helpers the mobile shell calls to render the calibration flow

#![allow(dead_code)] // FFI functions are called from Dart, not detected by Rust analyzer

use anyhow::Result;

use crate::calibration::{self, readiness};
use crate::config::AppConfig;
use crate::error::CalibrationError;
use crate::signal::{self, DeviceFrame};

// Re-export error code constants for FFI exposure
pub use crate::error::CalibrationErrorCodes;

/// Signal classification rendered by the signal indicator
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalStatus {
    /// `unknown | excellent | good | fair | poor | critical`
    pub level: String,
    pub label: String,
    pub color_key: String,
    pub is_good: bool,
    pub is_critical: bool,
}

/// Readiness gate result for the instructions screen
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReadinessStatus {
    pub ready: bool,
    /// Empty when ready
    pub reason: String,
}

/// Calibration grade shown on the summary screen
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QualityStatus {
    /// `excellent | good | acceptable | poor`
    pub level: String,
    pub label: String,
    pub color_key: String,
    pub summary: String,
    pub recommendation: String,
}

/// Classify a signal-quality score (0-100); `None` is unknown
#[flutter_rust_bridge::frb(sync)]
pub fn classify_signal_quality(score: Option<f32>) -> SignalStatus {
    let classification = signal::classify(score);
    SignalStatus {
        level: classification.level.label().to_ascii_lowercase(),
        label: classification.label().to_string(),
        color_key: classification.color_key().to_string(),
        is_good: classification.is_good,
        is_critical: classification.is_critical,
    }
}

/// Readiness gate: connected, reporting, and above the critical threshold
#[flutter_rust_bridge::frb(sync)]
pub fn check_readiness(is_connected: bool, signal_score: Option<f32>) -> ReadinessStatus {
    let result = readiness(is_connected, signal_score);
    ReadinessStatus {
        ready: result.ready,
        reason: result.reason_text().to_string(),
    }
}

/// Grade a recording from average quality and clean-data percentage
#[flutter_rust_bridge::frb(sync)]
pub fn evaluate_calibration_quality(quality_score: f32, clean_data_percentage: f32) -> QualityStatus {
    let level = calibration::evaluate(quality_score, clean_data_percentage);
    QualityStatus {
        level: level.label().to_ascii_lowercase(),
        label: level.label().to_string(),
        color_key: level.color_key().to_string(),
        summary: level.summary().to_string(),
        recommendation: level.recommendation().to_string(),
    }
}

/// Format whole seconds as `MM:SS`
#[flutter_rust_bridge::frb(sync)]
pub fn format_clock(seconds: u32) -> String {
    calibration::format_clock(seconds)
}

/// Countdown progress (0-100) from total and remaining seconds
#[flutter_rust_bridge::frb(sync)]
pub fn countdown_progress(total_seconds: u32, remaining_seconds: u32) -> f32 {
    calibration::progress_percent(total_seconds.saturating_sub(remaining_seconds), total_seconds)
}

/// Default configuration as pretty JSON, a starting point for config files
#[flutter_rust_bridge::frb(sync)]
pub fn default_config_json() -> Result<String> {
    Ok(serde_json::to_string_pretty(&AppConfig::default())?)
}

/// Decode a device metrics frame and classify its signal quality
#[flutter_rust_bridge::frb(sync)]
pub fn classify_device_frame(json: String) -> Result<SignalStatus, CalibrationError> {
    let frame = DeviceFrame::parse(&json)?;
    Ok(classify_signal_quality(frame.signal().score))
}

/// Get the version of the calibration core
#[flutter_rust_bridge::frb(sync)]
pub fn get_version() -> Result<String> {
    Ok(env!("CARGO_PKG_VERSION").to_string())
}

/// Get CalibrationErrorCodes as a structured object with all error code constants
#[flutter_rust_bridge::frb(sync)]
pub fn get_calibration_error_codes() -> CalibrationErrorCodes {
    CalibrationErrorCodes {}
}
