// Calibration error types and constants

use crate::error::ErrorCode;
use flutter_rust_bridge::frb;
use log::error;
use std::fmt;

/// Calibration error code constants exposed to the UI shell via FFI
///
/// These constants provide a single source of truth for error codes
/// shared between Rust and the mobile shell.
///
/// Error code range: 2001-2009
#[frb(unignore)]
pub struct CalibrationErrorCodes {}

#[frb]
impl CalibrationErrorCodes {
    /// Readiness gate refused to start the flow
    pub const NOT_READY: i32 = 2001;

    /// Configuration failed validation
    pub const INVALID_CONFIG: i32 = 2002;

    /// Stage started while the session is in the wrong phase
    pub const INVALID_PHASE: i32 = 2003;

    /// Not enough clean readings to build a baseline
    pub const INSUFFICIENT_SAMPLES: i32 = 2004;

    /// Baseline statistics are unusable
    pub const INVALID_BASELINE: i32 = 2005;

    /// Summary refused to persist the baseline
    pub const CANNOT_SAVE: i32 = 2006;

    /// Session state RwLock was poisoned
    pub const STATE_POISONED: i32 = 2007;

    /// Device metrics frame could not be decoded
    pub const MALFORMED_FRAME: i32 = 2008;

    /// Stage driver task ended abnormally
    pub const STAGE_ABORTED: i32 = 2009;

    // Getter methods for FFI exposure (flutter_rust_bridge requires methods not const)

    /// Get NOT_READY error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn not_ready() -> i32 {
        Self::NOT_READY
    }

    /// Get INVALID_CONFIG error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_config() -> i32 {
        Self::INVALID_CONFIG
    }

    /// Get INVALID_PHASE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_phase() -> i32 {
        Self::INVALID_PHASE
    }

    /// Get INSUFFICIENT_SAMPLES error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn insufficient_samples() -> i32 {
        Self::INSUFFICIENT_SAMPLES
    }

    /// Get INVALID_BASELINE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn invalid_baseline() -> i32 {
        Self::INVALID_BASELINE
    }

    /// Get CANNOT_SAVE error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn cannot_save() -> i32 {
        Self::CANNOT_SAVE
    }

    /// Get STATE_POISONED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn state_poisoned() -> i32 {
        Self::STATE_POISONED
    }

    /// Get MALFORMED_FRAME error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn malformed_frame() -> i32 {
        Self::MALFORMED_FRAME
    }

    /// Get STAGE_ABORTED error code
    #[flutter_rust_bridge::frb(sync, getter)]
    pub fn stage_aborted() -> i32 {
        Self::STAGE_ABORTED
    }
}

/// Log a calibration error with structured context
///
/// Logs the numeric code, the component and the human-readable message,
/// and records the error in the telemetry history.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationFlow, message={}",
        context,
        err.code(),
        err.message()
    );
    crate::telemetry::hub().record_error(err, context);
}

/// Calibration-related errors
///
/// Covers the readiness precondition, configuration validation, stage
/// sequencing, baseline construction and session persistence.
///
/// Error code ranges: 2001-2009
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Readiness gate reported not-ready
    NotReady { reason: String },

    /// Configuration failed validation
    InvalidConfig { reason: String },

    /// Stage requested while the overall phase does not allow it
    InvalidPhase { expected: String, actual: String },

    /// Not enough readings collected for a baseline
    InsufficientSamples { required: usize, collected: usize },

    /// Baseline statistics failed validation
    InvalidBaseline { reason: String },

    /// Summary refused to persist the baseline
    CannotSave { reason: String },

    /// Session state RwLock was poisoned
    StatePoisoned,

    /// Device metrics frame could not be decoded
    MalformedFrame { reason: String },

    /// Stage driver task panicked or was aborted
    StageAborted { reason: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::NotReady { .. } => CalibrationErrorCodes::NOT_READY,
            CalibrationError::InvalidConfig { .. } => CalibrationErrorCodes::INVALID_CONFIG,
            CalibrationError::InvalidPhase { .. } => CalibrationErrorCodes::INVALID_PHASE,
            CalibrationError::InsufficientSamples { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_SAMPLES
            }
            CalibrationError::InvalidBaseline { .. } => CalibrationErrorCodes::INVALID_BASELINE,
            CalibrationError::CannotSave { .. } => CalibrationErrorCodes::CANNOT_SAVE,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::MalformedFrame { .. } => CalibrationErrorCodes::MALFORMED_FRAME,
            CalibrationError::StageAborted { .. } => CalibrationErrorCodes::STAGE_ABORTED,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::NotReady { reason } => {
                format!("Not ready to calibrate: {}", reason)
            }
            CalibrationError::InvalidConfig { reason } => {
                format!("Invalid configuration: {}", reason)
            }
            CalibrationError::InvalidPhase { expected, actual } => {
                format!("Invalid phase: expected {}, found {}", expected, actual)
            }
            CalibrationError::InsufficientSamples {
                required,
                collected,
            } => {
                format!("Insufficient samples: need {}, got {}", required, collected)
            }
            CalibrationError::InvalidBaseline { reason } => {
                format!("Invalid baseline: {}", reason)
            }
            CalibrationError::CannotSave { reason } => {
                format!("Cannot save calibration: {}", reason)
            }
            CalibrationError::StatePoisoned => "Session state lock poisoned".to_string(),
            CalibrationError::MalformedFrame { reason } => {
                format!("Malformed device frame: {}", reason)
            }
            CalibrationError::StageAborted { reason } => {
                format!("Stage aborted: {}", reason)
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calibration_error_codes() {
        assert_eq!(
            CalibrationError::NotReady {
                reason: "x".to_string()
            }
            .code(),
            CalibrationErrorCodes::NOT_READY
        );
        assert_eq!(
            CalibrationError::InsufficientSamples {
                required: 10,
                collected: 3
            }
            .code(),
            CalibrationErrorCodes::INSUFFICIENT_SAMPLES
        );
        assert_eq!(
            CalibrationError::StatePoisoned.code(),
            CalibrationErrorCodes::STATE_POISONED
        );
        assert_eq!(
            CalibrationError::StageAborted {
                reason: "x".to_string()
            }
            .code(),
            CalibrationErrorCodes::STAGE_ABORTED
        );
    }

    #[test]
    fn test_calibration_error_messages() {
        let err = CalibrationError::InsufficientSamples {
            required: 10,
            collected: 3,
        };
        assert_eq!(err.message(), "Insufficient samples: need 10, got 3");

        let err = CalibrationError::NotReady {
            reason: "Connect device".to_string(),
        };
        assert_eq!(err.message(), "Not ready to calibrate: Connect device");

        let err = CalibrationError::InvalidPhase {
            expected: "recording".to_string(),
            actual: "none".to_string(),
        };
        assert!(err.message().contains("expected recording"));

        let err = CalibrationError::StatePoisoned;
        assert!(err.message().contains("poisoned"));
    }

    #[test]
    fn test_calibration_error_display() {
        let err = CalibrationError::CannotSave {
            reason: "poor quality".to_string(),
        };
        let display = format!("{}", err);
        assert!(display.contains("CalibrationError"));
        assert!(display.contains(&err.code().to_string()));
    }

    #[test]
    fn test_error_code_getters() {
        assert_eq!(CalibrationErrorCodes::not_ready(), 2001);
        assert_eq!(CalibrationErrorCodes::invalid_config(), 2002);
        assert_eq!(CalibrationErrorCodes::invalid_phase(), 2003);
        assert_eq!(CalibrationErrorCodes::insufficient_samples(), 2004);
        assert_eq!(CalibrationErrorCodes::invalid_baseline(), 2005);
        assert_eq!(CalibrationErrorCodes::cannot_save(), 2006);
        assert_eq!(CalibrationErrorCodes::state_poisoned(), 2007);
        assert_eq!(CalibrationErrorCodes::malformed_frame(), 2008);
        assert_eq!(CalibrationErrorCodes::stage_aborted(), 2009);
    }
}
