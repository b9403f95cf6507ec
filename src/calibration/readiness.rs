// Readiness gate checked on the instructions screen before the countdown
//
// Checks run in order: connection, then presence of a score, then the
// critical threshold. The first failing check supplies the reason.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::signal::quality::DEFAULT_CRITICAL_THRESHOLD;

/// Why the flow cannot start yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReadyReason {
    ConnectDevice,
    WaitingForSignal,
    SignalTooLow,
}

impl NotReadyReason {
    pub fn message(&self) -> &'static str {
        match self {
            NotReadyReason::ConnectDevice => "Please connect your device first",
            NotReadyReason::WaitingForSignal => "Waiting for signal",
            NotReadyReason::SignalTooLow => "Signal too low, adjust headband",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    pub reason: Option<NotReadyReason>,
}

impl Readiness {
    /// Reason text, empty when ready
    pub fn reason_text(&self) -> &'static str {
        self.reason.map(|r| r.message()).unwrap_or("")
    }

    /// Convert into the precondition error raised when the gate is bypassed
    pub fn into_result(self) -> Result<(), CalibrationError> {
        match self.reason {
            None => Ok(()),
            Some(reason) => Err(CalibrationError::NotReady {
                reason: reason.message().to_string(),
            }),
        }
    }

    fn not_ready(reason: NotReadyReason) -> Self {
        Self {
            ready: false,
            reason: Some(reason),
        }
    }
}

/// Gate with the default critical threshold
pub fn readiness(is_connected: bool, signal_score: Option<f32>) -> Readiness {
    readiness_with_threshold(is_connected, signal_score, DEFAULT_CRITICAL_THRESHOLD)
}

pub fn readiness_with_threshold(
    is_connected: bool,
    signal_score: Option<f32>,
    critical_threshold: f32,
) -> Readiness {
    if !is_connected {
        return Readiness::not_ready(NotReadyReason::ConnectDevice);
    }
    match signal_score {
        None => Readiness::not_ready(NotReadyReason::WaitingForSignal),
        Some(score) if score.is_nan() => Readiness::not_ready(NotReadyReason::WaitingForSignal),
        Some(score) if score < critical_threshold => {
            Readiness::not_ready(NotReadyReason::SignalTooLow)
        }
        Some(_) => Readiness {
            ready: true,
            reason: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_not_ready() {
        let r = readiness(false, Some(90.0));
        assert!(!r.ready);
        assert_eq!(r.reason, Some(NotReadyReason::ConnectDevice));
        assert!(r.reason_text().contains("connect"));
    }

    #[test]
    fn test_missing_signal_not_ready() {
        let r = readiness(true, None);
        assert!(!r.ready);
        assert_eq!(r.reason, Some(NotReadyReason::WaitingForSignal));
    }

    #[test]
    fn test_low_signal_not_ready() {
        let r = readiness(true, Some(15.0));
        assert!(!r.ready);
        assert_eq!(r.reason, Some(NotReadyReason::SignalTooLow));
    }

    #[test]
    fn test_ready() {
        let r = readiness(true, Some(50.0));
        assert!(r.ready);
        assert_eq!(r.reason_text(), "");
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn test_threshold_boundary_is_ready() {
        assert!(readiness(true, Some(20.0)).ready);
    }

    #[test]
    fn test_disconnect_checked_before_signal() {
        assert_eq!(
            readiness(false, None).reason,
            Some(NotReadyReason::ConnectDevice)
        );
    }

    #[test]
    fn test_into_result_error() {
        let err = readiness(true, Some(3.0)).into_result().unwrap_err();
        assert!(matches!(err, CalibrationError::NotReady { .. }));
    }
}
