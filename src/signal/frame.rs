//! Device metrics frames as streamed by the headset bridge.
//!
//! One JSON object per message:
//! `{"timestamp": 1234567890123, "theta_power": 12.5, "z_score": -0.8,
//!   "theta_state": "low", "signal_quality": 85}` with an optional
//! `simulated_theta_state` when the simulator forces a state.

use serde::{Deserialize, Serialize};

use crate::error::CalibrationError;
use crate::signal::SignalQuality;

/// Coarse theta band state relative to a baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThetaState {
    Low,
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFrame {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Theta band (4-8 Hz) power in µV²
    pub theta_power: f64,
    pub z_score: f64,
    pub theta_state: ThetaState,
    /// Signal quality score (0-100)
    pub signal_quality: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simulated_theta_state: Option<ThetaState>,
}

impl DeviceFrame {
    /// Decode one frame from its JSON text
    pub fn parse(text: &str) -> Result<Self, CalibrationError> {
        let frame: DeviceFrame =
            serde_json::from_str(text).map_err(|err| CalibrationError::MalformedFrame {
                reason: err.to_string(),
            })?;

        if !frame.signal_quality.is_finite() || !frame.theta_power.is_finite() {
            return Err(CalibrationError::MalformedFrame {
                reason: "non-finite metric".to_string(),
            });
        }

        Ok(frame)
    }

    pub fn to_json(&self) -> Result<String, CalibrationError> {
        serde_json::to_string(self).map_err(|err| CalibrationError::MalformedFrame {
            reason: err.to_string(),
        })
    }

    /// Signal-quality view of this frame, score clamped to 0-100
    pub fn signal(&self) -> SignalQuality {
        SignalQuality::from_score(self.signal_quality.clamp(0.0, 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simulator_frame() {
        let text = r#"{"timestamp": 1700000000000, "theta_power": 12.5, "z_score": -0.8,
                       "theta_state": "low", "signal_quality": 85.3}"#;
        let frame = DeviceFrame::parse(text).unwrap();
        assert_eq!(frame.timestamp, 1_700_000_000_000);
        assert_eq!(frame.theta_state, ThetaState::Low);
        assert!(frame.simulated_theta_state.is_none());
        assert_eq!(frame.signal().score, Some(85.3));
    }

    #[test]
    fn test_parse_forced_state() {
        let text = r#"{"timestamp": 1, "theta_power": 14.0, "z_score": 2.0,
                       "theta_state": "high", "signal_quality": 90,
                       "simulated_theta_state": "high"}"#;
        let frame = DeviceFrame::parse(text).unwrap();
        assert_eq!(frame.simulated_theta_state, Some(ThetaState::High));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = DeviceFrame::parse("{\"timestamp\": \"soon\"}").unwrap_err();
        assert!(matches!(err, CalibrationError::MalformedFrame { .. }));
    }

    #[test]
    fn test_signal_clamps_score() {
        let frame = DeviceFrame {
            timestamp: 0,
            theta_power: 10.0,
            z_score: 0.0,
            theta_state: ThetaState::Normal,
            signal_quality: 104.0,
            simulated_theta_state: None,
        };
        assert_eq!(frame.signal().score, Some(100.0));
        let json = frame.to_json().unwrap();
        assert!(!json.contains("simulated_theta_state"));
    }
}
