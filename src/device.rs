// Collaborator interfaces injected into the calibration stages
//
// The stages never reach for ambient state: the shell hands them a
// `SignalSource` (headset readings) and a `SessionSink` (phase + persistence).

use serde::{Deserialize, Serialize};

use crate::calibration::{BaselineProfile, CalibrationPhase};
use crate::error::CalibrationError;
use crate::signal::SignalQuality;

/// Read-only view of the headset
pub trait SignalSource: Send + Sync {
    /// Latest signal-quality reading, `None` while nothing has arrived
    fn current_signal_quality(&self) -> Option<SignalQuality>;

    fn is_connected(&self) -> bool;

    /// Latest theta band power, if the headset reports one
    fn current_theta_power(&self) -> Option<f64> {
        None
    }
}

/// Session-wide state owned outside the calibration core
pub trait SessionSink: Send + Sync {
    fn calibration_phase(&self) -> Option<CalibrationPhase>;

    /// `None` resets the flow
    fn set_calibration_phase(&self, phase: Option<CalibrationPhase>);

    /// Store session configuration for the closed-loop session that follows
    fn set_session_config(&self, config: SessionConfig);

    /// Persist a finalized baseline
    fn save_baseline(&self, baseline: BaselineProfile) -> Result<(), CalibrationError>;
}

/// Session parameters passed through to the session collaborator untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub duration_minutes: u32,
    /// Isochronic tone pulse rate
    pub entrainment_frequency_hz: f32,
    /// Audible carrier tone
    pub carrier_frequency_hz: f32,
    /// 0.0 - 1.0
    pub volume: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: 20,
            entrainment_frequency_hz: 6.0,
            carrier_frequency_hz: 440.0,
            volume: 0.5,
        }
    }
}
