// Overall calibration lifecycle position
//
// The phase lives in the session collaborator; stages only request
// transitions at fixed points:
//   instructions -> countdown -> recording -> processing -> complete
// `cancelled` is never written by the stages themselves: cancelling resets
// the phase to `None`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationPhase {
    Instructions,
    Countdown,
    Recording,
    Processing,
    Complete,
    Cancelled,
}

impl CalibrationPhase {
    /// Next phase in the forward flow
    pub fn next(&self) -> Option<CalibrationPhase> {
        match self {
            CalibrationPhase::Instructions => Some(CalibrationPhase::Countdown),
            CalibrationPhase::Countdown => Some(CalibrationPhase::Recording),
            CalibrationPhase::Recording => Some(CalibrationPhase::Processing),
            CalibrationPhase::Processing => Some(CalibrationPhase::Complete),
            CalibrationPhase::Complete | CalibrationPhase::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CalibrationPhase::Complete | CalibrationPhase::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationPhase::Instructions => "instructions",
            CalibrationPhase::Countdown => "countdown",
            CalibrationPhase::Recording => "recording",
            CalibrationPhase::Processing => "processing",
            CalibrationPhase::Complete => "complete",
            CalibrationPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display helper for an optional phase
pub fn phase_name(phase: Option<CalibrationPhase>) -> &'static str {
    phase.map(|p| p.as_str()).unwrap_or("none")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_next() {
        assert_eq!(
            CalibrationPhase::Instructions.next(),
            Some(CalibrationPhase::Countdown)
        );
        assert_eq!(
            CalibrationPhase::Countdown.next(),
            Some(CalibrationPhase::Recording)
        );
        assert_eq!(
            CalibrationPhase::Recording.next(),
            Some(CalibrationPhase::Processing)
        );
        assert_eq!(
            CalibrationPhase::Processing.next(),
            Some(CalibrationPhase::Complete)
        );
        assert_eq!(CalibrationPhase::Complete.next(), None);
        assert_eq!(CalibrationPhase::Cancelled.next(), None);
    }

    #[test]
    fn test_phase_serde_names() {
        let json = serde_json::to_string(&CalibrationPhase::Processing).unwrap();
        assert_eq!(json, "\"processing\"");
        assert_eq!(phase_name(None), "none");
        assert_eq!(CalibrationPhase::Countdown.to_string(), "countdown");
    }
}
