//! Telemetry event types describing calibration-flow activity exposed to
//! the CLI and flutter_rust_bridge streams.

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationPhase, StageKind};
use crate::signal::SignalLevel;

/// Metric events covering stage lifecycles, phase changes and signal gauges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetricEvent {
    StageTransition {
        stage: StageKind,
        from: String,
        to: String,
        timestamp_ms: u64,
    },
    PhaseChanged {
        from: Option<CalibrationPhase>,
        to: Option<CalibrationPhase>,
        timestamp_ms: u64,
    },
    StageFinished {
        stage: StageKind,
        outcome: String,
    },
    SignalScore {
        score: f32,
        rolling_avg: f32,
        sample_count: usize,
        level: SignalLevel,
    },
    Error {
        code: i32,
        context: String,
    },
}
