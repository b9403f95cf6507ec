// Calibration module - guided baseline calibration flow
//
// The flow runs Instructions -> Countdown -> Recording -> Summary:
// 1. readiness: pure gate checked before the countdown may start
// 2. countdown / recording: stage state machines emitting effects
// 3. aggregate / baseline / summary: result built once recording completes
// 4. driver: tokio executor for the stage machines

pub mod aggregate;
pub mod baseline;
pub mod countdown;
pub mod display;
pub mod driver;
pub mod machine;
pub mod phase;
pub mod readiness;
pub mod recording;
pub mod summary;
pub mod timers;

pub use aggregate::{
    average_quality, clean_percentage, CalibrationResultData, SignalQualitySample,
    SuccessCriteria,
};
pub use baseline::BaselineProfile;
pub use countdown::{CountdownMachine, CountdownSnapshot, CountdownState};
pub use display::{format_clock, progress_percent};
pub use driver::{spawn_stage, StageHandle};
pub use machine::{
    StageCallbacks, StageCommand, StageEffect, StageKind, StageMachine, StageOutcome,
    StageSnapshot,
};
pub use phase::{phase_name, CalibrationPhase};
pub use readiness::{readiness, readiness_with_threshold, NotReadyReason, Readiness};
pub use recording::{RecordingMachine, RecordingSnapshot, RecordingState};
pub use summary::{evaluate, summarize, CalibrationQualityLevel, CalibrationSummary, SummaryAction};
pub use timers::{ActiveTimers, TimerCommand, TimerId, TimerKind};
