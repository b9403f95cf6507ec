// Shared stage state-machine contract
//
// A stage is a plain struct whose transition functions return a list of
// effects. Drivers (the tokio driver and the virtual-time test runner)
// execute those effects: they start/cancel timers, write the session phase
// and fire the stage callbacks. The machines themselves perform no I/O.

use serde::{Deserialize, Serialize};

use crate::calibration::countdown::CountdownSnapshot;
use crate::calibration::phase::CalibrationPhase;
use crate::calibration::recording::RecordingSnapshot;
use crate::calibration::timers::{TimerCommand, TimerId};
use crate::device::{SessionSink, SignalSource};

/// Side effect requested by a stage transition
#[derive(Debug, Clone, PartialEq)]
pub enum StageEffect<T> {
    Timer(TimerCommand),
    /// Write the overall phase, `None` resets it
    SetPhase(Option<CalibrationPhase>),
    /// Stage reached `complete`; carries the hand-off payload
    Completed(T),
    /// Stage reached `cancelled`
    Cancelled,
}

/// User-initiated stage commands (cancel arrives after the shell confirmed it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageCommand {
    Pause,
    Resume,
    Cancel,
    /// End recording early with what has been collected
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Countdown,
    Recording,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Countdown => "countdown",
            StageKind::Recording => "recording",
        }
    }
}

/// Point-in-time view of a running stage, published to UI subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageSnapshot {
    Countdown(CountdownSnapshot),
    Recording(RecordingSnapshot),
}

impl StageSnapshot {
    pub fn kind(&self) -> StageKind {
        match self {
            StageSnapshot::Countdown(_) => StageKind::Countdown,
            StageSnapshot::Recording(_) => StageKind::Recording,
        }
    }

    /// Name of the stage-local state, for transition logging
    pub fn state_name(&self) -> &'static str {
        match self {
            StageSnapshot::Countdown(s) => s.state.as_str(),
            StageSnapshot::Recording(s) => s.state.as_str(),
        }
    }
}

/// How a stage instance ended
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome<T> {
    Completed(T),
    Cancelled,
    /// Torn down (unmounted) before reaching a terminal state
    Abandoned,
}

impl<T> StageOutcome<T> {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageOutcome::Completed(_) => "completed",
            StageOutcome::Cancelled => "cancelled",
            StageOutcome::Abandoned => "abandoned",
        }
    }
}

/// Stage contract executed by the drivers
pub trait StageMachine: Send + 'static {
    /// Payload handed to the next stage on completion
    type Output: Clone + Send + 'static;

    fn kind(&self) -> StageKind;

    /// Stage mounted
    fn start(&mut self) -> Vec<StageEffect<Self::Output>>;

    /// A timer fired; `device` is read for sampling timers
    fn on_timer(
        &mut self,
        timer: TimerId,
        device: &dyn SignalSource,
        now_ms: u64,
    ) -> Vec<StageEffect<Self::Output>>;

    fn on_command(&mut self, command: StageCommand) -> Vec<StageEffect<Self::Output>>;

    /// Stage unmounted; must cancel every outstanding timer
    fn teardown(&mut self) -> Vec<StageEffect<Self::Output>>;

    fn is_terminal(&self) -> bool;

    fn snapshot(&self) -> StageSnapshot;
}

type CompleteFn<T> = Box<dyn FnOnce(T) + Send>;
type CancelFn = Box<dyn FnOnce() + Send>;

/// Optional completion/cancel callbacks, each invoked at most once
pub struct StageCallbacks<T> {
    on_complete: Option<CompleteFn<T>>,
    on_cancel: Option<CancelFn>,
}

impl<T> Default for StageCallbacks<T> {
    fn default() -> Self {
        Self {
            on_complete: None,
            on_cancel: None,
        }
    }
}

impl<T> StageCallbacks<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, f: impl FnOnce(T) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_cancel(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_cancel = Some(Box::new(f));
        self
    }

    fn fire_complete(&mut self, value: T) {
        if let Some(cb) = self.on_complete.take() {
            cb(value);
        }
    }

    fn fire_cancel(&mut self) {
        if let Some(cb) = self.on_cancel.take() {
            cb();
        }
    }
}

/// Execute a non-timer effect, handing timer commands back to the driver
///
/// Phase writes that would not change the session phase are skipped.
pub fn apply_effect<T: Clone>(
    effect: StageEffect<T>,
    session: &dyn SessionSink,
    callbacks: &mut StageCallbacks<T>,
    outcome: &mut Option<StageOutcome<T>>,
) -> Option<TimerCommand> {
    match effect {
        StageEffect::Timer(command) => Some(command),
        StageEffect::SetPhase(phase) => {
            if session.calibration_phase() != phase {
                session.set_calibration_phase(phase);
            }
            None
        }
        StageEffect::Completed(value) => {
            callbacks.fire_complete(value.clone());
            *outcome = Some(StageOutcome::Completed(value));
            None
        }
        StageEffect::Cancelled => {
            callbacks.fire_cancel();
            *outcome = Some(StageOutcome::Cancelled);
            None
        }
    }
}
