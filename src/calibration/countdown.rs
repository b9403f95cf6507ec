// Countdown stage - settle timer between instructions and recording
//
// waiting --(start delay)--> counting --(remaining hits 0)--> complete
//                               |
//                               +--(cancel)--> cancelled
//
// Pause/resume only stop and restart the tick; the state stays `counting`
// and `remaining_seconds` is preserved.

use serde::{Deserialize, Serialize};

use crate::calibration::display::{format_clock, progress_percent};
use crate::calibration::machine::{
    StageCommand, StageEffect, StageKind, StageMachine, StageSnapshot,
};
use crate::calibration::phase::CalibrationPhase;
use crate::calibration::timers::{ActiveTimers, TimerId, TimerKind};
use crate::config::{AppConfig, TimingConfig};
use crate::device::SignalSource;

type Effect = StageEffect<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownState {
    Waiting,
    Counting,
    Complete,
    Cancelled,
}

impl CountdownState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountdownState::Waiting => "waiting",
            CountdownState::Counting => "counting",
            CountdownState::Complete => "complete",
            CountdownState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CountdownState::Complete | CountdownState::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownEvent {
    StartDelayElapsed,
    Tick,
    Pause,
    Resume,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountdownSnapshot {
    pub state: CountdownState,
    pub remaining_seconds: u32,
    pub total_seconds: u32,
    pub is_paused: bool,
    pub progress_percent: f32,
    /// `MM:SS` rendering of `remaining_seconds`
    pub clock: String,
}

#[derive(Debug)]
pub struct CountdownMachine {
    state: CountdownState,
    total_seconds: u32,
    remaining_seconds: u32,
    paused: bool,
    activated: bool,
    timers: ActiveTimers,
    timing: TimingConfig,
}

impl CountdownMachine {
    pub fn new(total_seconds: u32, timing: TimingConfig) -> Self {
        Self {
            state: CountdownState::Waiting,
            total_seconds,
            remaining_seconds: total_seconds,
            paused: false,
            activated: false,
            timers: ActiveTimers::new(),
            timing,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.calibration.countdown_secs, config.timing.clone())
    }

    /// Stage mounted: arm the start delay
    pub fn activate(&mut self) -> Vec<Effect> {
        if self.activated || self.state != CountdownState::Waiting {
            return Vec::new();
        }
        self.activated = true;
        vec![StageEffect::Timer(self.timers.start(
            TimerId::StartDelay,
            TimerKind::Once,
            self.timing.start_delay(),
        ))]
    }

    /// Transition function
    pub fn handle(&mut self, event: CountdownEvent) -> Vec<Effect> {
        if self.state.is_terminal() {
            tracing::debug!(
                "[Countdown] Ignoring {:?} in terminal state {:?}",
                event,
                self.state
            );
            return Vec::new();
        }

        match (self.state, event) {
            (CountdownState::Waiting, CountdownEvent::StartDelayElapsed) => {
                self.timers.fired_once(TimerId::StartDelay);
                self.begin_counting()
            }
            (CountdownState::Counting, CountdownEvent::Tick) if !self.paused => self.tick(),
            (CountdownState::Counting, CountdownEvent::Pause) if !self.paused => {
                self.paused = true;
                tracing::info!(
                    "[Countdown] Paused with {}s remaining",
                    self.remaining_seconds
                );
                self.timers
                    .cancel(TimerId::CountdownTick)
                    .map(StageEffect::Timer)
                    .into_iter()
                    .collect()
            }
            (CountdownState::Counting, CountdownEvent::Resume) if self.paused => {
                self.paused = false;
                tracing::info!(
                    "[Countdown] Resumed with {}s remaining",
                    self.remaining_seconds
                );
                vec![StageEffect::Timer(self.timers.start(
                    TimerId::CountdownTick,
                    TimerKind::Repeating,
                    self.timing.tick(),
                ))]
            }
            (_, CountdownEvent::Cancel) => self.cancel(),
            (state, event) => {
                tracing::debug!("[Countdown] Ignoring {:?} in {:?}", event, state);
                Vec::new()
            }
        }
    }

    fn begin_counting(&mut self) -> Vec<Effect> {
        self.state = CountdownState::Counting;
        tracing::info!("[Countdown] Counting down from {}s", self.remaining_seconds);
        if self.remaining_seconds == 0 {
            return self.complete();
        }
        vec![StageEffect::Timer(self.timers.start(
            TimerId::CountdownTick,
            TimerKind::Repeating,
            self.timing.tick(),
        ))]
    }

    fn tick(&mut self) -> Vec<Effect> {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        if self.remaining_seconds == 0 {
            self.complete()
        } else {
            Vec::new()
        }
    }

    fn complete(&mut self) -> Vec<Effect> {
        self.state = CountdownState::Complete;
        tracing::info!("[Countdown] Complete, handing off to recording");
        let mut effects: Vec<Effect> = self
            .timers
            .cancel_all()
            .into_iter()
            .map(StageEffect::Timer)
            .collect();
        effects.push(StageEffect::SetPhase(Some(CalibrationPhase::Recording)));
        effects.push(StageEffect::Completed(()));
        effects
    }

    fn cancel(&mut self) -> Vec<Effect> {
        self.state = CountdownState::Cancelled;
        tracing::info!(
            "[Countdown] Cancelled with {}s remaining",
            self.remaining_seconds
        );
        let mut effects: Vec<Effect> = self
            .timers
            .cancel_all()
            .into_iter()
            .map(StageEffect::Timer)
            .collect();
        effects.push(StageEffect::SetPhase(None));
        effects.push(StageEffect::Cancelled);
        effects
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    pub fn total_seconds(&self) -> u32 {
        self.total_seconds
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn progress_percent(&self) -> f32 {
        progress_percent(
            self.total_seconds.saturating_sub(self.remaining_seconds),
            self.total_seconds,
        )
    }

    pub fn active_timers(&self) -> &[TimerId] {
        self.timers.ids()
    }
}

impl StageMachine for CountdownMachine {
    type Output = ();

    fn kind(&self) -> StageKind {
        StageKind::Countdown
    }

    fn start(&mut self) -> Vec<Effect> {
        self.activate()
    }

    fn on_timer(&mut self, timer: TimerId, _device: &dyn SignalSource, _now_ms: u64) -> Vec<Effect> {
        if !self.timers.is_active(timer) {
            return Vec::new();
        }
        match timer {
            TimerId::StartDelay => self.handle(CountdownEvent::StartDelayElapsed),
            TimerId::CountdownTick => self.handle(CountdownEvent::Tick),
            other => {
                tracing::warn!("[Countdown] Unexpected timer {:?}", other);
                Vec::new()
            }
        }
    }

    fn on_command(&mut self, command: StageCommand) -> Vec<Effect> {
        match command {
            StageCommand::Pause => self.handle(CountdownEvent::Pause),
            StageCommand::Resume => self.handle(CountdownEvent::Resume),
            StageCommand::Cancel => self.handle(CountdownEvent::Cancel),
            StageCommand::Finish => Vec::new(),
        }
    }

    fn teardown(&mut self) -> Vec<Effect> {
        self.timers
            .cancel_all()
            .into_iter()
            .map(StageEffect::Timer)
            .collect()
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn snapshot(&self) -> StageSnapshot {
        StageSnapshot::Countdown(CountdownSnapshot {
            state: self.state,
            remaining_seconds: self.remaining_seconds,
            total_seconds: self.total_seconds,
            is_paused: self.paused,
            progress_percent: self.progress_percent(),
            clock: format_clock(self.remaining_seconds),
        })
    }
}
