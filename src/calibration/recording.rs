// Recording stage - baseline capture with signal sampling and auto-pause
//
// recording <-> paused        (manual)
// recording <-> auto_paused   (critical signal held for the auto-pause delay)
// recording --> complete      (elapsed reaches duration, or user finish)
// any non-terminal --> cancelled
//
// Two repeating timers run only while `recording`: the 1 Hz elapsed tick and
// the 2 Hz sample tick. A single one-shot auto-pause timer is armed when a
// sample classifies as critical and cancelled as soon as one does not, so a
// brief recovery restarts the window from zero.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::calibration::aggregate::{
    clean_percentage, CalibrationResultData, SignalQualitySample, SuccessCriteria,
};
use crate::calibration::display::{format_clock, progress_percent};
use crate::calibration::machine::{
    StageCommand, StageEffect, StageKind, StageMachine, StageSnapshot,
};
use crate::calibration::phase::CalibrationPhase;
use crate::calibration::timers::{ActiveTimers, TimerId, TimerKind};
use crate::config::{AppConfig, CalibrationConfig, TimingConfig};
use crate::device::SignalSource;
use crate::signal::{SignalClassification, SignalClassifier, SignalQuality};

type Effect = StageEffect<Arc<CalibrationResultData>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Recording,
    Paused,
    AutoPaused,
    Complete,
    Cancelled,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Recording => "recording",
            RecordingState::Paused => "paused",
            RecordingState::AutoPaused => "auto_paused",
            RecordingState::Complete => "complete",
            RecordingState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RecordingState::Complete | RecordingState::Cancelled)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self, RecordingState::Paused | RecordingState::AutoPaused)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    ElapsedTick,
    SampleTick {
        timestamp_ms: u64,
        reading: Option<SignalQuality>,
        theta_power: Option<f64>,
    },
    AutoPauseElapsed,
    Pause,
    Resume,
    Finish,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    pub state: RecordingState,
    pub elapsed_seconds: u32,
    pub duration_seconds: u32,
    pub progress_percent: f32,
    /// `MM:SS` rendering of the time left
    pub remaining_clock: String,
    pub sample_count: usize,
    pub clean_percentage: u8,
    pub auto_pause_count: u32,
    pub last_score: Option<f32>,
    pub last_signal: SignalClassification,
}

#[derive(Debug)]
pub struct RecordingMachine {
    state: RecordingState,
    duration_secs: u32,
    elapsed_secs: u32,
    samples: Vec<SignalQualitySample>,
    theta_powers: Vec<f64>,
    auto_pause_count: u32,
    last_score: Option<f32>,
    classifier: SignalClassifier,
    clean_threshold: f32,
    criteria: SuccessCriteria,
    timers: ActiveTimers,
    timing: TimingConfig,
    started: bool,
    result: Option<Arc<CalibrationResultData>>,
}

impl RecordingMachine {
    pub fn new(calibration: &CalibrationConfig, timing: TimingConfig) -> Self {
        Self {
            state: RecordingState::Recording,
            duration_secs: calibration.recording_secs,
            elapsed_secs: 0,
            samples: Vec::new(),
            theta_powers: Vec::new(),
            auto_pause_count: 0,
            last_score: None,
            classifier: SignalClassifier::new(calibration.critical_threshold),
            clean_threshold: calibration.clean_threshold,
            criteria: SuccessCriteria {
                min_duration_secs: calibration.min_recording_secs,
                min_clean_percentage: calibration.min_clean_percentage,
            },
            timers: ActiveTimers::new(),
            timing,
            started: false,
            result: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(&config.calibration, config.timing.clone())
    }

    /// Stage mounted: start both periodic tasks
    pub fn begin(&mut self) -> Vec<Effect> {
        if self.started || self.state.is_terminal() {
            return Vec::new();
        }
        self.started = true;
        tracing::info!(
            "[Recording] Started, duration {}s (minimum {}s)",
            self.duration_secs,
            self.criteria.min_duration_secs
        );
        self.start_periodic()
    }

    /// Transition function
    pub fn handle(&mut self, event: RecordingEvent) -> Vec<Effect> {
        if self.state.is_terminal() {
            tracing::debug!(
                "[Recording] Ignoring {:?} in terminal state {:?}",
                event,
                self.state
            );
            return Vec::new();
        }

        match (self.state, event) {
            (RecordingState::Recording, RecordingEvent::ElapsedTick) => {
                self.elapsed_secs = (self.elapsed_secs + 1).min(self.duration_secs);
                if self.elapsed_secs >= self.duration_secs {
                    self.complete()
                } else {
                    Vec::new()
                }
            }
            (
                RecordingState::Recording,
                RecordingEvent::SampleTick {
                    timestamp_ms,
                    reading,
                    theta_power,
                },
            ) => self.sample(timestamp_ms, reading, theta_power),
            (RecordingState::Recording, RecordingEvent::AutoPauseElapsed)
                if self.timers.is_active(TimerId::AutoPause) =>
            {
                self.timers.fired_once(TimerId::AutoPause);
                self.auto_pause_count += 1;
                self.state = RecordingState::AutoPaused;
                tracing::warn!(
                    "[Recording] Auto-paused at {}s after sustained critical signal (count {})",
                    self.elapsed_secs,
                    self.auto_pause_count
                );
                self.stop_periodic()
            }
            (RecordingState::Recording, RecordingEvent::Pause) => {
                self.state = RecordingState::Paused;
                tracing::info!("[Recording] Paused at {}s", self.elapsed_secs);
                self.stop_periodic()
            }
            (RecordingState::Paused | RecordingState::AutoPaused, RecordingEvent::Resume) => {
                tracing::info!(
                    "[Recording] Resumed from {} at {}s",
                    self.state.as_str(),
                    self.elapsed_secs
                );
                self.state = RecordingState::Recording;
                self.start_periodic()
            }
            (_, RecordingEvent::Finish) => {
                tracing::info!(
                    "[Recording] Finished early at {}s of {}s",
                    self.elapsed_secs,
                    self.duration_secs
                );
                self.complete()
            }
            (_, RecordingEvent::Cancel) => self.cancel(),
            (state, event) => {
                tracing::debug!("[Recording] Ignoring {:?} in {:?}", event, state);
                Vec::new()
            }
        }
    }

    fn sample(
        &mut self,
        timestamp_ms: u64,
        reading: Option<SignalQuality>,
        theta_power: Option<f64>,
    ) -> Vec<Effect> {
        let score = reading
            .and_then(|r| r.score)
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(0.0, 100.0));
        self.last_score = score;

        if let Some(score) = score {
            let is_clean = score >= self.clean_threshold;
            self.samples.push(SignalQualitySample {
                timestamp: timestamp_ms,
                score,
                is_clean,
            });
            if is_clean {
                if let Some(theta) = theta_power.filter(|t| t.is_finite()) {
                    self.theta_powers.push(theta);
                }
            }
        }

        let mut effects = Vec::new();
        if self.classifier.classify(score).is_critical {
            if !self.timers.is_active(TimerId::AutoPause) {
                tracing::warn!(
                    "[Recording] Critical signal at {}s, auto-pause armed",
                    self.elapsed_secs
                );
                effects.push(StageEffect::Timer(self.timers.start(
                    TimerId::AutoPause,
                    TimerKind::Once,
                    self.timing.auto_pause(),
                )));
            }
        } else if let Some(cmd) = self.timers.cancel(TimerId::AutoPause) {
            tracing::info!("[Recording] Signal recovered, auto-pause disarmed");
            effects.push(StageEffect::Timer(cmd));
        }
        effects
    }

    fn start_periodic(&mut self) -> Vec<Effect> {
        vec![
            StageEffect::Timer(self.timers.start(
                TimerId::ElapsedTick,
                TimerKind::Repeating,
                self.timing.tick(),
            )),
            StageEffect::Timer(self.timers.start(
                TimerId::SampleTick,
                TimerKind::Repeating,
                self.timing.sample(),
            )),
        ]
    }

    fn stop_periodic(&mut self) -> Vec<Effect> {
        self.timers
            .cancel_all()
            .into_iter()
            .map(StageEffect::Timer)
            .collect()
    }

    fn complete(&mut self) -> Vec<Effect> {
        self.state = RecordingState::Complete;
        let mut effects = self.stop_periodic();

        let result = Arc::new(CalibrationResultData::from_samples(
            self.duration_secs,
            self.elapsed_secs,
            std::mem::take(&mut self.samples),
            std::mem::take(&mut self.theta_powers),
            self.auto_pause_count,
            self.criteria,
        ));
        tracing::info!(
            "[Recording] Complete: {}s recorded, {} samples, clean {}%, avg quality {}, successful={}",
            result.recorded_duration,
            result.signal_quality_samples.len(),
            result.clean_data_percentage,
            result.average_signal_quality,
            result.was_successful
        );
        self.result = Some(Arc::clone(&result));

        effects.push(StageEffect::SetPhase(Some(CalibrationPhase::Processing)));
        effects.push(StageEffect::Completed(result));
        effects
    }

    fn cancel(&mut self) -> Vec<Effect> {
        self.state = RecordingState::Cancelled;
        tracing::info!("[Recording] Cancelled at {}s", self.elapsed_secs);
        let mut effects = self.stop_periodic();
        effects.push(StageEffect::SetPhase(None));
        effects.push(StageEffect::Cancelled);
        effects
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn elapsed_seconds(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn duration_seconds(&self) -> u32 {
        self.duration_secs
    }

    /// Samples collected so far; empty once the result has been built
    pub fn samples(&self) -> &[SignalQualitySample] {
        match &self.result {
            Some(result) => &result.signal_quality_samples,
            None => &self.samples,
        }
    }

    pub fn auto_pause_count(&self) -> u32 {
        self.auto_pause_count
    }

    pub fn result(&self) -> Option<&Arc<CalibrationResultData>> {
        self.result.as_ref()
    }

    pub fn active_timers(&self) -> &[TimerId] {
        self.timers.ids()
    }

    pub fn progress_percent(&self) -> f32 {
        progress_percent(self.elapsed_secs, self.duration_secs)
    }
}

impl StageMachine for RecordingMachine {
    type Output = Arc<CalibrationResultData>;

    fn kind(&self) -> StageKind {
        StageKind::Recording
    }

    fn start(&mut self) -> Vec<Effect> {
        self.begin()
    }

    fn on_timer(&mut self, timer: TimerId, device: &dyn SignalSource, now_ms: u64) -> Vec<Effect> {
        if !self.timers.is_active(timer) {
            return Vec::new();
        }
        match timer {
            TimerId::ElapsedTick => self.handle(RecordingEvent::ElapsedTick),
            TimerId::SampleTick => self.handle(RecordingEvent::SampleTick {
                timestamp_ms: now_ms,
                reading: device.current_signal_quality(),
                theta_power: device.current_theta_power(),
            }),
            TimerId::AutoPause => self.handle(RecordingEvent::AutoPauseElapsed),
            other => {
                tracing::warn!("[Recording] Unexpected timer {:?}", other);
                Vec::new()
            }
        }
    }

    fn on_command(&mut self, command: StageCommand) -> Vec<Effect> {
        match command {
            StageCommand::Pause => self.handle(RecordingEvent::Pause),
            StageCommand::Resume => self.handle(RecordingEvent::Resume),
            StageCommand::Cancel => self.handle(RecordingEvent::Cancel),
            StageCommand::Finish => self.handle(RecordingEvent::Finish),
        }
    }

    fn teardown(&mut self) -> Vec<Effect> {
        self.stop_periodic()
    }

    fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn snapshot(&self) -> StageSnapshot {
        StageSnapshot::Recording(RecordingSnapshot {
            state: self.state,
            elapsed_seconds: self.elapsed_secs,
            duration_seconds: self.duration_secs,
            progress_percent: self.progress_percent(),
            remaining_clock: format_clock(self.duration_secs.saturating_sub(self.elapsed_secs)),
            sample_count: self.samples().len(),
            clean_percentage: clean_percentage(self.samples()),
            auto_pause_count: self.auto_pause_count,
            last_score: self.last_score,
            last_signal: self.classifier.classify(self.last_score),
        })
    }
}

#[cfg(test)]
#[path = "recording_tests.rs"]
mod tests;
