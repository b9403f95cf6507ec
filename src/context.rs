// FlowContext: Dependency Injection Container
// Owns the configuration and the injected collaborators for one calibration flow

use std::sync::Arc;

use futures::stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

use crate::calibration::{
    phase_name, readiness_with_threshold, spawn_stage, summarize, BaselineProfile,
    CalibrationPhase, CalibrationResultData, CalibrationSummary, CountdownMachine, Readiness,
    RecordingMachine, StageCallbacks, StageHandle, StageSnapshot,
};
use crate::config::AppConfig;
use crate::device::{SessionConfig, SessionSink, SignalSource};
use crate::error::{log_calibration_error, CalibrationError};
use crate::managers::{BroadcastChannelManager, InMemorySession, PhaseChange};
use crate::signal::{SignalClassification, SignalClassifier};

/// FlowContext: Dependency injection container for the calibration flow
///
/// Sequences Instructions -> Countdown -> Recording -> Summary:
/// - validates the configuration once, at construction
/// - enforces the readiness gate before the countdown
/// - checks the session phase before each stage starts
/// - persists the baseline through the session collaborator
///
/// The `prepare_*` methods perform the checks and phase writes and return
/// the stage machine, so callers can run it on the tokio driver
/// (`start_*`) or on a `VirtualRunner`.
pub struct FlowContext {
    config: AppConfig,
    classifier: SignalClassifier,
    device: Arc<dyn SignalSource>,
    session: Arc<dyn SessionSink>,
    broadcasts: BroadcastChannelManager,
}

impl FlowContext {
    /// Create a FlowContext around injected collaborators
    ///
    /// # Errors
    /// - `InvalidConfig` if the configuration fails validation
    pub fn new(
        config: AppConfig,
        device: Arc<dyn SignalSource>,
        session: Arc<dyn SessionSink>,
    ) -> Result<Self, CalibrationError> {
        // Phase changes of an injected session are not observable here
        let broadcasts = BroadcastChannelManager::new();
        broadcasts.init_stage()?;
        Self::build(config, device, session, broadcasts)
    }

    /// Create a FlowContext with an in-memory session wired to the phase channel
    pub fn in_memory(
        config: AppConfig,
        device: Arc<dyn SignalSource>,
    ) -> Result<(Self, Arc<InMemorySession>), CalibrationError> {
        let broadcasts = BroadcastChannelManager::new();
        broadcasts.init_stage()?;
        let phase_tx = broadcasts.init_phase()?;
        let session = Arc::new(InMemorySession::new().with_phase_channel(phase_tx));

        let ctx = Self::build(config, device, session.clone(), broadcasts)?;
        Ok((ctx, session))
    }

    fn build(
        config: AppConfig,
        device: Arc<dyn SignalSource>,
        session: Arc<dyn SessionSink>,
        broadcasts: BroadcastChannelManager,
    ) -> Result<Self, CalibrationError> {
        config.validate().inspect_err(|err| {
            log_calibration_error(err, "flow_context_new");
        })?;

        Ok(Self {
            classifier: SignalClassifier::new(config.calibration.critical_threshold),
            config,
            device,
            session,
            broadcasts,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn phase(&self) -> Option<CalibrationPhase> {
        self.session.calibration_phase()
    }

    // ========================================================================
    // INSTRUCTIONS
    // ========================================================================

    /// Show the instructions screen
    pub fn enter_instructions(&self) {
        self.set_phase(Some(CalibrationPhase::Instructions));
    }

    /// Classify the device's current reading
    pub fn signal(&self) -> SignalClassification {
        let score = self.device.current_signal_quality().and_then(|q| q.score);
        self.classifier.classify(score)
    }

    /// Readiness gate for the current device state
    pub fn readiness(&self) -> Readiness {
        let score = self.device.current_signal_quality().and_then(|q| q.score);
        readiness_with_threshold(
            self.device.is_connected(),
            score,
            self.classifier.critical_threshold(),
        )
    }

    // ========================================================================
    // COUNTDOWN
    // ========================================================================

    /// Check the gate, enter the countdown phase and build the stage
    ///
    /// # Errors
    /// - `InvalidPhase` unless the flow is idle or on the instructions screen
    /// - `NotReady` if the readiness gate fails
    pub fn prepare_countdown(&self) -> Result<CountdownMachine, CalibrationError> {
        let phase = self.phase();
        if !matches!(phase, None | Some(CalibrationPhase::Instructions)) {
            let err = CalibrationError::InvalidPhase {
                expected: CalibrationPhase::Instructions.as_str().to_string(),
                actual: phase_name(phase).to_string(),
            };
            log_calibration_error(&err, "start_countdown");
            return Err(err);
        }

        self.readiness().into_result().inspect_err(|err| {
            log_calibration_error(err, "start_countdown");
        })?;

        self.set_phase(Some(CalibrationPhase::Countdown));
        Ok(CountdownMachine::from_config(&self.config))
    }

    /// Gate, then run the countdown on the tokio driver
    pub fn start_countdown(
        &self,
        callbacks: StageCallbacks<()>,
    ) -> Result<StageHandle<()>, CalibrationError> {
        let machine = self.prepare_countdown()?;
        Ok(spawn_stage(
            machine,
            Arc::clone(&self.device),
            Arc::clone(&self.session),
            callbacks,
            self.broadcasts.stage_sender()?,
        ))
    }

    // ========================================================================
    // RECORDING
    // ========================================================================

    /// Build the recording stage; the countdown must have completed
    ///
    /// # Errors
    /// - `InvalidPhase` unless the session phase is `recording`
    pub fn prepare_recording(&self) -> Result<RecordingMachine, CalibrationError> {
        let phase = self.phase();
        if phase != Some(CalibrationPhase::Recording) {
            let err = CalibrationError::InvalidPhase {
                expected: CalibrationPhase::Recording.as_str().to_string(),
                actual: phase_name(phase).to_string(),
            };
            log_calibration_error(&err, "start_recording");
            return Err(err);
        }
        Ok(RecordingMachine::from_config(&self.config))
    }

    pub fn start_recording(
        &self,
        callbacks: StageCallbacks<Arc<CalibrationResultData>>,
    ) -> Result<StageHandle<Arc<CalibrationResultData>>, CalibrationError> {
        let machine = self.prepare_recording()?;
        Ok(spawn_stage(
            machine,
            Arc::clone(&self.device),
            Arc::clone(&self.session),
            callbacks,
            self.broadcasts.stage_sender()?,
        ))
    }

    // ========================================================================
    // SUMMARY
    // ========================================================================

    pub fn summarize(&self, result: Arc<CalibrationResultData>) -> CalibrationSummary {
        summarize(result, self.config.calibration.baseline_min_samples)
    }

    /// Persist the summary's baseline and mark the flow complete
    ///
    /// # Errors
    /// - `InvalidPhase` unless the session phase is `processing`
    /// - `CannotSave` unless the summary allows saving
    /// - whatever the session collaborator reports when persisting
    pub fn save_baseline(
        &self,
        summary: &CalibrationSummary,
    ) -> Result<BaselineProfile, CalibrationError> {
        let phase = self.phase();
        if phase != Some(CalibrationPhase::Processing) {
            let err = CalibrationError::InvalidPhase {
                expected: CalibrationPhase::Processing.as_str().to_string(),
                actual: phase_name(phase).to_string(),
            };
            log_calibration_error(&err, "save_baseline");
            return Err(err);
        }

        let baseline = summary.saveable_baseline().inspect_err(|err| {
            log_calibration_error(err, "save_baseline");
        })?;

        self.session.save_baseline(baseline.clone())?;
        self.set_phase(Some(CalibrationPhase::Complete));
        tracing::info!("[FlowContext] Baseline saved, calibration complete");
        Ok(baseline.clone())
    }

    /// Discard the result and return to the instructions screen
    pub fn recalibrate(&self) {
        tracing::info!("[FlowContext] Recalibrating");
        self.set_phase(Some(CalibrationPhase::Instructions));
    }

    /// Pass session parameters through to the session collaborator
    pub fn configure_session(&self, config: SessionConfig) {
        self.session.set_session_config(config);
    }

    // ========================================================================
    // STREAM METHODS
    // ========================================================================

    /// Stream of stage snapshots from every stage this context starts
    ///
    /// Lagged snapshots are skipped; the stream ends when the context is dropped.
    pub fn stage_stream(&self) -> Result<impl futures::Stream<Item = StageSnapshot>, CalibrationError> {
        let rx = self.broadcasts.subscribe_stage()?;
        Ok(match rx {
            Some(rx) => BroadcastStream::new(rx)
                .filter_map(|item| async move { item.ok() })
                .boxed(),
            None => futures::stream::empty().boxed(),
        })
    }

    /// Stream of phase changes
    ///
    /// Only contexts built with `in_memory` publish phases; for an injected
    /// session the stream is empty.
    pub fn phase_stream(&self) -> Result<impl futures::Stream<Item = PhaseChange>, CalibrationError> {
        let rx = self.broadcasts.subscribe_phase()?;
        Ok(match rx {
            Some(rx) => BroadcastStream::new(rx)
                .filter_map(|item| async move { item.ok() })
                .boxed(),
            None => futures::stream::empty().boxed(),
        })
    }

    fn set_phase(&self, phase: Option<CalibrationPhase>) {
        if self.session.calibration_phase() != phase {
            self.session.set_calibration_phase(phase);
        }
    }
}
