// InMemorySession: session collaborator kept in process memory
//
// Single Responsibility: Calibration phase, session configuration and saved
// baseline for one user session

use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

use serde::{Deserialize, Serialize};

use crate::calibration::{phase_name, BaselineProfile, CalibrationPhase};
use crate::device::{SessionConfig, SessionSink};
use crate::error::{log_calibration_error, CalibrationError};

/// Phase change published to UI subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub from: Option<CalibrationPhase>,
    pub to: Option<CalibrationPhase>,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: Option<CalibrationPhase>,
    history: Vec<Option<CalibrationPhase>>,
    config: Option<SessionConfig>,
    baseline: Option<BaselineProfile>,
}

/// Session collaborator backed by an `RwLock`
///
/// Every phase write is recorded in order, which lets tests assert the exact
/// sequence of transitions a flow produced. Phase changes are also published
/// on an optional broadcast channel and to the telemetry hub.
///
/// # Example
/// ```ignore
/// let session = InMemorySession::new();
/// session.set_calibration_phase(Some(CalibrationPhase::Instructions));
/// assert_eq!(session.phase_history(), vec![Some(CalibrationPhase::Instructions)]);
/// ```
#[derive(Clone, Default)]
pub struct InMemorySession {
    state: Arc<RwLock<SessionState>>,
    phase_tx: Option<broadcast::Sender<PhaseChange>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish every phase change on `tx`
    pub fn with_phase_channel(mut self, tx: broadcast::Sender<PhaseChange>) -> Self {
        self.phase_tx = Some(tx);
        self
    }

    /// Every phase written so far, oldest first
    pub fn phase_history(&self) -> Vec<Option<CalibrationPhase>> {
        self.read_state()
            .map(|state| state.history.clone())
            .unwrap_or_else(|err| {
                log_calibration_error(&err, "phase_history");
                Vec::new()
            })
    }

    pub fn session_config(&self) -> Result<Option<SessionConfig>, CalibrationError> {
        Ok(self.read_state()?.config.clone())
    }

    pub fn saved_baseline(&self) -> Result<Option<BaselineProfile>, CalibrationError> {
        Ok(self.read_state()?.baseline.clone())
    }

    // ========================================================================
    // HELPER METHODS - Lock management
    // ========================================================================

    /// Safely acquire read lock on session state
    fn read_state(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, SessionState>, CalibrationError> {
        self.state
            .read()
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    /// Safely acquire write lock on session state
    fn write_state(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, SessionState>, CalibrationError> {
        self.state
            .write()
            .map_err(|_| CalibrationError::StatePoisoned)
    }

    fn write_phase(&self, phase: Option<CalibrationPhase>) -> Result<PhaseChange, CalibrationError> {
        let mut state = self.write_state()?;
        let change = PhaseChange {
            from: state.phase,
            to: phase,
        };
        state.phase = phase;
        state.history.push(phase);
        Ok(change)
    }
}

impl SessionSink for InMemorySession {
    fn calibration_phase(&self) -> Option<CalibrationPhase> {
        self.read_state()
            .map(|state| state.phase)
            .unwrap_or_else(|err| {
                log_calibration_error(&err, "calibration_phase");
                None
            })
    }

    fn set_calibration_phase(&self, phase: Option<CalibrationPhase>) {
        match self.write_phase(phase) {
            Ok(change) => {
                tracing::info!(
                    "[Session] Phase {} -> {}",
                    phase_name(change.from),
                    phase_name(change.to)
                );
                crate::telemetry::hub().record_phase_change(change.from, change.to);
                if let Some(tx) = &self.phase_tx {
                    // No subscribers is fine
                    let _ = tx.send(change);
                }
            }
            Err(err) => log_calibration_error(&err, "set_calibration_phase"),
        }
    }

    fn set_session_config(&self, config: SessionConfig) {
        match self.write_state() {
            Ok(mut state) => state.config = Some(config),
            Err(err) => log_calibration_error(&err, "set_session_config"),
        }
    }

    fn save_baseline(&self, baseline: BaselineProfile) -> Result<(), CalibrationError> {
        let mut state = self.write_state().inspect_err(|err| {
            log_calibration_error(err, "save_baseline");
        })?;
        tracing::info!(
            "[Session] Baseline saved: mean={:.3} std={:.3} quality={}",
            baseline.theta_mean,
            baseline.theta_std,
            baseline.quality_score
        );
        state.baseline = Some(baseline);
        Ok(())
    }
}
