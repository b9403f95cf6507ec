// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use crate::calibration::StageSnapshot;
use crate::error::CalibrationError;
use crate::managers::session_manager::PhaseChange;

type Slot<T> = Arc<Mutex<Option<broadcast::Sender<T>>>>;

/// Manages the broadcast channels UI shells subscribe to
///
/// This manager centralizes broadcast channel creation, storage, and
/// subscription handling:
/// - Initializing broadcast channels with appropriate buffer sizes
/// - Subscribing to broadcast channels for multiple consumers
///
/// # Channel Types
/// - Stage snapshots: countdown/recording state after every stage event
/// - Phase changes: overall calibration phase transitions
pub struct BroadcastChannelManager {
    stage: Slot<StageSnapshot>,
    phase: Slot<PhaseChange>,
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            stage: Arc::new(Mutex::new(None)),
            phase: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // STAGE SNAPSHOT CHANNEL
    // ========================================================================

    /// Initialize stage snapshot broadcast channel
    ///
    /// Returns sender for the stage drivers to publish snapshots.
    ///
    /// # Notes
    /// - Buffer size: 64 messages (a recording publishes ~3 per second)
    /// - Old messages dropped if buffer fills (lagged subscribers)
    pub fn init_stage(&self) -> Result<broadcast::Sender<StageSnapshot>, CalibrationError> {
        init(&self.stage, 64)
    }

    /// Subscribe to stage snapshots
    ///
    /// Returns `Ok(None)` if init_stage() has not been called yet.
    pub fn subscribe_stage(
        &self,
    ) -> Result<Option<broadcast::Receiver<StageSnapshot>>, CalibrationError> {
        subscribe(&self.stage)
    }

    /// Sender for the stage channel, if initialized
    pub fn stage_sender(&self) -> Result<Option<broadcast::Sender<StageSnapshot>>, CalibrationError> {
        Ok(lock(&self.stage)?.clone())
    }

    // ========================================================================
    // PHASE CHANNEL
    // ========================================================================

    /// Initialize phase change broadcast channel
    ///
    /// # Notes
    /// - Buffer size: 16 messages (a full flow writes at most 6 phases)
    pub fn init_phase(&self) -> Result<broadcast::Sender<PhaseChange>, CalibrationError> {
        init(&self.phase, 16)
    }

    /// Subscribe to phase changes
    ///
    /// Returns `Ok(None)` if init_phase() has not been called yet.
    pub fn subscribe_phase(
        &self,
    ) -> Result<Option<broadcast::Receiver<PhaseChange>>, CalibrationError> {
        subscribe(&self.phase)
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(slot: &Slot<T>) -> Result<MutexGuard<'_, Option<broadcast::Sender<T>>>, CalibrationError> {
    slot.lock().map_err(|_| CalibrationError::StatePoisoned)
}

fn init<T: Clone>(slot: &Slot<T>, capacity: usize) -> Result<broadcast::Sender<T>, CalibrationError> {
    let (tx, _) = broadcast::channel(capacity);
    *lock(slot)? = Some(tx.clone());
    Ok(tx)
}

fn subscribe<T: Clone>(slot: &Slot<T>) -> Result<Option<broadcast::Receiver<T>>, CalibrationError> {
    Ok(lock(slot)?.as_ref().map(|tx| tx.subscribe()))
}
