// Managers Module
//
// Focused managers owned by FlowContext, one concern each:
// - InMemorySession: calibration phase, session config and saved baseline
// - BroadcastChannelManager: Tokio broadcast channel management

pub mod broadcast_manager;
pub mod session_manager;

pub use broadcast_manager::BroadcastChannelManager;
pub use session_manager::{InMemorySession, PhaseChange};
