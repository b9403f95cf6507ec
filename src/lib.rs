// Flowstate Calibration Core - baseline calibration for a consumer EEG headset
// Stage state machines, timer drivers and summary evaluation for the mobile shell

// Module declarations
pub mod api;
pub mod calibration;
pub mod config;
pub mod context;
pub mod device;
pub mod error;
pub mod logging;
pub mod managers;
pub mod signal;
pub mod simulator;
pub mod telemetry;
pub mod testing;

// Re-exports for convenience
pub use api::*;
pub use context::FlowContext;
pub use logging::init_logging;
