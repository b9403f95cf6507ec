//! Deterministic testability harness utilities.
//!
//! The stage machines only talk to the outside world through effects, so the
//! same machine can be driven by the tokio driver in production and by the
//! [`VirtualRunner`] here, which executes effects against a virtual clock.
//! The runner is also what the simulator CLI uses for `--instant` runs.

pub mod fakes;
pub mod virtual_runner;

pub use fakes::FakeDevice;
pub use virtual_runner::VirtualRunner;
