//! Scriptable headset fake.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::device::SignalSource;
use crate::signal::SignalQuality;

/// Theta readings cycled by default; varied enough for a valid baseline
const DEFAULT_THETA: [f64; 5] = [9.0, 10.0, 11.0, 10.5, 9.5];

#[derive(Debug)]
struct FakeState {
    connected: bool,
    score: Option<f32>,
    theta: Vec<f64>,
}

/// Headset whose connection, score and theta power are set by the test
#[derive(Debug)]
pub struct FakeDevice {
    state: Mutex<FakeState>,
    reads: AtomicUsize,
}

impl FakeDevice {
    /// Connected, reporting `score`
    pub fn connected(score: Option<f32>) -> Self {
        Self {
            state: Mutex::new(FakeState {
                connected: true,
                score,
                theta: DEFAULT_THETA.to_vec(),
            }),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn disconnected() -> Self {
        let device = Self::connected(None);
        device.set_connected(false);
        device
    }

    /// Replace the cycled theta readings; empty disables theta
    pub fn with_theta(self, theta: Vec<f64>) -> Self {
        self.state().theta = theta;
        self
    }

    pub fn set_score(&self, score: Option<f32>) {
        self.state().score = score;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    /// Number of signal-quality reads so far
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalSource for FakeDevice {
    fn current_signal_quality(&self) -> Option<SignalQuality> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.state().score.map(SignalQuality::from_score)
    }

    fn is_connected(&self) -> bool {
        self.state().connected
    }

    fn current_theta_power(&self) -> Option<f64> {
        let state = self.state();
        if state.theta.is_empty() {
            return None;
        }
        // Index by completed reads so each sample sees the next reading
        let idx = self.reads.load(Ordering::SeqCst).saturating_sub(1) % state.theta.len();
        Some(state.theta[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_readings() {
        let device = FakeDevice::connected(Some(75.0));
        assert!(device.is_connected());
        assert_eq!(device.current_signal_quality().unwrap().score, Some(75.0));

        device.set_score(None);
        assert!(device.current_signal_quality().is_none());
        assert_eq!(device.reads(), 2);
    }

    #[test]
    fn test_theta_cycles_with_reads() {
        let device = FakeDevice::connected(Some(90.0)).with_theta(vec![1.0, 2.0]);
        device.current_signal_quality();
        assert_eq!(device.current_theta_power(), Some(1.0));
        device.current_signal_quality();
        assert_eq!(device.current_theta_power(), Some(2.0));
        device.current_signal_quality();
        assert_eq!(device.current_theta_power(), Some(1.0));
    }

    #[test]
    fn test_disconnected() {
        let device = FakeDevice::disconnected().with_theta(vec![]);
        assert!(!device.is_connected());
        assert!(device.current_theta_power().is_none());
    }
}
