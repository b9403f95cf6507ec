//! Simulated EEG headset.
//!
//! Produces device metrics frames with a slowly drifting theta power and a
//! gaussian signal-quality score, so the calibration flow can run end to end
//! without hardware. Seeded runs are reproducible.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::device::SignalSource;
use crate::signal::{DeviceFrame, SignalQuality, ThetaState};

pub const BASELINE_THETA_MEAN: f64 = 10.0;
pub const BASELINE_THETA_STD: f64 = 2.0;

/// Amplitude of the slow sinusoidal drift
const DRIFT_AMPLITUDE: f64 = 3.0;
/// Drift phase advance per frame
const DRIFT_STEP: f64 = 0.02;
/// Noise std as a fraction of the baseline std
const NOISE_AMPLITUDE: f64 = 0.3;
/// Frame-level z-score band for `normal`
const STATE_Z_BAND: f64 = 0.5;
const MIN_THETA: f64 = 0.1;

/// Headset condition being simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedProfile {
    /// Good contact, quality around 85
    Excellent,
    /// Loose contact, quality around 45 with large swings
    Degraded,
    /// Headband off the skin, quality well under the critical threshold
    Critical,
    Disconnected,
}

impl SimulatedProfile {
    /// Mean and std of the signal-quality score
    fn quality(&self) -> (f64, f64) {
        match self {
            SimulatedProfile::Excellent => (85.0, 5.0),
            SimulatedProfile::Degraded => (45.0, 12.0),
            SimulatedProfile::Critical => (12.0, 5.0),
            SimulatedProfile::Disconnected => (0.0, 0.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimulatedProfile::Excellent => "excellent",
            SimulatedProfile::Degraded => "degraded",
            SimulatedProfile::Critical => "critical",
            SimulatedProfile::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for SimulatedProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulatedProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "excellent" => Ok(SimulatedProfile::Excellent),
            "degraded" => Ok(SimulatedProfile::Degraded),
            "critical" => Ok(SimulatedProfile::Critical),
            "disconnected" => Ok(SimulatedProfile::Disconnected),
            other => Err(format!(
                "unknown profile '{}', expected excellent|degraded|critical|disconnected",
                other
            )),
        }
    }
}

struct SimState {
    rng: StdRng,
    profile: SimulatedProfile,
    forced: Option<ThetaState>,
    drift_phase: f64,
    latest: Option<DeviceFrame>,
    frames: u64,
}

impl SimState {
    fn gaussian(&mut self, mean: f64, std: f64) -> f64 {
        // Box-Muller; 1 - u keeps ln() away from zero
        let u1: f64 = 1.0 - self.rng.gen::<f64>();
        let u2: f64 = self.rng.gen();
        mean + std * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    fn natural_theta(&mut self) -> f64 {
        self.drift_phase += DRIFT_STEP;
        let drift = DRIFT_AMPLITUDE * self.drift_phase.sin();
        let noise = self.gaussian(0.0, BASELINE_THETA_STD * NOISE_AMPLITUDE);
        (BASELINE_THETA_MEAN + drift + noise).max(MIN_THETA)
    }

    fn forced_theta(&mut self, state: ThetaState) -> f64 {
        let noise = self.gaussian(0.0, BASELINE_THETA_STD * 0.1);
        match state {
            ThetaState::Low => (BASELINE_THETA_MEAN - 2.0 * BASELINE_THETA_STD + noise).max(MIN_THETA),
            ThetaState::High => BASELINE_THETA_MEAN + 2.0 * BASELINE_THETA_STD + noise,
            ThetaState::Normal => BASELINE_THETA_MEAN + noise,
        }
    }
}

pub struct SimulatedDevice {
    state: Mutex<SimState>,
}

impl SimulatedDevice {
    pub fn new(profile: SimulatedProfile, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let drift_phase = rng.gen_range(0.0..(2.0 * PI));
        tracing::debug!("[Simulator] profile={} seed={}", profile, seed);
        Self {
            state: Mutex::new(SimState {
                rng,
                profile,
                forced: None,
                drift_phase,
                latest: None,
                frames: 0,
            }),
        }
    }

    pub fn profile(&self) -> SimulatedProfile {
        self.lock().profile
    }

    pub fn set_profile(&self, profile: SimulatedProfile) {
        let mut state = self.lock();
        if state.profile != profile {
            tracing::info!("[Simulator] Profile {} -> {}", state.profile, profile);
            state.profile = profile;
        }
    }

    /// Force the theta state of generated frames; `None` returns to drift
    pub fn set_forced_state(&self, forced: Option<ThetaState>) {
        tracing::info!("[Simulator] Forced state: {:?}", forced);
        self.lock().forced = forced;
    }

    /// Frames generated so far
    pub fn frames(&self) -> u64 {
        self.lock().frames
    }

    pub fn latest_frame(&self) -> Option<DeviceFrame> {
        self.lock().latest.clone()
    }

    /// Generate the next metrics frame; `None` while disconnected
    pub fn next_frame(&self) -> Option<DeviceFrame> {
        let mut state = self.lock();
        if state.profile == SimulatedProfile::Disconnected {
            state.latest = None;
            return None;
        }

        let forced = state.forced;
        let theta_power = match forced {
            Some(target) => state.forced_theta(target),
            None => state.natural_theta(),
        };
        let z_score = (theta_power - BASELINE_THETA_MEAN) / BASELINE_THETA_STD;
        let theta_state = if z_score < -STATE_Z_BAND {
            ThetaState::Low
        } else if z_score > STATE_Z_BAND {
            ThetaState::High
        } else {
            ThetaState::Normal
        };

        let (mean, std) = state.profile.quality();
        let quality = state.gaussian(mean, std).clamp(0.0, 100.0);

        let frame = DeviceFrame {
            timestamp: now_epoch_ms(),
            theta_power: round_to(theta_power, 2),
            z_score: round_to(z_score, 2),
            theta_state,
            signal_quality: round_to(quality, 1) as f32,
            simulated_theta_state: forced,
        };
        state.frames += 1;
        state.latest = Some(frame.clone());
        Some(frame)
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalSource for SimulatedDevice {
    /// Each read advances the simulation by one frame
    fn current_signal_quality(&self) -> Option<SignalQuality> {
        self.next_frame().map(|frame| frame.signal())
    }

    fn is_connected(&self) -> bool {
        self.profile() != SimulatedProfile::Disconnected
    }

    fn current_theta_power(&self) -> Option<f64> {
        self.lock().latest.as_ref().map(|frame| frame.theta_power)
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
