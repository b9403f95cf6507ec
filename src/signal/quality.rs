// Signal quality classifier
//
// Maps a 0-100 score to one of six tiers. Boundaries belong to the higher
// tier: 80 is Excellent, 60 Good, 40 Fair, and the critical threshold
// (20 by default) is Poor.

use serde::{Deserialize, Serialize};

/// Scores at or above this are Excellent
const EXCELLENT_MIN: f32 = 80.0;
/// Scores at or above this are Good
const GOOD_MIN: f32 = 60.0;
/// Scores at or above this are Fair, the lowest "good" tier
const FAIR_MIN: f32 = 40.0;
/// Default critical threshold
pub const DEFAULT_CRITICAL_THRESHOLD: f32 = 20.0;
/// Highest critical threshold that keeps the Poor band non-empty
pub const MAX_CRITICAL_THRESHOLD: f32 = FAIR_MIN;

/// Discrete signal-quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalLevel {
    Unknown,
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl SignalLevel {
    /// Get human-readable label for display
    pub fn label(&self) -> &'static str {
        match self {
            SignalLevel::Unknown => "Unknown",
            SignalLevel::Excellent => "Excellent",
            SignalLevel::Good => "Good",
            SignalLevel::Fair => "Fair",
            SignalLevel::Poor => "Poor",
            SignalLevel::Critical => "Critical",
        }
    }

    /// Theme color key the shell resolves to a concrete color
    pub fn color_key(&self) -> &'static str {
        match self {
            SignalLevel::Unknown => "text_muted",
            SignalLevel::Excellent => "success",
            SignalLevel::Good => "success_light",
            SignalLevel::Fair => "warning",
            SignalLevel::Poor => "error_light",
            SignalLevel::Critical => "error",
        }
    }
}

/// Result of classifying one score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalClassification {
    pub level: SignalLevel,
    /// Fair or better
    pub is_good: bool,
    /// Below the critical threshold
    pub is_critical: bool,
}

impl SignalClassification {
    pub fn label(&self) -> &'static str {
        self.level.label()
    }

    pub fn color_key(&self) -> &'static str {
        self.level.color_key()
    }
}

/// Classifier with a configurable critical threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalClassifier {
    critical_threshold: f32,
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_CRITICAL_THRESHOLD)
    }
}

impl SignalClassifier {
    /// Thresholds above `MAX_CRITICAL_THRESHOLD` are clamped so the Poor band never inverts.
    pub fn new(critical_threshold: f32) -> Self {
        Self {
            critical_threshold: critical_threshold.clamp(0.0, MAX_CRITICAL_THRESHOLD),
        }
    }

    pub fn critical_threshold(&self) -> f32 {
        self.critical_threshold
    }

    /// Classify a score; `None` and NaN are Unknown
    pub fn classify(&self, score: Option<f32>) -> SignalClassification {
        let level = match score {
            None => SignalLevel::Unknown,
            Some(s) if s.is_nan() => SignalLevel::Unknown,
            Some(s) if s >= EXCELLENT_MIN => SignalLevel::Excellent,
            Some(s) if s >= GOOD_MIN => SignalLevel::Good,
            Some(s) if s >= FAIR_MIN => SignalLevel::Fair,
            Some(s) if s >= self.critical_threshold => SignalLevel::Poor,
            Some(_) => SignalLevel::Critical,
        };

        SignalClassification {
            level,
            is_good: matches!(
                level,
                SignalLevel::Excellent | SignalLevel::Good | SignalLevel::Fair
            ),
            is_critical: level == SignalLevel::Critical,
        }
    }
}

/// Classify with the default critical threshold
pub fn classify(score: Option<f32>) -> SignalClassification {
    SignalClassifier::default().classify(score)
}
