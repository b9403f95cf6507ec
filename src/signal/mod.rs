// Signal module - headset signal-quality readings and their classification
//
// Every stage reads the same `SignalQuality` value from the device
// collaborator and classifies it through one shared `SignalClassifier`.

pub mod frame;
pub mod quality;

pub use frame::{DeviceFrame, ThetaState};
pub use quality::{classify, SignalClassification, SignalClassifier, SignalLevel};

/// Signal-quality reading published by the device collaborator
///
/// Sampled by the calibration stages, never mutated by them.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SignalQuality {
    /// Overall quality score (0-100), absent while the headset is settling
    pub score: Option<f32>,
    /// Share of the current window rejected as artifact (0-100)
    #[serde(default)]
    pub artifact_percentage: Option<f32>,
    #[serde(default)]
    pub amplitude_artifact: Option<bool>,
    #[serde(default)]
    pub gradient_artifact: Option<bool>,
    #[serde(default)]
    pub frequency_artifact: Option<bool>,
}

impl SignalQuality {
    /// Reading carrying only a score
    pub fn from_score(score: f32) -> Self {
        Self {
            score: Some(score),
            ..Self::default()
        }
    }
}
