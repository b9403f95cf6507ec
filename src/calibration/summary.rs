// Summary stage - grade the recording and decide whether it can be saved

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::calibration::aggregate::CalibrationResultData;
use crate::calibration::baseline::BaselineProfile;
use crate::error::CalibrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationQualityLevel {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl CalibrationQualityLevel {
    pub fn label(&self) -> &'static str {
        match self {
            CalibrationQualityLevel::Excellent => "Excellent",
            CalibrationQualityLevel::Good => "Good",
            CalibrationQualityLevel::Acceptable => "Acceptable",
            CalibrationQualityLevel::Poor => "Poor",
        }
    }

    pub fn color_key(&self) -> &'static str {
        match self {
            CalibrationQualityLevel::Excellent => "success",
            CalibrationQualityLevel::Good => "success_light",
            CalibrationQualityLevel::Acceptable => "warning",
            CalibrationQualityLevel::Poor => "error",
        }
    }

    pub fn summary(&self) -> &'static str {
        match self {
            CalibrationQualityLevel::Excellent => "Your baseline was captured with a very clean signal.",
            CalibrationQualityLevel::Good => "Your baseline was captured with a good signal.",
            CalibrationQualityLevel::Acceptable => "Your baseline is usable but the signal was noisy at times.",
            CalibrationQualityLevel::Poor => "The signal was too noisy to build a reliable baseline.",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            CalibrationQualityLevel::Excellent | CalibrationQualityLevel::Good => {
                "Save this baseline and start your session."
            }
            CalibrationQualityLevel::Acceptable => {
                "You can save this baseline, or recalibrate after adjusting the headband."
            }
            CalibrationQualityLevel::Poor => {
                "Adjust the headband, sit still and recalibrate."
            }
        }
    }
}

/// Grade a recording from its average quality and clean-data percentage
///
/// Less than 50% clean data is always `Poor`, whatever the score.
pub fn evaluate(quality_score: f32, clean_data_percentage: f32) -> CalibrationQualityLevel {
    if clean_data_percentage < 50.0 {
        CalibrationQualityLevel::Poor
    } else if quality_score >= 80.0 && clean_data_percentage >= 80.0 {
        CalibrationQualityLevel::Excellent
    } else if quality_score >= 70.0 && clean_data_percentage >= 70.0 {
        CalibrationQualityLevel::Good
    } else if quality_score >= 50.0 && clean_data_percentage >= 50.0 {
        CalibrationQualityLevel::Acceptable
    } else {
        CalibrationQualityLevel::Poor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryAction {
    Save,
    Recalibrate,
}

/// Everything the summary screen shows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationSummary {
    pub level: CalibrationQualityLevel,
    pub can_save: bool,
    pub result: Arc<CalibrationResultData>,
    pub baseline: Option<BaselineProfile>,
    /// Why no baseline could be computed, if none was
    pub baseline_error: Option<String>,
    pub action: SummaryAction,
}

impl CalibrationSummary {
    pub fn label(&self) -> &'static str {
        self.level.label()
    }

    /// Baseline ready for persistence, or why it cannot be saved
    pub fn saveable_baseline(&self) -> Result<&BaselineProfile, CalibrationError> {
        if !self.result.was_successful {
            return Err(CalibrationError::CannotSave {
                reason: format!(
                    "recording unsuccessful ({}s recorded, {}% clean)",
                    self.result.recorded_duration, self.result.clean_data_percentage
                ),
            });
        }
        let baseline = self.baseline.as_ref().ok_or_else(|| CalibrationError::CannotSave {
            reason: self
                .baseline_error
                .clone()
                .unwrap_or_else(|| "no baseline".to_string()),
        })?;
        baseline.validate().map_err(|err| CalibrationError::CannotSave {
            reason: err.to_string(),
        })?;
        Ok(baseline)
    }
}

/// Build the summary for a completed recording
pub fn summarize(result: Arc<CalibrationResultData>, min_baseline_samples: usize) -> CalibrationSummary {
    let level = evaluate(
        f32::from(result.average_signal_quality),
        f32::from(result.clean_data_percentage),
    );

    let (baseline, baseline_error) = match BaselineProfile::from_result(&result, min_baseline_samples) {
        Ok(profile) => (Some(profile), None),
        Err(err) => {
            tracing::warn!("[Summary] No baseline: {}", err);
            (None, Some(err.to_string()))
        }
    };

    let can_save = result.was_successful && baseline.as_ref().is_some_and(BaselineProfile::is_valid);
    let action = if can_save {
        SummaryAction::Save
    } else {
        SummaryAction::Recalibrate
    };
    tracing::info!(
        "[Summary] level={} can_save={} (quality {}, clean {}%)",
        level.label(),
        can_save,
        result.average_signal_quality,
        result.clean_data_percentage
    );

    CalibrationSummary {
        level,
        can_save,
        result,
        baseline,
        baseline_error,
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::aggregate::{SignalQualitySample, SuccessCriteria};

    fn result(score: f32, recorded: u32, theta: Vec<f64>) -> Arc<CalibrationResultData> {
        let samples = (0..20)
            .map(|i| SignalQualitySample {
                timestamp: i * 500,
                score,
                is_clean: score >= 40.0,
            })
            .collect();
        Arc::new(CalibrationResultData::from_samples(
            300,
            recorded,
            samples,
            theta,
            0,
            SuccessCriteria::default(),
        ))
    }

    fn varied_theta() -> Vec<f64> {
        (0..20).map(|i| 9.0 + (i % 5) as f64 * 0.5).collect()
    }

    #[test]
    fn test_low_clean_always_poor() {
        assert_eq!(evaluate(95.0, 49.0), CalibrationQualityLevel::Poor);
        assert_eq!(evaluate(100.0, 0.0), CalibrationQualityLevel::Poor);
    }

    #[test]
    fn test_tiers() {
        assert_eq!(evaluate(80.0, 80.0), CalibrationQualityLevel::Excellent);
        assert_eq!(evaluate(79.9, 90.0), CalibrationQualityLevel::Good);
        assert_eq!(evaluate(90.0, 75.0), CalibrationQualityLevel::Good);
        assert_eq!(evaluate(60.0, 60.0), CalibrationQualityLevel::Acceptable);
        assert_eq!(evaluate(49.0, 90.0), CalibrationQualityLevel::Poor);
    }

    #[test]
    fn test_tier_strings_present() {
        for level in [
            CalibrationQualityLevel::Excellent,
            CalibrationQualityLevel::Good,
            CalibrationQualityLevel::Acceptable,
            CalibrationQualityLevel::Poor,
        ] {
            assert!(!level.label().is_empty());
            assert!(!level.color_key().is_empty());
            assert!(!level.summary().is_empty());
            assert!(!level.recommendation().is_empty());
        }
    }

    #[test]
    fn test_successful_recording_can_save() {
        let summary = summarize(result(90.0, 300, varied_theta()), 10);
        assert_eq!(summary.level, CalibrationQualityLevel::Excellent);
        assert!(summary.can_save);
        assert_eq!(summary.action, SummaryAction::Save);
        assert!(summary.saveable_baseline().is_ok());
    }

    #[test]
    fn test_short_recording_cannot_save() {
        let summary = summarize(result(90.0, 120, varied_theta()), 10);
        assert!(!summary.can_save);
        assert_eq!(summary.action, SummaryAction::Recalibrate);
        assert!(matches!(
            summary.saveable_baseline(),
            Err(CalibrationError::CannotSave { .. })
        ));
    }

    #[test]
    fn test_missing_theta_cannot_save() {
        let summary = summarize(result(90.0, 300, vec![]), 10);
        assert!(summary.baseline.is_none());
        assert!(summary.baseline_error.is_some());
        assert!(!summary.can_save);
    }

    #[test]
    fn test_flat_theta_cannot_save() {
        let summary = summarize(result(90.0, 300, vec![10.0; 20]), 10);
        assert!(summary.baseline.is_some());
        assert!(!summary.can_save);
    }
}
