// Baseline profile derived from a completed recording
//
// Mean and standard deviation of theta power over the clean part of the
// recording. Later readings are scored against it as z-scores.

use serde::{Deserialize, Serialize};

use crate::calibration::aggregate::CalibrationResultData;
use crate::error::CalibrationError;
use crate::signal::ThetaState;

/// Quality score a profile needs before it may be persisted
pub const MIN_BASELINE_QUALITY: f32 = 50.0;

/// |z| above which a reading counts as high/low theta
const THETA_Z_THRESHOLD: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineProfile {
    pub theta_mean: f64,
    /// Population standard deviation
    pub theta_std: f64,
    /// Average signal quality of the recording (0-100)
    pub quality_score: f32,
    pub clean_data_percentage: u8,
    pub sample_count: usize,
    /// Seconds of recording the profile was computed from
    pub recorded_duration: u32,
}

impl BaselineProfile {
    /// Compute the profile from the theta readings captured during recording
    pub fn from_result(
        result: &CalibrationResultData,
        min_samples: usize,
    ) -> Result<Self, CalibrationError> {
        let powers = &result.theta_power_samples;
        if powers.len() < min_samples {
            return Err(CalibrationError::InsufficientSamples {
                required: min_samples,
                collected: powers.len(),
            });
        }
        if powers.is_empty() {
            return Err(CalibrationError::InvalidBaseline {
                reason: "no theta readings".to_string(),
            });
        }

        let n = powers.len() as f64;
        let mean = powers.iter().sum::<f64>() / n;
        let variance = powers.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / n;

        let profile = Self {
            theta_mean: mean,
            theta_std: variance.sqrt(),
            quality_score: f32::from(result.average_signal_quality),
            clean_data_percentage: result.clean_data_percentage,
            sample_count: powers.len(),
            recorded_duration: result.recorded_duration,
        };
        tracing::debug!(
            "[Baseline] mean={:.3} std={:.3} from {} readings",
            profile.theta_mean,
            profile.theta_std,
            profile.sample_count
        );
        Ok(profile)
    }

    /// Finite positive mean and std, quality at least 50
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), CalibrationError> {
        let reason = if !self.theta_mean.is_finite() || self.theta_mean <= 0.0 {
            format!("theta_mean {} is not positive", self.theta_mean)
        } else if !self.theta_std.is_finite() || self.theta_std <= 0.0 {
            format!("theta_std {} is not positive", self.theta_std)
        } else if self.quality_score.is_nan() || self.quality_score < MIN_BASELINE_QUALITY {
            format!(
                "quality_score {} below {}",
                self.quality_score, MIN_BASELINE_QUALITY
            )
        } else {
            return Ok(());
        };
        Err(CalibrationError::InvalidBaseline { reason })
    }

    pub fn z_score(&self, theta_power: f64) -> Option<f64> {
        if self.theta_std <= 0.0 || !self.theta_std.is_finite() || !theta_power.is_finite() {
            return None;
        }
        Some((theta_power - self.theta_mean) / self.theta_std)
    }

    pub fn theta_state(&self, theta_power: f64) -> Option<ThetaState> {
        let z = self.z_score(theta_power)?;
        Some(if z > THETA_Z_THRESHOLD {
            ThetaState::High
        } else if z < -THETA_Z_THRESHOLD {
            ThetaState::Low
        } else {
            ThetaState::Normal
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::aggregate::SuccessCriteria;

    fn result_with(theta: Vec<f64>, quality: f32) -> CalibrationResultData {
        let samples = (0..10)
            .map(|i| crate::calibration::aggregate::SignalQualitySample {
                timestamp: i * 500,
                score: quality,
                is_clean: quality >= 40.0,
            })
            .collect();
        CalibrationResultData::from_samples(300, 300, samples, theta, 0, SuccessCriteria::default())
    }

    #[test]
    fn test_population_statistics() {
        let theta = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, 5.0, 5.0];
        let profile = BaselineProfile::from_result(&result_with(theta, 90.0), 10).unwrap();
        assert!((profile.theta_mean - 5.0).abs() < 1e-9);
        assert!((profile.theta_std - 1.7888543819998317).abs() < 1e-9);
        assert_eq!(profile.quality_score, 90.0);
        assert_eq!(profile.sample_count, 10);
        assert!(profile.is_valid());
    }

    #[test]
    fn test_too_few_readings() {
        let err = BaselineProfile::from_result(&result_with(vec![10.0; 9], 90.0), 10).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::InsufficientSamples {
                required: 10,
                collected: 9
            }
        );
    }

    #[test]
    fn test_flat_signal_is_invalid() {
        let profile = BaselineProfile::from_result(&result_with(vec![10.0; 12], 90.0), 10).unwrap();
        assert_eq!(profile.theta_std, 0.0);
        assert!(!profile.is_valid());
        assert!(profile.z_score(11.0).is_none());
    }

    #[test]
    fn test_low_quality_is_invalid() {
        let theta = (0..10).map(|i| 8.0 + i as f64).collect();
        let profile = BaselineProfile::from_result(&result_with(theta, 45.0), 10).unwrap();
        assert!(matches!(
            profile.validate(),
            Err(CalibrationError::InvalidBaseline { .. })
        ));
    }

    #[test]
    fn test_nan_mean_is_invalid() {
        let profile = BaselineProfile {
            theta_mean: f64::NAN,
            theta_std: 1.0,
            quality_score: 90.0,
            clean_data_percentage: 100,
            sample_count: 10,
            recorded_duration: 300,
        };
        assert!(!profile.is_valid());
    }

    #[test]
    fn test_theta_state_thresholds() {
        let profile = BaselineProfile {
            theta_mean: 10.0,
            theta_std: 2.0,
            quality_score: 90.0,
            clean_data_percentage: 100,
            sample_count: 10,
            recorded_duration: 300,
        };
        assert_eq!(profile.z_score(14.0), Some(2.0));
        assert_eq!(profile.theta_state(14.0), Some(ThetaState::High));
        assert_eq!(profile.theta_state(6.0), Some(ThetaState::Low));
        assert_eq!(profile.theta_state(12.0), Some(ThetaState::Normal));
        assert_eq!(profile.theta_state(8.0), Some(ThetaState::Normal));
    }
}
