// Sample aggregation and the calibration result record
//
// The result is built exactly once, when recording completes, and is shared
// afterwards behind an `Arc` so nothing downstream can mutate it.

use serde::{Deserialize, Serialize};

/// Clean-data percentage a successful recording needs by default
pub const DEFAULT_MIN_CLEAN_PERCENTAGE: u8 = 50;

/// One timestamped signal-quality reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalQualitySample {
    /// Milliseconds (Unix epoch for live runs, virtual clock in tests)
    pub timestamp: u64,
    /// 0-100
    pub score: f32,
    /// score at or above the clean threshold (40 by default)
    pub is_clean: bool,
}

/// Percentage of clean samples, rounded; 0 for no samples
pub fn clean_percentage(samples: &[SignalQualitySample]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    let clean = samples.iter().filter(|s| s.is_clean).count();
    ((clean as f64 / samples.len() as f64) * 100.0).round() as u8
}

/// Mean score, rounded; 0 for no samples
pub fn average_quality(samples: &[SignalQualitySample]) -> u8 {
    if samples.is_empty() {
        return 0;
    }
    let sum: f64 = samples.iter().map(|s| f64::from(s.score)).sum();
    (sum / samples.len() as f64).round().clamp(0.0, 100.0) as u8
}

/// Aggregate produced when the recording stage completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationResultData {
    /// Configured recording length (seconds)
    pub total_duration: u32,
    /// Seconds actually recorded
    pub recorded_duration: u32,
    pub clean_data_percentage: u8,
    pub average_signal_quality: u8,
    pub signal_quality_samples: Vec<SignalQualitySample>,
    /// Theta band power captured alongside clean samples
    #[serde(default)]
    pub theta_power_samples: Vec<f64>,
    pub auto_pause_count: u32,
    pub was_successful: bool,
}

/// Thresholds that decide `was_successful`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuccessCriteria {
    pub min_duration_secs: u32,
    pub min_clean_percentage: u8,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            min_duration_secs: 180,
            min_clean_percentage: DEFAULT_MIN_CLEAN_PERCENTAGE,
        }
    }
}

impl CalibrationResultData {
    pub fn from_samples(
        total_duration: u32,
        recorded_duration: u32,
        signal_quality_samples: Vec<SignalQualitySample>,
        theta_power_samples: Vec<f64>,
        auto_pause_count: u32,
        criteria: SuccessCriteria,
    ) -> Self {
        let clean_data_percentage = clean_percentage(&signal_quality_samples);
        let average_signal_quality = average_quality(&signal_quality_samples);
        let was_successful = recorded_duration >= criteria.min_duration_secs
            && clean_data_percentage >= criteria.min_clean_percentage;

        Self {
            total_duration,
            recorded_duration,
            clean_data_percentage,
            average_signal_quality,
            signal_quality_samples,
            theta_power_samples,
            auto_pause_count,
            was_successful,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, score: f32) -> SignalQualitySample {
        SignalQualitySample {
            timestamp: ts,
            score,
            is_clean: score >= 40.0,
        }
    }

    #[test]
    fn test_empty_samples() {
        assert_eq!(clean_percentage(&[]), 0);
        assert_eq!(average_quality(&[]), 0);
    }

    #[test]
    fn test_clean_percentage_rounds() {
        let samples = vec![sample(0, 90.0), sample(1, 10.0), sample(2, 50.0)];
        assert_eq!(clean_percentage(&samples), 67);
    }

    #[test]
    fn test_average_quality_rounds() {
        let samples = vec![sample(0, 90.0), sample(1, 85.0)];
        assert_eq!(average_quality(&samples), 88);
    }

    #[test]
    fn test_aggregation_is_order_independent() {
        let samples = vec![
            sample(0, 12.0),
            sample(1, 95.0),
            sample(2, 41.0),
            sample(3, 39.0),
            sample(4, 73.5),
        ];
        let mut reversed = samples.clone();
        reversed.reverse();
        let mut rotated = samples.clone();
        rotated.rotate_left(2);

        for other in [reversed, rotated] {
            assert_eq!(clean_percentage(&samples), clean_percentage(&other));
            assert_eq!(average_quality(&samples), average_quality(&other));
        }
    }

    #[test]
    fn test_success_requires_duration_and_clean_data() {
        let good = vec![sample(0, 90.0); 10];
        let result =
            CalibrationResultData::from_samples(180, 180, good.clone(), vec![], 0, SuccessCriteria::default());
        assert!(result.was_successful);
        assert_eq!(result.clean_data_percentage, 100);
        assert_eq!(result.average_signal_quality, 90);

        let short =
            CalibrationResultData::from_samples(300, 179, good, vec![], 0, SuccessCriteria::default());
        assert!(!short.was_successful);

        let dirty = vec![sample(0, 10.0); 10];
        let noisy =
            CalibrationResultData::from_samples(180, 180, dirty, vec![], 0, SuccessCriteria::default());
        assert!(!noisy.was_successful);
    }

    #[test]
    fn test_serializes_camel_case() {
        let result = CalibrationResultData::from_samples(
            180,
            180,
            vec![sample(0, 90.0)],
            vec![],
            1,
            SuccessCriteria::default(),
        );
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"cleanDataPercentage\":100"));
        assert!(json.contains("\"autoPauseCount\":1"));
    }
}
