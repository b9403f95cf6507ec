//! Calibration telemetry collector and helpers.
//!
//! The collector multiplexes stage transitions, phase changes, stage outcomes
//! and signal-score gauges into a bounded history plus async broadcast stream.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use tokio::sync::{broadcast, mpsc};

use crate::calibration::{CalibrationPhase, StageKind};
use crate::error::{CalibrationError, ErrorCode};
use crate::signal::classify;

pub mod events;

pub use events::MetricEvent;

/// Minimum score movement before a new gauge event is emitted
const SCORE_DEBOUNCE: f32 = 2.5;

/// Global telemetry hub shared across the crate.
static HUB: Lazy<TelemetryHub> = Lazy::new(TelemetryHub::default);

/// Access the global telemetry hub.
pub fn hub() -> &'static TelemetryHub {
    &HUB
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<MetricEvent>,
    pub total_events: u64,
    pub dropped_events: u64,
}

// A poisoned telemetry lock still holds usable data
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Broadcast-based collector retaining a bounded history of metrics.
pub struct TelemetryCollector {
    tx: broadcast::Sender<MetricEvent>,
    history: Mutex<VecDeque<MetricEvent>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer);
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, event: MetricEvent) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        {
            let mut history = lock(&self.history);
            if history.len() == self.history_capacity {
                history.pop_front();
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetricEvent> {
        self.tx.subscribe()
    }

    /// Must be called from within a tokio runtime.
    pub fn subscribe_unbounded(&self) -> mpsc::UnboundedReceiver<MetricEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut broadcast_rx = self.tx.subscribe();

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("[Telemetry] Unbounded subscriber lagged by {}", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        rx
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = lock(&self.history);
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::new(256, 64)
    }
}

/// Rolling window of recent signal scores.
struct ScoreTracker {
    samples: VecDeque<f32>,
    max_samples: usize,
}

impl ScoreTracker {
    fn new(max_samples: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(max_samples),
            max_samples: max_samples.max(1),
        }
    }

    fn observe(&mut self, value: f32) -> (f32, usize) {
        if self.samples.len() == self.max_samples {
            self.samples.pop_front();
        }
        self.samples.push_back(value);

        let count = self.samples.len();
        let sum: f32 = self.samples.iter().copied().sum();
        (sum / count as f32, count)
    }
}

/// Top-level hub wrapping collector state plus derived gauges.
pub struct TelemetryHub {
    collector: TelemetryCollector,
    scores: Mutex<ScoreTracker>,
    score_gauges: Mutex<HashMap<StageKind, f32>>,
}

impl TelemetryHub {
    pub fn new(channel_capacity: usize, history_capacity: usize, score_window: usize) -> Self {
        Self {
            collector: TelemetryCollector::new(channel_capacity, history_capacity),
            scores: Mutex::new(ScoreTracker::new(score_window)),
            score_gauges: Mutex::new(HashMap::new()),
        }
    }

    pub fn collector(&self) -> &TelemetryCollector {
        &self.collector
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.collector.snapshot()
    }

    pub fn record_stage_transition(&self, stage: StageKind, from: &str, to: &str) {
        self.collector.publish(MetricEvent::StageTransition {
            stage,
            from: from.to_string(),
            to: to.to_string(),
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_phase_change(&self, from: Option<CalibrationPhase>, to: Option<CalibrationPhase>) {
        self.collector.publish(MetricEvent::PhaseChanged {
            from,
            to,
            timestamp_ms: now_timestamp_ms(),
        });
    }

    pub fn record_stage_outcome(&self, stage: StageKind, outcome: &str) {
        self.collector.publish(MetricEvent::StageFinished {
            stage,
            outcome: outcome.to_string(),
        });
    }

    /// Gauge for the score seen by `stage`; small movements are debounced
    pub fn record_signal_score(&self, stage: StageKind, score: f32) {
        if !score.is_finite() {
            return;
        }
        let normalized = score.clamp(0.0, 100.0);
        let (rolling_avg, sample_count) = lock(&self.scores).observe(normalized);

        let mut gauges = lock(&self.score_gauges);
        let should_emit = gauges
            .get(&stage)
            .map(|last| (last - normalized).abs() >= SCORE_DEBOUNCE)
            .unwrap_or(true);

        if should_emit {
            gauges.insert(stage, normalized);
            self.collector.publish(MetricEvent::SignalScore {
                score: normalized,
                rolling_avg,
                sample_count,
                level: classify(Some(normalized)).level,
            });
        }
    }

    pub fn record_error(&self, err: &CalibrationError, context: impl Into<String>) {
        self.collector.publish(MetricEvent::Error {
            code: err.code(),
            context: context.into(),
        });
    }
}

impl Default for TelemetryHub {
    fn default() -> Self {
        Self::new(256, 64, 32)
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(stage: StageKind) -> MetricEvent {
        MetricEvent::StageFinished {
            stage,
            outcome: "completed".to_string(),
        }
    }

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(outcome(StageKind::Countdown));
        collector.publish(outcome(StageKind::Recording));
        collector.publish(MetricEvent::Error {
            code: 2001,
            context: "test".to_string(),
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::StageFinished {
                stage: StageKind::Countdown,
                ..
            }
        ));
        assert!(matches!(snapshot.recent[2], MetricEvent::Error { code: 2001, .. }));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.publish(outcome(StageKind::Countdown));
        collector.publish(outcome(StageKind::Recording));
        collector.publish(outcome(StageKind::Recording));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert!(matches!(
            snapshot.recent[0],
            MetricEvent::StageFinished {
                stage: StageKind::Recording,
                ..
            }
        ));
    }

    #[test]
    fn signal_gauge_debounces_small_changes() {
        let hub = TelemetryHub::new(8, 16, 4);
        hub.record_signal_score(StageKind::Recording, 80.0);
        hub.record_signal_score(StageKind::Recording, 81.0);
        hub.record_signal_score(StageKind::Recording, 60.0);
        hub.record_signal_score(StageKind::Recording, f32::NAN);

        let gauges: Vec<_> = hub
            .snapshot()
            .recent
            .into_iter()
            .filter_map(|event| match event {
                MetricEvent::SignalScore { score, rolling_avg, .. } => Some((score, rolling_avg)),
                _ => None,
            })
            .collect();
        assert_eq!(gauges.len(), 2);
        assert_eq!(gauges[1].0, 60.0);
        assert!((gauges[1].1 - 221.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn hub_records_phase_and_error() {
        let hub = TelemetryHub::new(8, 8, 4);
        hub.record_phase_change(None, Some(CalibrationPhase::Instructions));
        hub.record_error(&CalibrationError::StatePoisoned, "session");

        let recent = hub.snapshot().recent;
        assert!(matches!(
            recent[0],
            MetricEvent::PhaseChanged {
                from: None,
                to: Some(CalibrationPhase::Instructions),
                ..
            }
        ));
        assert!(matches!(recent[1], MetricEvent::Error { code: 2007, .. }));
    }

    #[tokio::test]
    async fn unbounded_subscriber_receives_events() {
        let hub = TelemetryHub::new(8, 8, 4);
        let mut rx = hub.collector().subscribe_unbounded();
        hub.record_stage_transition(StageKind::Countdown, "waiting", "counting");

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, MetricEvent::StageTransition { .. }));
    }
}
