use super::*;
use crate::calibration::timers::TimerCommand;

fn machine() -> RecordingMachine {
    let mut machine = RecordingMachine::new(&CalibrationConfig::default(), TimingConfig::default());
    machine.begin();
    machine
}

fn short_machine(recording_secs: u32, min_recording_secs: u32) -> RecordingMachine {
    let config = CalibrationConfig {
        recording_secs,
        min_recording_secs,
        ..CalibrationConfig::default()
    };
    let mut machine = RecordingMachine::new(&config, TimingConfig::default());
    machine.begin();
    machine
}

fn sample(machine: &mut RecordingMachine, ts: u64, score: Option<f32>) -> Vec<Effect> {
    machine.handle(RecordingEvent::SampleTick {
        timestamp_ms: ts,
        reading: score.map(SignalQuality::from_score),
        theta_power: Some(10.0),
    })
}

fn completed(effects: &[Effect]) -> Option<Arc<CalibrationResultData>> {
    effects.iter().find_map(|e| match e {
        StageEffect::Completed(result) => Some(Arc::clone(result)),
        _ => None,
    })
}

#[test]
fn test_begin_starts_elapsed_then_sample() {
    let mut machine = RecordingMachine::new(&CalibrationConfig::default(), TimingConfig::default());
    let effects = machine.begin();
    assert!(matches!(
        effects[0],
        StageEffect::Timer(TimerCommand::Start {
            id: TimerId::ElapsedTick,
            kind: TimerKind::Repeating,
            ..
        })
    ));
    assert!(matches!(
        effects[1],
        StageEffect::Timer(TimerCommand::Start {
            id: TimerId::SampleTick,
            ..
        })
    ));
    assert!(machine.begin().is_empty());
    assert_eq!(machine.state(), RecordingState::Recording);
}

#[test]
fn test_full_recording_completes_once() {
    let mut machine = short_machine(180, 180);
    let mut results = Vec::new();

    for second in 0..180u64 {
        sample(&mut machine, second * 1000, Some(90.0));
        sample(&mut machine, second * 1000 + 500, Some(90.0));
        if let Some(result) = completed(&machine.handle(RecordingEvent::ElapsedTick)) {
            results.push(result);
        }
    }

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.recorded_duration, 180);
    assert_eq!(result.clean_data_percentage, 100);
    assert_eq!(result.average_signal_quality, 90);
    assert!(result.was_successful);
    assert_eq!(result.signal_quality_samples.len(), 360);
    assert_eq!(machine.state(), RecordingState::Complete);
    assert!(machine.active_timers().is_empty());

    // Late ticks after completion change nothing
    assert!(machine.handle(RecordingEvent::ElapsedTick).is_empty());
    assert_eq!(machine.elapsed_seconds(), 180);
}

#[test]
fn test_completion_requests_processing_phase() {
    let mut machine = short_machine(1, 1);
    let effects = machine.handle(RecordingEvent::ElapsedTick);
    assert_eq!(
        effects[..2],
        [
            StageEffect::Timer(TimerCommand::Cancel(TimerId::ElapsedTick)),
            StageEffect::Timer(TimerCommand::Cancel(TimerId::SampleTick)),
        ]
    );
    assert_eq!(
        effects[2],
        StageEffect::SetPhase(Some(CalibrationPhase::Processing))
    );
    assert!(completed(&effects).is_some());
}

#[test]
fn test_null_reading_not_recorded() {
    let mut machine = machine();
    sample(&mut machine, 0, None);
    assert!(machine.samples().is_empty());

    let effects = machine.handle(RecordingEvent::SampleTick {
        timestamp_ms: 500,
        reading: Some(SignalQuality::default()),
        theta_power: None,
    });
    assert!(effects.is_empty());
    assert!(machine.samples().is_empty());
}

#[test]
fn test_clean_flag_uses_threshold() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(40.0));
    sample(&mut machine, 500, Some(39.9));
    let samples = machine.samples();
    assert!(samples[0].is_clean);
    assert!(!samples[1].is_clean);
}

#[test]
fn test_theta_kept_only_for_clean_samples() {
    let mut machine = short_machine(1, 1);
    sample(&mut machine, 0, Some(90.0));
    sample(&mut machine, 500, Some(25.0));
    let result = completed(&machine.handle(RecordingEvent::ElapsedTick)).unwrap();
    assert_eq!(result.theta_power_samples, vec![10.0]);
}

#[test]
fn test_critical_sample_arms_auto_pause_once() {
    let mut machine = machine();
    let effects = sample(&mut machine, 0, Some(10.0));
    assert!(matches!(
        effects[0],
        StageEffect::Timer(TimerCommand::Start {
            id: TimerId::AutoPause,
            kind: TimerKind::Once,
            ..
        })
    ));

    // Still critical: no second timer
    assert!(sample(&mut machine, 500, Some(5.0)).is_empty());
    assert_eq!(
        machine
            .active_timers()
            .iter()
            .filter(|t| **t == TimerId::AutoPause)
            .count(),
        1
    );
}

#[test]
fn test_recovery_disarms_auto_pause() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    let effects = sample(&mut machine, 500, Some(30.0));
    assert_eq!(
        effects,
        vec![StageEffect::Timer(TimerCommand::Cancel(TimerId::AutoPause))]
    );

    // A stale firing after recovery is ignored
    assert!(machine.handle(RecordingEvent::AutoPauseElapsed).is_empty());
    assert_eq!(machine.state(), RecordingState::Recording);
    assert_eq!(machine.auto_pause_count(), 0);
}

#[test]
fn test_missing_reading_disarms_auto_pause() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    let effects = sample(&mut machine, 500, None);
    assert_eq!(
        effects,
        vec![StageEffect::Timer(TimerCommand::Cancel(TimerId::AutoPause))]
    );
}

#[test]
fn test_auto_pause_stops_ticks() {
    let mut machine = machine();
    for _ in 0..3 {
        machine.handle(RecordingEvent::ElapsedTick);
    }
    sample(&mut machine, 0, Some(10.0));

    let effects = machine.handle(RecordingEvent::AutoPauseElapsed);
    assert_eq!(machine.state(), RecordingState::AutoPaused);
    assert_eq!(machine.auto_pause_count(), 1);
    assert!(effects.contains(&StageEffect::Timer(TimerCommand::Cancel(
        TimerId::ElapsedTick
    ))));
    assert!(effects.contains(&StageEffect::Timer(TimerCommand::Cancel(
        TimerId::SampleTick
    ))));
    assert!(machine.active_timers().is_empty());

    // Elapsed is frozen while auto-paused
    assert!(machine.handle(RecordingEvent::ElapsedTick).is_empty());
    assert_eq!(machine.elapsed_seconds(), 3);
}

#[test]
fn test_resume_from_auto_pause() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    machine.handle(RecordingEvent::AutoPauseElapsed);

    let effects = machine.handle(RecordingEvent::Resume);
    assert_eq!(machine.state(), RecordingState::Recording);
    assert_eq!(effects.len(), 2);
    assert_eq!(
        machine.active_timers(),
        &[TimerId::ElapsedTick, TimerId::SampleTick]
    );
    assert_eq!(machine.auto_pause_count(), 1);
}

#[test]
fn test_manual_pause_and_resume() {
    let mut machine = machine();
    machine.handle(RecordingEvent::ElapsedTick);
    machine.handle(RecordingEvent::Pause);
    assert_eq!(machine.state(), RecordingState::Paused);
    assert!(machine.active_timers().is_empty());

    // Pause again is ignored, samples while paused are ignored
    assert!(machine.handle(RecordingEvent::Pause).is_empty());
    assert!(sample(&mut machine, 0, Some(90.0)).is_empty());
    assert!(machine.samples().is_empty());

    machine.handle(RecordingEvent::Resume);
    assert_eq!(machine.state(), RecordingState::Recording);
    assert_eq!(machine.elapsed_seconds(), 1);
}

#[test]
fn test_resume_while_recording_ignored() {
    let mut machine = machine();
    assert!(machine.handle(RecordingEvent::Resume).is_empty());
}

#[test]
fn test_pause_cancels_armed_auto_pause() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    let effects = machine.handle(RecordingEvent::Pause);
    assert!(effects.contains(&StageEffect::Timer(TimerCommand::Cancel(
        TimerId::AutoPause
    ))));
    assert_eq!(machine.auto_pause_count(), 0);
}

#[test]
fn test_finish_early_builds_result() {
    let mut machine = machine();
    for second in 0..200u64 {
        sample(&mut machine, second * 1000, Some(85.0));
        machine.handle(RecordingEvent::ElapsedTick);
    }
    let effects = machine.handle(RecordingEvent::Finish);
    let result = completed(&effects).unwrap();
    assert_eq!(result.total_duration, 300);
    assert_eq!(result.recorded_duration, 200);
    assert!(result.was_successful);
}

#[test]
fn test_finish_too_short_is_unsuccessful() {
    let mut machine = machine();
    for _ in 0..60 {
        machine.handle(RecordingEvent::ElapsedTick);
    }
    machine.handle(RecordingEvent::Pause);
    let result = completed(&machine.handle(RecordingEvent::Finish)).unwrap();
    assert_eq!(result.recorded_duration, 60);
    assert!(!result.was_successful);
}

#[test]
fn test_cancel_from_auto_paused() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    machine.handle(RecordingEvent::AutoPauseElapsed);

    let effects = machine.handle(RecordingEvent::Cancel);
    assert_eq!(machine.state(), RecordingState::Cancelled);
    assert_eq!(
        effects,
        vec![StageEffect::SetPhase(None), StageEffect::Cancelled]
    );
    assert!(machine.result().is_none());

    assert!(machine.handle(RecordingEvent::Resume).is_empty());
    assert!(machine.handle(RecordingEvent::Finish).is_empty());
}

#[test]
fn test_teardown_leaves_no_timers() {
    let mut machine = machine();
    sample(&mut machine, 0, Some(10.0));
    let effects = StageMachine::teardown(&mut machine);
    assert_eq!(effects.len(), 3);
    assert!(machine.active_timers().is_empty());
    assert!(!effects.iter().any(|e| matches!(e, StageEffect::SetPhase(_))));
}

#[test]
fn test_snapshot_reports_progress() {
    let mut machine = machine();
    for _ in 0..150 {
        machine.handle(RecordingEvent::ElapsedTick);
    }
    sample(&mut machine, 0, Some(90.0));
    sample(&mut machine, 500, Some(10.0));

    match machine.snapshot() {
        StageSnapshot::Recording(s) => {
            assert_eq!(s.progress_percent, 50.0);
            assert_eq!(s.remaining_clock, "02:30");
            assert_eq!(s.sample_count, 2);
            assert_eq!(s.clean_percentage, 50);
            assert_eq!(s.last_score, Some(10.0));
            assert!(s.last_signal.is_critical);
        }
        other => panic!("unexpected snapshot {:?}", other),
    }
}
