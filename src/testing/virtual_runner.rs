//! Virtual-time executor for stage machines.
//!
//! Timers are kept in a list ordered by `(due_ms, start order)`, so timers
//! due at the same instant fire in the order they were first started (the
//! recording's elapsed tick before its sample tick). Nothing sleeps; a
//! five-minute recording advances in microseconds.

use std::sync::Arc;

use crate::calibration::machine::{
    apply_effect, StageCallbacks, StageCommand, StageEffect, StageMachine, StageOutcome,
};
use crate::calibration::timers::{TimerCommand, TimerId, TimerKind};
use crate::device::{SessionSink, SignalSource};

#[derive(Debug, Clone, Copy)]
struct VirtualTimer {
    id: TimerId,
    kind: TimerKind,
    period_ms: u64,
    due_ms: u64,
    order: u64,
}

pub struct VirtualRunner<M: StageMachine> {
    machine: M,
    device: Arc<dyn SignalSource>,
    session: Arc<dyn SessionSink>,
    callbacks: StageCallbacks<M::Output>,
    outcome: Option<StageOutcome<M::Output>>,
    timers: Vec<VirtualTimer>,
    next_order: u64,
    now_ms: u64,
    fired: usize,
}

impl<M: StageMachine> VirtualRunner<M> {
    pub fn new(machine: M, device: Arc<dyn SignalSource>, session: Arc<dyn SessionSink>) -> Self {
        Self {
            machine,
            device,
            session,
            callbacks: StageCallbacks::new(),
            outcome: None,
            timers: Vec::new(),
            next_order: 0,
            now_ms: 0,
            fired: 0,
        }
    }

    pub fn with_callbacks(mut self, callbacks: StageCallbacks<M::Output>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Start the virtual clock at `now_ms` instead of zero
    pub fn starting_at(mut self, now_ms: u64) -> Self {
        self.now_ms = now_ms;
        self
    }

    /// Mount the stage
    pub fn start(&mut self) {
        let effects = self.machine.start();
        self.execute(effects);
    }

    /// Advance virtual time by `ms`, firing every timer that falls due
    pub fn advance(&mut self, ms: u64) {
        let target = self.now_ms.saturating_add(ms);
        while let Some(idx) = self.next_due(target) {
            let timer = self.timers[idx];
            self.now_ms = timer.due_ms;
            match timer.kind {
                TimerKind::Once => {
                    self.timers.remove(idx);
                }
                TimerKind::Repeating => {
                    self.timers[idx].due_ms += timer.period_ms;
                }
            }
            self.fired += 1;
            let effects = self
                .machine
                .on_timer(timer.id, self.device.as_ref(), self.now_ms);
            self.execute(effects);
        }
        self.now_ms = target;
    }

    /// Advance in `step_ms` increments until the stage ends or `limit_ms` passes
    pub fn run_until_terminal(&mut self, step_ms: u64, limit_ms: u64) -> Option<&StageOutcome<M::Output>> {
        let deadline = self.now_ms.saturating_add(limit_ms);
        let step = step_ms.max(1);
        while self.outcome.is_none() && self.now_ms < deadline {
            self.advance(step.min(deadline - self.now_ms));
        }
        self.outcome.as_ref()
    }

    pub fn command(&mut self, command: StageCommand) {
        let effects = self.machine.on_command(command);
        self.execute(effects);
    }

    /// Unmount the stage; ends as `Abandoned` unless already terminal
    pub fn teardown(&mut self) {
        let effects = self.machine.teardown();
        self.execute(effects);
        if self.outcome.is_none() {
            self.outcome = Some(StageOutcome::Abandoned);
        }
    }

    pub fn outcome(&self) -> Option<&StageOutcome<M::Output>> {
        self.outcome.as_ref()
    }

    pub fn machine(&self) -> &M {
        &self.machine
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Timers the runner still has scheduled
    pub fn pending_timers(&self) -> Vec<TimerId> {
        let mut timers = self.timers.clone();
        timers.sort_by_key(|t| t.order);
        timers.into_iter().map(|t| t.id).collect()
    }

    /// Total timer fires delivered to the machine
    pub fn fired(&self) -> usize {
        self.fired
    }

    fn next_due(&self, target: u64) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= target)
            .min_by_key(|(_, t)| (t.due_ms, t.order))
            .map(|(idx, _)| idx)
    }

    fn execute(&mut self, effects: Vec<StageEffect<M::Output>>) {
        for effect in effects {
            if let Some(command) =
                apply_effect(effect, self.session.as_ref(), &mut self.callbacks, &mut self.outcome)
            {
                self.apply_timer(command);
            }
        }
    }

    fn apply_timer(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Start { id, kind, period } => {
                let period_ms = (period.as_millis() as u64).max(1);
                let order = match self.timers.iter().position(|t| t.id == id) {
                    Some(idx) => self.timers.remove(idx).order,
                    None => {
                        self.next_order += 1;
                        self.next_order
                    }
                };
                self.timers.push(VirtualTimer {
                    id,
                    kind,
                    period_ms,
                    due_ms: self.now_ms + period_ms,
                    order,
                });
            }
            TimerCommand::Cancel(id) => self.timers.retain(|t| t.id != id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationPhase, CountdownMachine, CountdownState};
    use crate::config::TimingConfig;
    use crate::managers::InMemorySession;
    use crate::testing::FakeDevice;

    fn runner(total: u32) -> (VirtualRunner<CountdownMachine>, Arc<InMemorySession>) {
        let session = Arc::new(InMemorySession::new());
        let runner = VirtualRunner::new(
            CountdownMachine::new(total, TimingConfig::default()),
            Arc::new(FakeDevice::connected(Some(90.0))),
            session.clone(),
        );
        (runner, session)
    }

    #[test]
    fn test_start_delay_then_ticks() {
        let (mut runner, _) = runner(30);
        runner.start();
        assert_eq!(runner.pending_timers(), vec![TimerId::StartDelay]);

        runner.advance(499);
        assert_eq!(runner.machine().state(), CountdownState::Waiting);
        runner.advance(1);
        assert_eq!(runner.machine().state(), CountdownState::Counting);
        assert_eq!(runner.pending_timers(), vec![TimerId::CountdownTick]);

        runner.advance(10_000);
        assert_eq!(runner.machine().remaining_seconds(), 20);
    }

    #[test]
    fn test_countdown_completes_at_thirty_and_a_half_seconds() {
        let (mut runner, session) = runner(30);
        runner.start();
        runner.advance(30_499);
        assert!(runner.outcome().is_none());
        runner.advance(1);
        assert_eq!(runner.outcome(), Some(&StageOutcome::Completed(())));
        assert!(runner.pending_timers().is_empty());
        assert_eq!(session.phase_history(), vec![Some(CalibrationPhase::Recording)]);
    }

    #[test]
    fn test_teardown_abandons() {
        let (mut runner, session) = runner(30);
        runner.start();
        runner.advance(5_000);
        runner.teardown();
        assert_eq!(runner.outcome(), Some(&StageOutcome::Abandoned));
        assert!(runner.pending_timers().is_empty());
        assert!(session.phase_history().is_empty());
    }

    #[test]
    fn test_run_until_terminal_respects_limit() {
        let (mut runner, _) = runner(30);
        runner.start();
        assert!(runner.run_until_terminal(1_000, 10_000).is_none());
        assert_eq!(runner.now_ms(), 10_000);
        assert!(runner.run_until_terminal(1_000, 60_000).is_some());
    }
}
