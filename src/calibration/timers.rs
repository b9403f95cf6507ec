//! Timer bookkeeping shared by the stage state machines.
//!
//! Machines never own real timers. They emit [`TimerCommand`]s and record
//! what they started in [`ActiveTimers`], so a terminal transition can cancel
//! exactly the timers still outstanding and tests can assert that nothing is
//! left running.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Named timers used across the stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerId {
    /// One-shot delay between countdown mount and the first tick
    StartDelay,
    /// 1 Hz countdown decrement
    CountdownTick,
    /// 1 Hz recording elapsed counter
    ElapsedTick,
    /// 2 Hz signal sampling
    SampleTick,
    /// One-shot sustained-critical-signal timer
    AutoPause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    Once,
    Repeating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerCommand {
    Start {
        id: TimerId,
        kind: TimerKind,
        period: Duration,
    },
    Cancel(TimerId),
}

/// Timers a machine has started and not yet seen cancelled or fired
#[derive(Debug, Clone, Default)]
pub struct ActiveTimers {
    active: Vec<TimerId>,
}

impl ActiveTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start `id`; restarting an active timer replaces it
    pub fn start(&mut self, id: TimerId, kind: TimerKind, period: Duration) -> TimerCommand {
        if !self.active.contains(&id) {
            self.active.push(id);
        }
        TimerCommand::Start { id, kind, period }
    }

    /// Cancel `id` if it is running
    pub fn cancel(&mut self, id: TimerId) -> Option<TimerCommand> {
        let idx = self.active.iter().position(|t| *t == id)?;
        self.active.remove(idx);
        Some(TimerCommand::Cancel(id))
    }

    /// A one-shot timer fired; it is no longer outstanding
    pub fn fired_once(&mut self, id: TimerId) {
        self.active.retain(|t| *t != id);
    }

    /// Cancel everything still outstanding
    pub fn cancel_all(&mut self) -> Vec<TimerCommand> {
        self.active.drain(..).map(TimerCommand::Cancel).collect()
    }

    pub fn is_active(&self, id: TimerId) -> bool {
        self.active.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn ids(&self) -> &[TimerId] {
        &self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_cancel() {
        let mut timers = ActiveTimers::new();
        let cmd = timers.start(TimerId::SampleTick, TimerKind::Repeating, Duration::from_millis(500));
        assert!(matches!(cmd, TimerCommand::Start { id: TimerId::SampleTick, .. }));
        assert!(timers.is_active(TimerId::SampleTick));

        assert_eq!(
            timers.cancel(TimerId::SampleTick),
            Some(TimerCommand::Cancel(TimerId::SampleTick))
        );
        assert!(timers.cancel(TimerId::SampleTick).is_none());
        assert!(timers.is_empty());
    }

    #[test]
    fn test_restart_does_not_duplicate() {
        let mut timers = ActiveTimers::new();
        timers.start(TimerId::AutoPause, TimerKind::Once, Duration::from_secs(10));
        timers.start(TimerId::AutoPause, TimerKind::Once, Duration::from_secs(10));
        assert_eq!(timers.ids().len(), 1);
    }

    #[test]
    fn test_cancel_all_preserves_start_order() {
        let mut timers = ActiveTimers::new();
        timers.start(TimerId::ElapsedTick, TimerKind::Repeating, Duration::from_secs(1));
        timers.start(TimerId::SampleTick, TimerKind::Repeating, Duration::from_millis(500));
        timers.start(TimerId::AutoPause, TimerKind::Once, Duration::from_secs(10));
        timers.fired_once(TimerId::AutoPause);

        assert_eq!(
            timers.cancel_all(),
            vec![
                TimerCommand::Cancel(TimerId::ElapsedTick),
                TimerCommand::Cancel(TimerId::SampleTick),
            ]
        );
        assert!(timers.is_empty());
    }
}
