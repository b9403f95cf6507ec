//! Tokio driver for the stage state machines.
//!
//! Each stage runs in its own task. Timers are small spawned tasks that post
//! `(TimerId, generation)` back to the stage loop; a fire whose generation no
//! longer matches the running timer was cancelled in the meantime and is
//! dropped. User commands arrive on an mpsc channel, and dropping every
//! command sender (the UI unmounted the stage) tears the stage down without
//! touching the session phase.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

use crate::calibration::machine::{
    apply_effect, StageCallbacks, StageCommand, StageEffect, StageKind, StageMachine,
    StageOutcome, StageSnapshot,
};
use crate::calibration::timers::{TimerCommand, TimerId, TimerKind};
use crate::device::{SessionSink, SignalSource};
use crate::error::{log_calibration_error, CalibrationError};

const SNAPSHOT_BUFFER: usize = 64;

type TimerFire = (TimerId, u64);

/// Real timers backing the machine's `ActiveTimers`
struct TimerTasks {
    tx: mpsc::UnboundedSender<TimerFire>,
    running: HashMap<TimerId, (u64, TimerKind, JoinHandle<()>)>,
    next_generation: u64,
}

impl TimerTasks {
    fn new(tx: mpsc::UnboundedSender<TimerFire>) -> Self {
        Self {
            tx,
            running: HashMap::new(),
            next_generation: 0,
        }
    }

    fn apply(&mut self, command: TimerCommand) {
        match command {
            TimerCommand::Start { id, kind, period } => {
                self.cancel(id);
                self.next_generation += 1;
                let generation = self.next_generation;
                let tx = self.tx.clone();
                let handle = tokio::spawn(async move {
                    match kind {
                        TimerKind::Once => {
                            sleep(period).await;
                            let _ = tx.send((id, generation));
                        }
                        TimerKind::Repeating => {
                            let mut interval = interval_at(Instant::now() + period, period);
                            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                            loop {
                                interval.tick().await;
                                if tx.send((id, generation)).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
                self.running.insert(id, (generation, kind, handle));
            }
            TimerCommand::Cancel(id) => self.cancel(id),
        }
    }

    fn cancel(&mut self, id: TimerId) {
        if let Some((_, _, handle)) = self.running.remove(&id) {
            handle.abort();
        }
    }

    /// Accept a fire if it belongs to the running timer generation
    fn accept(&mut self, id: TimerId, generation: u64) -> bool {
        match self.running.get(&id) {
            Some((current, kind, _)) if *current == generation => {
                if *kind == TimerKind::Once {
                    self.running.remove(&id);
                }
                true
            }
            _ => false,
        }
    }

    fn abort_all(&mut self) {
        for (_, (_, _, handle)) in self.running.drain() {
            handle.abort();
        }
    }
}

impl Drop for TimerTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// Handle to a running stage
///
/// Dropping the handle unmounts the stage: every timer is cancelled and the
/// stage ends as `Abandoned` without firing callbacks.
pub struct StageHandle<T> {
    kind: StageKind,
    commands: mpsc::UnboundedSender<StageCommand>,
    updates: broadcast::Sender<StageSnapshot>,
    task: JoinHandle<StageOutcome<T>>,
}

impl<T> StageHandle<T> {
    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub fn pause(&self) {
        self.send(StageCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(StageCommand::Resume);
    }

    /// Cancel after the shell has confirmed it with the user
    pub fn cancel(&self) {
        self.send(StageCommand::Cancel);
    }

    pub fn finish(&self) {
        self.send(StageCommand::Finish);
    }

    pub fn send(&self, command: StageCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!(
                "[StageDriver] {:?} ignored, {} stage already finished",
                command,
                self.kind.as_str()
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StageSnapshot> {
        self.updates.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the stage to reach a terminal state
    pub async fn join(self) -> Result<StageOutcome<T>, CalibrationError> {
        let StageHandle {
            kind,
            commands,
            task,
            ..
        } = self;
        // Holding the sender keeps the stage mounted while we wait
        let result = task.await;
        drop(commands);
        join_result(kind, result)
    }

    /// Tear the stage down and wait for it to stop
    pub async fn unmount(self) -> Result<StageOutcome<T>, CalibrationError> {
        let StageHandle {
            kind,
            commands,
            task,
            ..
        } = self;
        drop(commands);
        join_result(kind, task.await)
    }
}

fn join_result<T>(
    kind: StageKind,
    result: Result<StageOutcome<T>, tokio::task::JoinError>,
) -> Result<StageOutcome<T>, CalibrationError> {
    result.map_err(|err| {
        let err = CalibrationError::StageAborted {
            reason: format!("{} stage task failed: {}", kind.as_str(), err),
        };
        log_calibration_error(&err, "stage_join");
        err
    })
}

/// Spawn `machine` on the current tokio runtime
///
/// Snapshots are published on `updates` when given, otherwise on a private
/// channel reachable through [`StageHandle::subscribe`].
pub fn spawn_stage<M: StageMachine>(
    machine: M,
    device: Arc<dyn SignalSource>,
    session: Arc<dyn SessionSink>,
    callbacks: StageCallbacks<M::Output>,
    updates: Option<broadcast::Sender<StageSnapshot>>,
) -> StageHandle<M::Output> {
    let kind = machine.kind();
    let updates = updates.unwrap_or_else(|| broadcast::channel(SNAPSHOT_BUFFER).0);
    let (commands, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_stage(
        machine,
        device,
        session,
        callbacks,
        updates.clone(),
        command_rx,
    ));

    StageHandle {
        kind,
        commands,
        updates,
        task,
    }
}

struct StageLoop<M: StageMachine> {
    machine: M,
    session: Arc<dyn SessionSink>,
    callbacks: StageCallbacks<M::Output>,
    updates: broadcast::Sender<StageSnapshot>,
    timers: TimerTasks,
    outcome: Option<StageOutcome<M::Output>>,
    last_state: &'static str,
}

impl<M: StageMachine> StageLoop<M> {
    fn execute(&mut self, effects: Vec<StageEffect<M::Output>>) {
        for effect in effects {
            if let Some(command) =
                apply_effect(effect, self.session.as_ref(), &mut self.callbacks, &mut self.outcome)
            {
                self.timers.apply(command);
            }
        }
    }

    fn publish(&mut self, timer: Option<TimerId>) {
        let snapshot = self.machine.snapshot();
        let state = snapshot.state_name();
        let hub = crate::telemetry::hub();

        if state != self.last_state {
            tracing::debug!(
                "[StageDriver] {} {} -> {}",
                snapshot.kind().as_str(),
                self.last_state,
                state
            );
            hub.record_stage_transition(snapshot.kind(), self.last_state, state);
            self.last_state = state;
        }
        if let (Some(TimerId::SampleTick), StageSnapshot::Recording(s)) = (timer, &snapshot) {
            if let Some(score) = s.last_score {
                hub.record_signal_score(StageKind::Recording, score);
            }
        }

        // No subscribers is fine
        let _ = self.updates.send(snapshot);
    }
}

async fn run_stage<M: StageMachine>(
    machine: M,
    device: Arc<dyn SignalSource>,
    session: Arc<dyn SessionSink>,
    callbacks: StageCallbacks<M::Output>,
    updates: broadcast::Sender<StageSnapshot>,
    mut commands: mpsc::UnboundedReceiver<StageCommand>,
) -> StageOutcome<M::Output> {
    let (timer_tx, mut timer_rx) = mpsc::unbounded_channel();
    let kind = machine.kind();
    let epoch_ms = now_epoch_ms();
    let started = Instant::now();
    let last_state = machine.snapshot().state_name();

    let mut stage = StageLoop {
        machine,
        session,
        callbacks,
        updates,
        timers: TimerTasks::new(timer_tx),
        outcome: None,
        last_state,
    };

    tracing::info!("[StageDriver] {} stage mounted", kind.as_str());
    let effects = stage.machine.start();
    stage.execute(effects);
    stage.publish(None);

    while stage.outcome.is_none() {
        tokio::select! {
            Some((id, generation)) = timer_rx.recv() => {
                if !stage.timers.accept(id, generation) {
                    tracing::trace!("[StageDriver] Dropping stale {:?} fire", id);
                    continue;
                }
                let now_ms = epoch_ms + started.elapsed().as_millis() as u64;
                let effects = stage.machine.on_timer(id, device.as_ref(), now_ms);
                stage.execute(effects);
                stage.publish(Some(id));
            }
            command = commands.recv() => match command {
                Some(command) => {
                    let effects = stage.machine.on_command(command);
                    stage.execute(effects);
                    stage.publish(None);
                }
                None => {
                    tracing::info!("[StageDriver] {} stage unmounted", kind.as_str());
                    let effects = stage.machine.teardown();
                    stage.execute(effects);
                    stage.outcome = Some(StageOutcome::Abandoned);
                }
            },
        }
    }

    stage.timers.abort_all();
    let outcome = stage.outcome.take().unwrap_or(StageOutcome::Abandoned);
    crate::telemetry::hub().record_stage_outcome(kind, outcome.as_str());
    tracing::info!("[StageDriver] {} stage {}", kind.as_str(), outcome.as_str());
    outcome
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
