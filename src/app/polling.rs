//! Live refresh schedule for the task detail view.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::app::store::{RefreshOutcome, TaskStore};
use crate::types::{TaskId, TaskStatus};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Terminal(TaskStatus),
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling { task_id: TaskId },
    Stopped { task_id: TaskId, reason: StopReason },
}

impl PollState {
    pub fn task_id(self) -> Option<TaskId> {
        match self {
            Self::Idle => None,
            Self::Polling { task_id } | Self::Stopped { task_id, .. } => Some(task_id),
        }
    }
}

/// Re-queries a task on a fixed cadence until it reaches a terminal status.
///
/// One schedule exists per bound task. The schedule awaits each refresh before
/// waiting for the next tick, so at most one scheduled retrieval is in flight.
/// Tearing down (or rebinding, or dropping the controller) aborts the schedule
/// and resets the store, which discards any response still on the wire.
pub struct PollingController {
    store: Arc<TaskStore>,
    interval: Duration,
    state: Arc<watch::Sender<PollState>>,
    failures: Arc<AtomicU32>,
    generation: Arc<AtomicU64>,
    binding: Option<Binding>,
}

struct Binding {
    task_id: TaskId,
    wake: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl PollingController {
    pub fn new(store: Arc<TaskStore>, interval: Duration) -> Self {
        let (state, _) = watch::channel(PollState::Idle);
        Self {
            store,
            interval,
            state: Arc::new(state),
            failures: Arc::new(AtomicU32::new(0)),
            generation: Arc::new(AtomicU64::new(0)),
            binding: None,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PollState> {
        self.state.subscribe()
    }

    /// Consecutive failed refreshes since the last applied snapshot.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Starts a fresh schedule for `task_id`, replacing any existing one.
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(&mut self, task_id: TaskId) {
        self.release();
        self.store.reset();
        self.failures.store(0, Ordering::Relaxed);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_replace(PollState::Polling { task_id });

        let wake = Arc::new(Notify::new());
        let schedule = Schedule {
            store: Arc::clone(&self.store),
            task_id,
            interval: self.interval,
            wake: Arc::clone(&wake),
            state: Arc::clone(&self.state),
            failures: Arc::clone(&self.failures),
            generation: Arc::clone(&self.generation),
            own_generation: generation,
        };
        let handle = tokio::spawn(schedule.run());

        info!(task_id = %task_id, interval_ms = self.interval.as_millis() as u64, "polling started");
        self.binding = Some(Binding {
            task_id,
            wake,
            handle,
        });
    }

    /// Runs the next retrieval now instead of waiting for the tick.
    ///
    /// Has no effect once the schedule has stopped.
    pub fn refresh_now(&self) {
        if let Some(binding) = self.binding.as_ref()
            && !binding.handle.is_finished()
        {
            debug!(task_id = %binding.task_id, "manual refresh requested");
            binding.wake.notify_one();
        }
    }

    pub fn teardown(&mut self) {
        let Some(task_id) = self.release() else {
            return;
        };
        self.store.reset();
        self.state.send_if_modified(|state| match *state {
            PollState::Polling { task_id: current } if current == task_id => {
                *state = PollState::Stopped {
                    task_id,
                    reason: StopReason::TornDown,
                };
                true
            }
            _ => false,
        });
        info!(task_id = %task_id, "polling torn down");
    }

    fn release(&mut self) -> Option<TaskId> {
        let binding = self.binding.take()?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        binding.handle.abort();
        Some(binding.task_id)
    }
}

impl Drop for PollingController {
    fn drop(&mut self) {
        self.teardown();
    }
}

struct Schedule {
    store: Arc<TaskStore>,
    task_id: TaskId,
    interval: Duration,
    wake: Arc<Notify>,
    state: Arc<watch::Sender<PollState>>,
    failures: Arc<AtomicU32>,
    generation: Arc<AtomicU64>,
    own_generation: u64,
}

impl Schedule {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // A wake stored during a slow refresh replaces the overdue tick.
            tokio::select! {
                biased;
                _ = self.wake.notified() => ticker.reset(),
                _ = ticker.tick() => {}
            }

            match self.store.refresh(self.task_id).await {
                Ok(RefreshOutcome::Applied(snapshot)) => {
                    self.failures.store(0, Ordering::Relaxed);
                    let status = snapshot.task.status;
                    debug!(task_id = %self.task_id, status = %status, "poll observed status");
                    if status.is_terminal() {
                        self.stop(status);
                        return;
                    }
                }
                Ok(RefreshOutcome::Superseded) => {
                    debug!(task_id = %self.task_id, "poll result superseded");
                }
                Err(err) => {
                    let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        task_id = %self.task_id,
                        error = %err,
                        consecutive_failures = failures,
                        "refresh failed; retrying on next tick"
                    );
                }
            }
        }
    }

    fn stop(&self, status: TaskStatus) {
        let task_id = self.task_id;
        let current = self.generation.load(Ordering::SeqCst) == self.own_generation;
        let stopped = current
            && self.state.send_if_modified(|state| match *state {
                PollState::Polling { task_id: polled } if polled == task_id => {
                    *state = PollState::Stopped {
                        task_id,
                        reason: StopReason::Terminal(status),
                    };
                    true
                }
                _ => false,
            });
        if stopped {
            info!(task_id = %task_id, status = %status, "task reached terminal status; polling stopped");
        }
    }
}
