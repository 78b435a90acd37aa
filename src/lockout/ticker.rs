use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{self, MissedTickBehavior};

use super::clock::{Clock, ManualClock};

/// Work run on every tick; returning `Break` stops the repetition
pub type TickTask = Box<dyn FnMut() -> ControlFlow<()> + Send + 'static>;

/// Runs a task repeatedly at a fixed interval
pub trait Scheduler: Send + Sync {
    fn schedule_every(&self, every: Duration, task: TickTask) -> TickHandle;
}

/// Cancels a scheduled repetition
#[derive(Debug, Clone)]
pub struct TickHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<AbortHandle>,
}

impl TickHandle {
    fn new(cancelled: Arc<AtomicBool>, abort: Option<AbortHandle>) -> Self {
        Self { cancelled, abort }
    }

    /// Stop the repetition; safe to call more than once
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Whether the repetition was cancelled or ended itself
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Scheduler backed by `tokio::time::interval`
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    runtime: Handle,
}

impl TokioScheduler {
    /// Bind to the runtime of the calling context
    pub fn current() -> Result<Self> {
        let runtime = Handle::try_current()
            .context("Tick scheduler must be created inside a tokio runtime")?;
        Ok(Self { runtime })
    }
}

impl Scheduler for TokioScheduler {
    /// Tasks touch the store and the terminal, so each tick runs on the
    /// blocking pool instead of an async worker.
    fn schedule_every(&self, every: Duration, task: TickTask) -> TickHandle {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();

        let join = self.runtime.spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // First tick of a tokio interval completes immediately
            interval.tick().await;

            let mut task = task;
            loop {
                interval.tick().await;

                if flag.load(Ordering::SeqCst) {
                    break;
                }

                let step = tokio::task::spawn_blocking(move || {
                    let flow = task();
                    (task, flow)
                })
                .await;

                let flow = match step {
                    Ok((returned, flow)) => {
                        task = returned;
                        flow
                    }
                    Err(e) => {
                        tracing::warn!("Tick task failed: {}", e);
                        flag.store(true, Ordering::SeqCst);
                        break;
                    }
                };

                if flow.is_break() {
                    flag.store(true, Ordering::SeqCst);
                    tracing::debug!("Ticker finished");
                    break;
                }
            }
        });

        TickHandle::new(cancelled, Some(join.abort_handle()))
    }
}

struct ScheduledTask {
    every: chrono::Duration,
    next_due: DateTime<Utc>,
    task: TickTask,
    cancelled: Arc<AtomicBool>,
}

/// Scheduler that fires only when simulated time is advanced
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Number of repetitions that are still live
    pub fn pending(&self) -> usize {
        self.lock_tasks()
            .iter()
            .filter(|t| !t.cancelled.load(Ordering::SeqCst))
            .count()
    }

    /// Advance the clock by `by`, firing every tick that falls due on the way
    ///
    /// Returns the number of task invocations.
    pub fn advance(&self, by: chrono::Duration) -> usize {
        let target = self.clock.now() + by;
        let mut fired = 0;

        loop {
            // Tasks run without the list locked so they may schedule more work
            let mut tasks = std::mem::take(&mut *self.lock_tasks());
            tasks.retain(|t| !t.cancelled.load(Ordering::SeqCst));

            let due = tasks
                .iter()
                .map(|t| t.next_due)
                .min()
                .filter(|due| *due <= target);

            if let Some(due) = due {
                self.clock.set(due);

                for scheduled in tasks.iter_mut().filter(|t| t.next_due == due) {
                    fired += 1;
                    if (scheduled.task)().is_break() {
                        scheduled.cancelled.store(true, Ordering::SeqCst);
                    } else {
                        scheduled.next_due += scheduled.every;
                    }
                }
            }

            let mut guard = self.lock_tasks();
            let added = std::mem::take(&mut *guard);
            *guard = tasks;
            guard.extend(added);

            if due.is_none() {
                break;
            }
        }

        self.clock.set(target);
        fired
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<ScheduledTask>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_every(&self, every: Duration, task: TickTask) -> TickHandle {
        let every = chrono::Duration::from_std(every)
            .unwrap_or_else(|_| chrono::Duration::seconds(1))
            .max(chrono::Duration::milliseconds(1));

        let cancelled = Arc::new(AtomicBool::new(false));
        self.lock_tasks().push(ScheduledTask {
            every,
            next_due: self.clock.now() + every,
            task,
            cancelled: cancelled.clone(),
        });

        TickHandle::new(cancelled, None)
    }
}
