//! Timers
//!
//! Deferred work is the one thing the reactive core does not do
//! synchronously. Bindings that debounce (`.debounce` on models and event
//! handlers) schedule through a [`Scheduler`]:
//!
//! - [`TokioScheduler`] sleeps on a tokio runtime. Without a runtime, tasks
//!   run immediately.
//! - [`ManualScheduler`] keeps a virtual clock that tests advance by hand.
//!
//! Every scheduled task returns a [`TimerHandle`]. Once `cancel` returns,
//! the task either already finished or will never run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::AbortHandle;
use tracing::trace;

/// A deferred task.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that can run a task after a delay.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Cancellation state shared by a handle and its task. The task runs while
/// holding `running`, so `cancel` cannot return in the middle of a run.
/// The lock is reentrant so a task may cancel its own handle.
#[derive(Default)]
struct Gate {
    cancelled: AtomicBool,
    running: ReentrantMutex<()>,
}

impl Gate {
    fn fire(&self, task: Task) -> bool {
        let _running = self.running.lock();
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        task();
        true
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        drop(self.running.lock());
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Cancels a scheduled task.
#[derive(Clone)]
pub struct TimerHandle {
    gate: Arc<Gate>,
    abort: Option<AbortHandle>,
}

impl TimerHandle {
    fn new(gate: Arc<Gate>, abort: Option<AbortHandle>) -> Self {
        Self { gate, abort }
    }

    /// A handle for a task that already ran.
    fn finished() -> Self {
        let gate = Gate::default();
        gate.cancelled.store(true, Ordering::Release);
        Self::new(Arc::new(gate), None)
    }

    /// Cancel the task. Idempotent. If the task is running on another
    /// thread, waits for it to finish.
    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
        self.gate.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.gate.is_cancelled()
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tokio
// ----------------------------------------------------------------------------

/// Schedules tasks on a tokio runtime.
///
/// Tasks run wherever the runtime polls them. On a current-thread runtime
/// that is the thread driving it, so bindings stay on one thread; on a
/// multi-thread runtime it is a worker. [`TokioScheduler::with_handle`]
/// pins tasks to a given runtime instead of the ambient one.
#[derive(Debug, Default, Clone)]
pub struct TokioScheduler {
    handle: Option<Handle>,
}

impl TokioScheduler {
    /// Use whatever runtime is current when a task is scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always schedule on `handle`.
    pub fn with_handle(handle: Handle) -> Self {
        Self { handle: Some(handle) }
    }

    fn runtime(&self) -> Option<Handle> {
        self.handle.clone().or_else(|| Handle::try_current().ok())
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let Some(runtime) = self.runtime() else {
            trace!(?delay, "no tokio runtime, running task immediately");
            task();
            return TimerHandle::finished();
        };
        if runtime.runtime_flavor() == RuntimeFlavor::MultiThread {
            trace!(?delay, "timer will fire on a runtime worker thread");
        }

        let gate = Arc::new(Gate::default());
        let fire = Arc::clone(&gate);
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            fire.fire(task);
        });
        TimerHandle::new(gate, Some(join.abort_handle()))
    }
}

// ----------------------------------------------------------------------------
// Manual
// ----------------------------------------------------------------------------

struct Pending {
    due: Duration,
    seq: u64,
    gate: Arc<Gate>,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    queue: Vec<Pending>,
}

/// A scheduler driven by a virtual clock.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use weave_core::timer::{ManualScheduler, Scheduler};
///
/// let scheduler = ManualScheduler::new();
/// scheduler.schedule(Duration::from_millis(300), Box::new(|| println!("fired")));
///
/// assert_eq!(scheduler.advance(Duration::from_millis(299)), 0);
/// assert_eq!(scheduler.advance(Duration::from_millis(1)), 1); // prints "fired"
/// ```
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.state.lock().now
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|p| !p.gate.is_cancelled())
            .count()
    }

    /// Move the clock forward and run every task that became due, in due
    /// order. Tasks scheduled by those tasks run too if they fall inside the
    /// window. Returns the number of tasks run.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.lock();
                state.queue.retain(|p| !p.gate.is_cancelled());
                let index = state
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.due <= target)
                    .min_by_key(|(_, p)| (p.due, p.seq))
                    .map(|(i, _)| i);
                match index {
                    Some(index) => {
                        let pending = state.queue.swap_remove(index);
                        state.now = state.now.max(pending.due);
                        Some(pending)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };
            let Some(pending) = next else {
                break;
            };
            if pending.gate.fire(pending.task) {
                ran += 1;
            }
        }
        ran
    }

    /// Run everything that is pending, however far in the future.
    pub fn run_all(&self) -> usize {
        let last = self.state.lock().queue.iter().map(|p| p.due).max();
        match last {
            Some(due) => self.advance(due.saturating_sub(self.now())),
            None => 0,
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let gate = Arc::new(Gate::default());
        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.queue.push(Pending {
            due,
            seq,
            gate: Arc::clone(&gate),
            task,
        });
        TimerHandle::new(gate, None)
    }
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now())
            .field("pending", &self.pending())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Debouncer
// ----------------------------------------------------------------------------

/// Runs only the last of a burst of calls, `delay` after the burst ends.
pub struct Debouncer {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Mutex<Option<TimerHandle>>,
}

impl Debouncer {
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `task`, cancelling the previously scheduled one.
    pub fn call<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let previous = self.pending.lock().take();
        if let Some(previous) = previous {
            previous.cancel();
        }
        let handle = self.scheduler.schedule(self.delay, Box::new(task));
        *self.pending.lock() = Some(handle);
    }

    /// Cancel the pending call, if any.
    pub fn cancel(&self) {
        let pending = self.pending.lock().take();
        if let Some(handle) = pending {
            handle.cancel();
        }
    }

    /// Whether a call is waiting to run.
    pub fn is_pending(&self) -> bool {
        self.pending.lock().as_ref().is_some_and(|h| !h.is_cancelled())
    }
}

impl fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .finish()
    }
}
