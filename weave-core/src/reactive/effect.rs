//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately. Tracked effects
//!    record the sources read during that run as their dependencies.
//!
//! 2. When any dependency notifies, the effect re-runs synchronously, before
//!    the notifying `set` returns.
//!
//! 3. Tracked effects drop their old subscriptions and subscribe to whatever
//!    the latest run read.
//!
//! # Cleanup
//!
//! The effect function may return a cleanup (see [`IntoCleanup`]). It runs
//! right before the next run and once more when the effect is disposed.
//!
//! # Re-entrancy
//!
//! An effect is never re-entered. A notification that arrives while the
//! effect is running (for example because the effect wrote to one of its
//! own dependencies) marks it pending, and it runs once more after the
//! current run finishes.
//!
//! # Lifetime
//!
//! Dependencies hold the effect strongly: it keeps running until
//! [`Effect::dispose`] is called or every dependency is dropped. Dropping the
//! `Effect` handle does not stop it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::graph::{self, NodeId, NodeKind};

use super::computed::Tracking;
use super::context::ReactiveContext;
use super::source::{Notify, SourceRef};
use super::subscriber::Subscription;

/// A cleanup returned from an effect run.
pub type Cleanup = Box<dyn FnOnce() + Send + Sync>;

/// Conversion from an effect function's return value to an optional cleanup.
///
/// Implemented for `()` (no cleanup), `Option<F>` and [`Cleanup`]. A function
/// that never returns a cleanup can return `None::<fn()>`.
pub trait IntoCleanup {
    fn into_cleanup(self) -> Option<Cleanup>;
}

impl IntoCleanup for () {
    fn into_cleanup(self) -> Option<Cleanup> {
        None
    }
}

impl<F> IntoCleanup for Option<F>
where
    F: FnOnce() + Send + Sync + 'static,
{
    fn into_cleanup(self) -> Option<Cleanup> {
        self.map(|f| Box::new(f) as Cleanup)
    }
}

impl IntoCleanup for Cleanup {
    fn into_cleanup(self) -> Option<Cleanup> {
        Some(self)
    }
}

type RunFn = Box<dyn Fn() -> Option<Cleanup> + Send + Sync>;

struct EffectInner {
    id: NodeId,
    run: RunFn,
    tracking: Tracking,
    cleanup: Mutex<Option<Cleanup>>,
    subscriptions: Mutex<SmallVec<[Subscription; 4]>>,
    running: AtomicBool,
    pending: AtomicBool,
    disposed: AtomicBool,
    run_count: AtomicUsize,
}

/// Resets the running flag even if the effect function panics.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl EffectInner {
    fn execute(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.running.swap(true, Ordering::AcqRel) {
            self.pending.store(true, Ordering::Release);
            return;
        }
        let _guard = RunningGuard(&self.running);

        loop {
            self.pending.store(false, Ordering::Release);

            let previous = self.cleanup.lock().take();
            if let Some(cleanup) = previous {
                cleanup();
            }
            if self.disposed.load(Ordering::Acquire) {
                break;
            }

            let next = match self.tracking {
                Tracking::Explicit => ReactiveContext::untracked(|| (self.run)()),
                Tracking::Auto => {
                    let (next, sources) = ReactiveContext::collect(self.id, || (self.run)());
                    self.attach(&sources);
                    next
                }
            };
            let runs = self.run_count.fetch_add(1, Ordering::Relaxed) + 1;
            trace!(effect = %self.id, runs, "effect ran");

            if self.disposed.load(Ordering::Acquire) {
                if let Some(cleanup) = next {
                    cleanup();
                }
                break;
            }
            *self.cleanup.lock() = next;

            if !self.pending.load(Ordering::Acquire) {
                break;
            }
        }
    }

    fn attach(self: &Arc<Self>, sources: &[SourceRef]) {
        self.detach();

        let mut subscriptions = SmallVec::new();
        for source in sources {
            let inner = Arc::clone(self);
            let notify: Notify = Arc::new(move || inner.execute());
            subscriptions.push(source.watch(notify));
        }

        let ids: Vec<NodeId> = sources.iter().map(|s| s.node_id()).collect();
        graph::record_dependencies(self.id, &ids);

        let mut slot = self.subscriptions.lock();
        *slot = subscriptions;
    }

    fn detach(&self) {
        let previous = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in previous {
            subscription.unsubscribe();
        }
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        graph::unregister(self.id);
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// }, [count.source()]);
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create an effect over an explicit list of dependencies.
    ///
    /// The function runs immediately, then on every dependency notification.
    pub fn new<F, C, I>(run: F, dependencies: I) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: IntoCleanup,
        I: IntoIterator<Item = SourceRef>,
    {
        let effect = Self::build(Box::new(move || run().into_cleanup()), Tracking::Explicit);
        let sources: Vec<SourceRef> = dependencies.into_iter().collect();
        effect.inner.execute();
        effect.inner.attach(&sources);
        effect
    }

    /// Create an effect whose dependencies are whatever it reads.
    pub fn tracked<F, C>(run: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
        C: IntoCleanup,
    {
        let effect = Self::build(Box::new(move || run().into_cleanup()), Tracking::Auto);
        effect.inner.execute();
        effect
    }

    fn build(run: RunFn, tracking: Tracking) -> Self {
        let inner = Arc::new(EffectInner {
            id: NodeId::new(),
            run,
            tracking,
            cleanup: Mutex::new(None),
            subscriptions: Mutex::new(SmallVec::new()),
            running: AtomicBool::new(false),
            pending: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
        });
        let liveness = Arc::downgrade(&inner);
        graph::register(inner.id, NodeKind::Effect, liveness);
        Self { inner }
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Run the effect now, as if a dependency had changed.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Stop the effect: unsubscribe from every dependency and run the
    /// pending cleanup. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.detach();
        let cleanup = self.inner.cleanup.lock().take();
        if let Some(cleanup) = cleanup {
            cleanup();
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.subscriptions.lock().len()
    }

    /// How this effect finds its dependencies.
    pub fn tracking(&self) -> Tracking {
        self.inner.tracking
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn effect_runs_on_creation() {
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let _effect = Effect::new(
            move || {
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            },
            [],
        );

        // Effect should have run once on creation
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_reruns_on_dependency_change() {
        let count = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));

        let effect = Effect::new(
            {
                let count = count.clone();
                let seen = seen.clone();
                move || seen.store(count.get(), Ordering::SeqCst)
            },
            [count.source()],
        );

        count.set(3);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(effect.run_count(), 2);

        // Unchanged value: no run.
        count.set(3);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn tracked_effect_discovers_dependencies() {
        let a = Signal::new(1);
        let b = Signal::new(2);
        let sum = Arc::new(AtomicI32::new(0));

        let effect = Effect::tracked({
            let (a, b, sum) = (a.clone(), b.clone(), sum.clone());
            move || sum.store(a.get() + b.get(), Ordering::SeqCst)
        });
        assert_eq!(effect.dependency_count(), 2);

        b.set(10);
        assert_eq!(sum.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn cleanup_runs_before_next_run_and_on_dispose() {
        let trigger = Signal::new(0);
        let cleanups = Arc::new(AtomicI32::new(0));

        let effect = Effect::new(
            {
                let cleanups = cleanups.clone();
                move || {
                    let cleanups = cleanups.clone();
                    Some(move || {
                        cleanups.fetch_add(1, Ordering::SeqCst);
                    })
                }
            },
            [trigger.source()],
        );
        assert_eq!(cleanups.load(Ordering::SeqCst), 0);

        trigger.set(1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);

        // Disposing twice does not run the cleanup again.
        effect.dispose();
        assert_eq!(cleanups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let trigger = Signal::new(0);
        let run_count = Arc::new(AtomicI32::new(0));
        let run_count_clone = run_count.clone();

        let effect = Effect::new(
            move || {
                run_count_clone.fetch_add(1, Ordering::SeqCst);
            },
            [trigger.source()],
        );

        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(trigger.subscriber_count(), 0);

        trigger.set(1);
        effect.execute();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn effect_writing_its_own_dependency_is_not_reentered() {
        let count = Signal::new(0);
        let depth = Arc::new(AtomicI32::new(0));
        let max_depth = Arc::new(AtomicI32::new(0));

        let effect = Effect::tracked({
            let (count, depth, max_depth) = (count.clone(), depth.clone(), max_depth.clone());
            move || {
                let now = depth.fetch_add(1, Ordering::SeqCst) + 1;
                max_depth.fetch_max(now, Ordering::SeqCst);
                let value = count.get();
                if value < 3 {
                    count.set(value + 1);
                }
                depth.fetch_sub(1, Ordering::SeqCst);
            }
        });

        // The first run subscribes only after it finishes.
        assert_eq!(count.get(), 1);
        assert_eq!(effect.run_count(), 1);

        count.set(0);
        assert_eq!(count.get(), 3);
        assert_eq!(max_depth.load(Ordering::SeqCst), 1);
        assert_eq!(effect.run_count(), 5);
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {}, []);
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());

        effect1.execute();
        assert_eq!(effect1.run_count(), 2);
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
