//! Computed Implementation
//!
//! A Computed is a derived, read-only value that is kept equal to its
//! compute function evaluated over the latest dependency values.
//!
//! # How Computeds Work
//!
//! 1. On creation, the compute function runs once and the result is cached.
//!
//! 2. The computed subscribes to its dependencies: either an explicit,
//!    ordered list ([`Computed::new`]) or every source read while computing
//!    ([`Computed::tracked`]). Tracked computeds re-subscribe after every
//!    run because the set of sources read may change.
//!
//! 3. When any dependency notifies, the computed recomputes immediately.
//!    If the result differs from the cached value, it is stored and the
//!    computed's own subscribers are notified.
//!
//! # Lifetime
//!
//! Dependencies hold only weak references to the computed. Dropping the last
//! handle (or calling [`Computed::dispose`]) unsubscribes it from everything.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::graph::{self, NodeId, NodeKind};

use super::context::ReactiveContext;
use super::source::{Notify, Source, SourceRef};
use super::subscriber::{Subscribers, Subscription};

/// How a computed or effect finds its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tracking {
    /// A fixed list given at construction.
    Explicit,
    /// Whatever the function reads, re-collected on every run.
    Auto,
}

struct ComputedInner<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T + Send + Sync>,
    tracking: Tracking,
    value: RwLock<T>,
    subscribers: Subscribers<T>,

    /// Strong handles to upstream sources keep them alive for as long as
    /// this computed is.
    sources: Mutex<Vec<SourceRef>>,
    subscriptions: Mutex<SmallVec<[Subscription; 4]>>,

    computing: AtomicBool,
    disposed: AtomicBool,
    recompute_count: AtomicUsize,
}

impl<T> ComputedInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn evaluate(&self) -> (T, Option<Vec<SourceRef>>) {
        match self.tracking {
            Tracking::Explicit => (ReactiveContext::untracked(|| (self.compute)()), None),
            Tracking::Auto => {
                let (value, sources) = ReactiveContext::collect(self.id, || (self.compute)());
                (value, Some(sources))
            }
        }
    }

    fn recompute(self: &Arc<Self>) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        if self.computing.swap(true, Ordering::AcqRel) {
            warn!(computed = %self.id, "computed re-entered while recomputing; skipping");
            return;
        }

        let (next, sources) = self.evaluate();
        if let Some(sources) = sources {
            self.attach(sources);
        }
        self.recompute_count.fetch_add(1, Ordering::Relaxed);
        self.computing.store(false, Ordering::Release);

        let changed = {
            let mut guard = self.value.write();
            if *guard == next {
                false
            } else {
                *guard = next.clone();
                true
            }
        };

        if changed {
            trace!(computed = %self.id, "computed changed");
            self.subscribers.notify(&next);
        }
    }

    /// Replace the current dependency subscriptions with `sources`.
    fn attach(self: &Arc<Self>, sources: Vec<SourceRef>) {
        self.detach();

        let mut subscriptions = SmallVec::new();
        for source in &sources {
            let weak: Weak<Self> = Arc::downgrade(self);
            let notify: Notify = Arc::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.recompute();
                }
            });
            subscriptions.push(source.watch(notify));
        }

        let ids: Vec<NodeId> = sources.iter().map(|s| s.node_id()).collect();
        graph::record_dependencies(self.id, &ids);

        *self.subscriptions.lock() = subscriptions;
        *self.sources.lock() = sources;
    }

    fn detach(&self) {
        let previous = std::mem::take(&mut *self.subscriptions.lock());
        for subscription in previous {
            subscription.unsubscribe();
        }
        self.sources.lock().clear();
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for subscription in self.subscriptions.get_mut().drain(..) {
            subscription.unsubscribe();
        }
        graph::unregister(self.id);
    }
}

/// A derived value that recomputes whenever a dependency changes.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. `PartialEq` decides whether a
///   recompute produced a change worth notifying about.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let doubled = Computed::new({
///     let count = count.clone();
///     move || count.get() * 2
/// }, [count.source()]);
///
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    id: NodeId,
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a computed over an explicit, ordered list of dependencies.
    pub fn new<F, I>(compute: F, dependencies: I) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        I: IntoIterator<Item = SourceRef>,
    {
        Self::build(Box::new(compute), Tracking::Explicit, Some(dependencies.into_iter().collect()))
    }

    /// Create a computed whose dependencies are discovered while computing.
    pub fn tracked<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::build(Box::new(compute), Tracking::Auto, None)
    }

    fn build(
        compute: Box<dyn Fn() -> T + Send + Sync>,
        tracking: Tracking,
        explicit: Option<Vec<SourceRef>>,
    ) -> Self {
        let id = NodeId::new();
        let (value, tracked) = match tracking {
            Tracking::Explicit => (ReactiveContext::untracked(&compute), None),
            Tracking::Auto => {
                let (value, sources) = ReactiveContext::collect(id, &compute);
                (value, Some(sources))
            }
        };

        let inner = Arc::new(ComputedInner {
            id,
            compute,
            tracking,
            value: RwLock::new(value),
            subscribers: Subscribers::new(),
            sources: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(SmallVec::new()),
            computing: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            recompute_count: AtomicUsize::new(1),
        });

        let liveness = Arc::downgrade(&inner);
        graph::register(id, NodeKind::Computed, liveness);
        inner.attach(explicit.or(tracked).unwrap_or_default());

        Self { id, inner }
    }

    /// Get the computed's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value (tracked).
    pub fn get(&self) -> T {
        ReactiveContext::track_with(self.id, || self.source());
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Register a callback invoked with every new value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Unsubscribe from every dependency. The cached value stays readable.
    pub fn dispose(&self) {
        if !self.inner.disposed.swap(true, Ordering::AcqRel) {
            self.inner.detach();
        }
    }

    /// Whether [`Computed::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// How this computed finds its dependencies.
    pub fn tracking(&self) -> Tracking {
        self.inner.tracking
    }

    /// Number of times the compute function has run.
    pub fn recompute_count(&self) -> usize {
        self.inner.recompute_count.load(Ordering::Relaxed)
    }

    /// Number of sources this computed currently depends on.
    pub fn dependency_count(&self) -> usize {
        self.inner.sources.lock().len()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Type-erased handle for use as an explicit dependency.
    pub fn source(&self) -> SourceRef {
        Arc::new(self.clone())
    }

    /// Whether both handles point at the same computed.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Source for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Computed
    }

    fn watch(&self, notify: Notify) -> Subscription {
        self.subscribe(move |_| notify())
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> PartialEq for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("tracking", &self.inner.tracking)
            .field("dependency_count", &self.dependency_count())
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
    fn computes_on_creation() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(
            move || {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
                42
            },
            [],
        );

        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(computed.get(), 42);
        // Reads use the cached value
        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn recomputes_when_explicit_dependency_changes() {
        let c = Signal::new(0);
        let d = Computed::new(
            {
                let c = c.clone();
                move || c.get() * 2
            },
            [c.source()],
        );

        c.set(5);
        assert_eq!(d.get(), 10);
        assert_eq!(d.tracking(), Tracking::Explicit);
    }

    #[test]
    fn explicit_computed_ignores_undeclared_reads() {
        let declared = Signal::new(1);
        let hidden = Signal::new(100);
        let sum = Computed::new(
            {
                let declared = declared.clone();
                let hidden = hidden.clone();
                move || declared.get() + hidden.get()
            },
            [declared.source()],
        );

        hidden.set(200);
        assert_eq!(sum.get(), 101);

        declared.set(2);
        assert_eq!(sum.get(), 202);
    }

    #[test]
    fn tracked_computed_follows_branch_changes() {
        let use_a = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);

        let picked = Computed::tracked({
            let (use_a, a, b) = (use_a.clone(), a.clone(), b.clone());
            move || if use_a.get() { a.get() } else { b.get() }
        });
        assert_eq!(picked.get(), 1);
        assert_eq!(picked.dependency_count(), 2);

        use_a.set(false);
        assert_eq!(picked.get(), 2);

        // `a` is no longer read, so changing it does not recompute.
        let runs = picked.recompute_count();
        a.set(10);
        assert_eq!(picked.recompute_count(), runs);

        b.set(3);
        assert_eq!(picked.get(), 3);
    }

    #[test]
    fn notifies_only_when_result_changes() {
        let n = Signal::new(2);
        let parity = Computed::new(
            {
                let n = n.clone();
                move || n.get() % 2
            },
            [n.source()],
        );

        let notified = Arc::new(AtomicI32::new(0));
        let notified_clone = notified.clone();
        let _sub = parity.subscribe(move |_| {
            notified_clone.fetch_add(1, Ordering::SeqCst);
        });

        n.set(4);
        assert_eq!(notified.load(Ordering::SeqCst), 0);

        n.set(5);
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_depends_on_computed() {
        let base = Signal::new(5);
        let doubled = Computed::new(
            {
                let base = base.clone();
                move || base.get() * 2
            },
            [base.source()],
        );
        let plus_ten = Computed::new(
            {
                let doubled = doubled.clone();
                move || doubled.get() + 10
            },
            [doubled.source()],
        );

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.get(), 20);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn dispose_stops_recomputing() {
        let s = Signal::new(1);
        let c = Computed::new(
            {
                let s = s.clone();
                move || s.get() + 1
            },
            [s.source()],
        );

        c.dispose();
        assert!(c.is_disposed());
        assert_eq!(s.subscriber_count(), 0);

        s.set(5);
        assert_eq!(c.get(), 2);
    }

    #[test]
    fn dropping_last_handle_unsubscribes() {
        let s = Signal::new(1);
        let c = Computed::new(
            {
                let s = s.clone();
                move || s.get()
            },
            [s.source()],
        );
        assert_eq!(s.subscriber_count(), 1);

        drop(c);
        assert_eq!(s.subscriber_count(), 0);
    }
}
