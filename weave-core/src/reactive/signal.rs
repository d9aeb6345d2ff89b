//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! notifies subscribers when that value changes.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a tracking context (computed, effect or
//!    binding), the signal is recorded as a dependency of that context.
//!
//! 2. `set` compares the new value with the stored one. Equal values are a
//!    no-op; anything else is stored and every subscriber is invoked, in
//!    subscription order, before `set` returns.
//!
//! 3. Subscribers may themselves set other signals. Such cascades run
//!    depth-first and complete before the original `set` returns.
//!
//! # Thread Safety
//!
//! Signals are `Send + Sync`. The value is protected by a `parking_lot`
//! RwLock which is never held while subscribers run.

use std::fmt::Debug;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use crate::graph::{self, NodeId, NodeKind};

use super::context::ReactiveContext;
use super::source::{Notify, Source, SourceRef};
use super::subscriber::{Subscribers, Subscription};

struct SignalInner<T> {
    value: RwLock<T>,
    subscribers: Subscribers<T>,
}

/// A reactive cell holding a value of type T.
///
/// Equality (`PartialEq`) decides whether a `set` is a change. For
/// [`crate::Value`] that is JavaScript-style strict equality.
///
/// Cloning a signal clones the handle; all clones share one cell.
///
/// # Example
///
/// ```rust
/// use weave_core::reactive::Signal;
///
/// let count = Signal::new(0);
/// let _sub = count.subscribe(|value| println!("count is now {value}"));
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Unique identifier for this signal.
    id: NodeId,

    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        let signal = Self {
            id: NodeId::new(),
            inner: Arc::new(SignalInner {
                value: RwLock::new(value),
                subscribers: Subscribers::new(),
            }),
        };
        let liveness = Arc::downgrade(&signal.inner);
        graph::register(signal.id, NodeKind::Signal, liveness);
        signal
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the current value.
    ///
    /// If called within a tracking context, this also records the signal as
    /// a dependency of the running computation.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    /// Get the current value without tracking dependencies.
    pub fn get_untracked(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Borrow the current value (tracked).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.read())
    }

    /// Set a new value and notify subscribers.
    ///
    /// Returns `false` (and notifies nobody) when the value is unchanged.
    pub fn set(&self, value: T) -> bool {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return false;
            }
            *guard = value.clone();
        }

        trace!(signal = %self.id, subscribers = self.inner.subscribers.len(), "signal changed");
        self.inner.subscribers.notify(&value);
        true
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let guard = self.inner.value.read();
            f(&guard)
        };
        self.set(new_value)
    }

    /// Register a callback invoked with every new value.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.subscribers.subscribe(callback)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Type-erased handle for use as an explicit dependency.
    pub fn source(&self) -> SourceRef {
        Arc::new(self.clone())
    }

    /// Whether both handles point at the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn track(&self) {
        ReactiveContext::track_with(self.id, || self.source());
    }
}

impl<T> Source for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn node_id(&self) -> NodeId {
        self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Signal
    }

    fn watch(&self, notify: Notify) -> Subscription {
        self.subscribe(move |_| notify())
    }
}

impl<T> Clone for Signal<T>
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

impl<T> PartialEq for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + PartialEq + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &self.get_untracked())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        assert!(signal.set(42));
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers_with_new_value() {
        let signal = Signal::new(0);
        let seen = Arc::new(AtomicI32::new(-1));
        let seen_clone = seen.clone();

        let _sub = signal.subscribe(move |value| {
            seen_clone.store(*value, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        signal.set(2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn setting_equal_value_does_not_notify() {
        let signal = Signal::new(String::from("a"));
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let _sub = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!signal.set(String::from("a")));
        assert_eq!(call_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn signal_unsubscribe() {
        let signal = Signal::new(0);
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let sub = signal.subscribe(move |_| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        signal.set(1);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        signal.set(2);
        // Should not have been called again
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn cascades_complete_before_set_returns() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        let c = Signal::new(0);
        let log = Arc::new(Mutex::new(Vec::new()));

        let b_clone = b.clone();
        let log_a = log.clone();
        let _s1 = a.subscribe(move |v| {
            log_a.lock().push("a");
            b_clone.set(v * 10);
        });

        let c_clone = c.clone();
        let log_b = log.clone();
        let _s2 = b.subscribe(move |v| {
            log_b.lock().push("b");
            c_clone.set(v + 1);
        });

        let log_a2 = log.clone();
        let _s3 = a.subscribe(move |_| log_a2.lock().push("a2"));

        a.set(2);
        assert_eq!(c.get(), 21);
        // Depth-first: b's cascade finishes before a's second subscriber.
        assert_eq!(*log.lock(), vec!["a", "b", "a2"]);
    }

    #[test]
    fn subscriber_may_read_the_signal_it_observes() {
        let signal = Signal::new(1);
        let seen = Arc::new(AtomicI32::new(0));

        let signal_clone = signal.clone();
        let seen_clone = seen.clone();
        let _sub = signal.subscribe(move |_| {
            seen_clone.store(signal_clone.get(), Ordering::SeqCst);
        });

        signal.set(9);
        assert_eq!(seen.load(Ordering::SeqCst), 9);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1, signal2);
        assert_ne!(signal1, Signal::new(42));
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }
}
