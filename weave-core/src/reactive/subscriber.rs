//! Subscriber lists for the reactive system.
//!
//! Every observable cell (signal, computed, reactive object) owns a
//! [`Subscribers`] list. Registering a callback returns a [`Subscription`],
//! a type-erased handle that removes the callback again.
//!
//! # Re-entrancy
//!
//! Notification snapshots the list and releases the lock before invoking
//! anything, so callbacks are free to set other cells, subscribe, or
//! unsubscribe (themselves included). A callback unsubscribed during a
//! notification is skipped if the iteration has not reached it yet.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

/// Unique identifier for a subscriber.
///
/// Each registered callback gets a unique ID, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: SubscriberId,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

/// An ordered list of callbacks. Insertion order is notification order.
pub struct Subscribers<T> {
    entries: Arc<Mutex<Vec<Entry<T>>>>,
}

impl<T: 'static> Subscribers<T> {
    /// Create an empty list.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a callback.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        let active = Arc::new(AtomicBool::new(true));

        self.entries.lock().push(Entry {
            id,
            active: Arc::clone(&active),
            callback: Arc::new(callback),
        });

        let entries: Weak<Mutex<Vec<Entry<T>>>> = Arc::downgrade(&self.entries);
        Subscription::new(id, active, move |id| {
            if let Some(entries) = entries.upgrade() {
                entries.lock().retain(|entry| entry.id != id);
            }
        })
    }

    /// Invoke every active callback with `value`.
    pub fn notify(&self, value: &T) {
        let snapshot: SmallVec<[Entry<T>; 4]> = self.entries.lock().iter().cloned().collect();
        for entry in snapshot {
            if entry.active.load(Ordering::Acquire) {
                (entry.callback)(value);
            }
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<T: 'static> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct SubscriptionInner {
    id: SubscriberId,
    active: Arc<AtomicBool>,
    remove: Box<dyn Fn(SubscriberId) + Send + Sync>,
}

/// Handle returned by every `subscribe` call.
///
/// Dropping the handle does not unsubscribe. Call [`Subscription::unsubscribe`]
/// (any number of times) to remove the callback.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<SubscriptionInner>,
}

impl Subscription {
    fn new<F>(id: SubscriberId, active: Arc<AtomicBool>, remove: F) -> Self
    where
        F: Fn(SubscriberId) + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(SubscriptionInner {
                id,
                active,
                remove: Box::new(remove),
            }),
        }
    }

    /// The subscriber's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    /// Remove the callback. Idempotent.
    pub fn unsubscribe(&self) {
        if self.inner.active.swap(false, Ordering::AcqRel) {
            (self.inner.remove)(self.inner.id);
        }
    }

    /// Whether the callback is still registered.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.inner.id)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn notify_calls_in_subscription_order() {
        let list = Subscribers::<i32>::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in 0..3 {
            let order = order.clone();
            let _ = list.subscribe(move |value| order.lock().push((tag, *value)));
        }

        list.notify(&7);
        assert_eq!(*order.lock(), vec![(0, 7), (1, 7), (2, 7)]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let list = Subscribers::<i32>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let calls_clone = calls.clone();

        let sub = list.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(list.len(), 1);

        sub.unsubscribe();
        sub.unsubscribe();
        assert!(!sub.is_active());
        assert!(list.is_empty());

        list.notify(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn unsubscribe_during_notify_skips_unreached_callback() {
        let list = Subscribers::<i32>::new();
        let calls = Arc::new(AtomicI32::new(0));
        let second: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let second_clone = second.clone();
        let _first = list.subscribe(move |_| {
            if let Some(sub) = second_clone.lock().as_ref() {
                sub.unsubscribe();
            }
        });

        let calls_clone = calls.clone();
        let sub = list.subscribe(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        *second.lock() = Some(sub);

        list.notify(&1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn subscription_outlives_list() {
        let list = Subscribers::<i32>::new();
        let sub = list.subscribe(|_| {});
        drop(list);

        // Unsubscribing after the list is gone is a no-op.
        sub.unsubscribe();
        assert!(!sub.is_active());
    }
}
