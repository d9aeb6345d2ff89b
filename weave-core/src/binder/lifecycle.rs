//! Mount lifecycle: cleanup lists and the [`Mount`] handle.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::dom::Node;
use crate::expr::panic_message;
use crate::scope::Scope;

type CleanupFn = Box<dyn FnOnce() + Send>;

/// Cleanups registered by bindings. Each runs exactly once.
///
/// Once the list has run, cleanups added later run immediately.
#[derive(Default)]
pub struct CleanupList {
    entries: Mutex<Vec<CleanupFn>>,
    closed: AtomicBool,
}

impl CleanupList {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a cleanup.
    pub fn add<F>(&self, cleanup: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::Acquire) {
            run_isolated(Box::new(cleanup));
            return;
        }
        self.entries.lock().push(Box::new(cleanup));
    }

    /// Run every registered cleanup, most recent first. Idempotent.
    pub fn run(&self) {
        self.closed.store(true, Ordering::Release);
        loop {
            let entries = std::mem::take(&mut *self.entries.lock());
            if entries.is_empty() {
                break;
            }
            for cleanup in entries.into_iter().rev() {
                run_isolated(cleanup);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CleanupList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupList")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_isolated(cleanup: CleanupFn) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(cleanup)) {
        warn!(error = %panic_message(payload.as_ref()), "cleanup panicked");
    }
}

/// Where a root is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    Unmounted,
    Scanning,
    Bound,
}

/// A bound root. Unmounts when dropped.
pub struct Mount {
    root: Node,
    scope: Scope,
    cleanups: Arc<CleanupList>,
    state: Arc<Mutex<MountState>>,
    registry: Arc<DashMap<u64, ()>>,
}

impl Mount {
    pub(crate) fn new(
        root: Node,
        scope: Scope,
        cleanups: Arc<CleanupList>,
        state: Arc<Mutex<MountState>>,
        registry: Arc<DashMap<u64, ()>>,
    ) -> Self {
        Self {
            root,
            scope,
            cleanups,
            state,
            registry,
        }
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The root's scope: declarative state, computeds and anything the host
    /// inserted.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> MountState {
        *self.state.lock()
    }

    pub fn is_mounted(&self) -> bool {
        self.state() != MountState::Unmounted
    }

    /// Number of cleanups registered at the root level.
    pub fn cleanup_count(&self) -> usize {
        self.cleanups.len()
    }

    /// Tear every binding down. Idempotent.
    pub fn unmount(&self) {
        {
            let mut state = self.state.lock();
            if *state == MountState::Unmounted {
                return;
            }
            *state = MountState::Unmounted;
        }
        let cleanups = self.cleanups.len();
        self.cleanups.run();
        self.registry.remove(&self.root.id());
        debug!(root = self.root.id(), cleanups, "unmounted");
    }
}

impl Drop for Mount {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("root", &self.root)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn cleanups_run_once_in_reverse_order() {
        let list = CleanupList::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            list.add(move || order.lock().push(i));
        }

        list.run();
        list.run();
        assert_eq!(*order.lock(), vec![2, 1, 0]);
        assert!(list.is_closed());
    }

    #[test]
    fn late_cleanups_run_immediately() {
        let list = CleanupList::new();
        list.run();

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        list.add(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(list.is_empty());
    }

    #[test]
    fn a_panicking_cleanup_does_not_stop_the_rest() {
        let list = CleanupList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        list.add(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        list.add(|| panic!("broken cleanup"));

        list.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cleanups_registered_during_run_also_run() {
        let list = CleanupList::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = list.clone();
        let c = count.clone();
        list.add(move || {
            let c = c.clone();
            inner.add(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        });

        list.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
