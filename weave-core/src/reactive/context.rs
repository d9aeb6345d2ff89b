//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a signal is read,
//! the running computation records it as a dependency.
//!
//! # Implementation
//!
//! We use a thread-local stack to track the currently executing computation.
//! When entering a reactive context (e.g., running a computed or an effect),
//! we push an entry onto the stack. When the computation completes, we pop it.
//!
//! This design supports nested reactive contexts (e.g., a binding that reads
//! a computed which reads a signal). An *untracked* entry shadows the
//! enclosing one so that reads inside it are not recorded anywhere.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::graph::NodeId;

use super::source::SourceRef;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// The node that owns this context, `None` for untracked sections.
    owner: Option<NodeId>,
    /// Sources read during this computation, deduplicated, in read order.
    sources: IndexMap<NodeId, SourceRef>,
}

/// Guard that pops the context when dropped.
///
/// This keeps the context stack balanced even if the computation panics.
pub struct ReactiveContext {
    owner: Option<NodeId>,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a new tracking context for the given owner.
    ///
    /// While this context is active, any source that is read is recorded.
    pub fn enter(owner: NodeId) -> Self {
        Self::push(Some(owner))
    }

    fn push(owner: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                owner,
                sources: IndexMap::new(),
            });
        });
        Self {
            owner,
            popped: false,
        }
    }

    /// Run `f` without recording any reads into the enclosing context.
    pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
        let _guard = Self::push(None);
        f()
    }

    /// Run `f` inside a tracking context and return what it read.
    pub fn collect<R>(owner: NodeId, f: impl FnOnce() -> R) -> (R, Vec<SourceRef>) {
        let ctx = Self::enter(owner);
        let value = f();
        (value, ctx.finish())
    }

    /// Check if reads are currently being recorded.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.owner.is_some())
                .unwrap_or(false)
        })
    }

    /// Get the owner of the innermost tracking context, if any.
    pub fn current_owner() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }

    /// Record a read of the source `id`.
    ///
    /// `make` is only called when a tracking context is active and the
    /// source has not been recorded yet, so untracked reads never allocate.
    pub fn track_with(id: NodeId, make: impl FnOnce() -> SourceRef) {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(entry) = stack.last_mut() {
                if entry.owner.is_some() && entry.owner != Some(id) && !entry.sources.contains_key(&id) {
                    entry.sources.insert(id, make());
                }
            }
        });
    }

    /// Get the IDs of the sources collected so far in the current context.
    pub fn current_dependencies() -> Vec<NodeId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .map(|entry| entry.sources.keys().copied().collect())
                .unwrap_or_default()
        })
    }

    /// Leave the context and return every source read inside it.
    pub fn finish(mut self) -> Vec<SourceRef> {
        self.popped = true;
        let entry = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());
        match entry {
            Some(entry) => {
                debug_assert_eq!(
                    entry.owner, self.owner,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.owner, entry.owner
                );
                entry.sources.into_values().collect()
            }
            None => Vec::new(),
        }
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if self.popped {
            return;
        }
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.owner, self.owner,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.owner, entry.owner
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    #[test]
    fn context_tracks_owner() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_owner().is_none());

        {
            let _ctx = ReactiveContext::enter(id);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_owner(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_owner().is_none());
    }

    #[test]
    fn context_collects_sources_once() {
        let a = Signal::new(1);
        let b = Signal::new(2);

        let (sum, sources) = ReactiveContext::collect(NodeId::new(), || a.get() + b.get() + a.get());

        assert_eq!(sum, 4);
        let ids: Vec<_> = sources.iter().map(|s| s.node_id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        let outer_signal = Signal::new(0);
        let inner_signal = Signal::new(0);

        let ctx1 = ReactiveContext::enter(id1);
        outer_signal.get();

        {
            let ctx2 = ReactiveContext::enter(id2);
            assert_eq!(ReactiveContext::current_owner(), Some(id2));
            inner_signal.get();
            let inner: Vec<_> = ctx2.finish().iter().map(|s| s.node_id()).collect();
            assert_eq!(inner, vec![inner_signal.id()]);
        }

        // After inner context finishes, outer should be current
        assert_eq!(ReactiveContext::current_owner(), Some(id1));
        assert_eq!(ReactiveContext::current_dependencies(), vec![outer_signal.id()]);
        drop(ctx1);

        assert!(ReactiveContext::current_owner().is_none());
    }

    #[test]
    fn untracked_reads_are_not_recorded() {
        let signal = Signal::new(3);

        let (_, sources) = ReactiveContext::collect(NodeId::new(), || {
            ReactiveContext::untracked(|| signal.get())
        });

        assert!(sources.is_empty());
    }
}
