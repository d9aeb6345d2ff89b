//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds,
//! effects and deep-reactive objects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. Setting a new value notifies
//! every subscriber synchronously, in subscription order. Setting a value
//! strictly equal to the current one does nothing.
//!
//! ## Computeds
//!
//! A Computed is a derived value. It recomputes eagerly whenever one of its
//! dependencies notifies and passes the change on only if the result differs.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Effects synchronize reactive state with the outside
//! world, such as the DOM.
//!
//! ## Reactive objects
//!
//! A [`Reactive`] wraps an object or array so that mutating it, at any
//! depth, notifies like a signal.
//!
//! # Implementation Notes
//!
//! Dependencies are either listed explicitly or discovered through a
//! thread-local tracking context ([`ReactiveContext`]): when a source is read
//! while a computation runs, the computation subscribes to it.
//!
//! Propagation is synchronous and depth-first. No lock is held while user
//! callbacks run, so callbacks may freely read, write, subscribe and
//! unsubscribe.

mod computed;
mod context;
mod effect;
mod proxy;
mod signal;
mod source;
mod subscriber;

pub use computed::{Computed, Tracking};
pub use context::ReactiveContext;
pub use effect::{Cleanup, Effect, IntoCleanup};
pub use proxy::{Change, Reactive, MAX_ARRAY_LEN};
pub use signal::Signal;
pub use source::{Notify, Source, SourceRef};
pub use subscriber::{SubscriberId, Subscribers, Subscription};

/// Create a signal.
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    Signal::new(value)
}

/// Create a computed over explicit dependencies.
pub fn computed<T, F, I>(compute: F, dependencies: I) -> Computed<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
    I: IntoIterator<Item = SourceRef>,
{
    Computed::new(compute, dependencies)
}

/// Create an effect over explicit dependencies.
pub fn effect<F, C, I>(run: F, dependencies: I) -> Effect
where
    F: Fn() -> C + Send + Sync + 'static,
    C: IntoCleanup,
    I: IntoIterator<Item = SourceRef>,
{
    Effect::new(run, dependencies)
}
