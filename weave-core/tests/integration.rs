//! Integration Tests for Reactive System
//!
//! These tests verify that signals, computeds, effects and reactive objects
//! work together correctly.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use serial_test::serial;
use weave_core::graph;
use weave_core::reactive::{Computed, Effect, Reactive, ReactiveContext, Signal};
use weave_core::Value;

/// `c = signal(0); d = computed(c * 2, [c]); c.set(5)` gives `d == 10`.
#[test]
fn computed_over_explicit_dependency() {
    let c = Signal::new(0);
    let source = c.clone();
    let d = Computed::new(move || source.get() * 2, [c.source()]);

    c.set(5);
    assert_eq!(d.get(), 10);
}

/// Test that read-after-write holds and equal writes notify nobody.
#[test]
fn signal_read_after_write_and_equal_writes() {
    let signal = Signal::new(1);
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let subscription = signal.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    assert!(signal.set(2));
    assert_eq!(signal.get(), 2);
    assert!(!signal.set(2));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Unsubscribing twice is harmless.
    subscription.unsubscribe();
    subscription.unsubscribe();
    signal.set(3);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Test that computeds chain and settle before `set` returns.
#[test]
fn computed_depends_on_computed() {
    let base = Signal::new(10);

    let b = base.clone();
    let doubled = Computed::tracked(move || b.get() * 2);
    let d = doubled.clone();
    let quadrupled = Computed::tracked(move || d.get() * 2);

    assert_eq!(quadrupled.get(), 40);
    base.set(1);
    assert_eq!(doubled.get(), 2);
    assert_eq!(quadrupled.get(), 4);
}

/// Test that an effect re-runs on change and stops after dispose.
#[test]
fn disposed_effect_does_not_run() {
    let signal = Signal::new(0);
    let observed = Arc::new(AtomicI32::new(-1));

    let s = signal.clone();
    let o = observed.clone();
    let effect = Effect::tracked(move || {
        o.store(s.get(), Ordering::SeqCst);
    });
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    signal.set(42);
    assert_eq!(observed.load(Ordering::SeqCst), 42);

    effect.dispose();
    signal.set(7);
    assert_eq!(observed.load(Ordering::SeqCst), 42);
    assert_eq!(signal.subscriber_count(), 0);
}

/// Test that an effect writing to its own source is not re-entered.
#[test]
fn effect_is_not_reentered_by_its_own_write() {
    let counter = Signal::new(0);
    let depth = Arc::new(AtomicUsize::new(0));
    let max_depth = Arc::new(AtomicUsize::new(0));

    let c = counter.clone();
    let (d, m) = (depth.clone(), max_depth.clone());
    let effect = Effect::tracked(move || {
        let now = d.fetch_add(1, Ordering::SeqCst) + 1;
        m.fetch_max(now, Ordering::SeqCst);
        let value = c.get();
        if value < 3 {
            c.set(value + 1);
        }
        d.fetch_sub(1, Ordering::SeqCst);
    });

    assert_eq!(counter.get(), 3);
    assert_eq!(max_depth.load(Ordering::SeqCst), 1);
    effect.dispose();
}

/// Test that untracked reads do not subscribe.
#[test]
fn untracked_reads_do_not_subscribe() {
    let tracked = Signal::new(1);
    let ignored = Signal::new(100);

    let (t, i) = (tracked.clone(), ignored.clone());
    let sum = Computed::tracked(move || t.get() + ReactiveContext::untracked(|| i.get()));

    ignored.set(200);
    assert_eq!(sum.get(), 101);
    tracked.set(2);
    assert_eq!(sum.get(), 202);
}

/// Test that nested reactive writes bubble to effects reading the root.
#[test]
fn reactive_objects_notify_readers_of_any_depth() {
    let state = Reactive::from_json(&serde_json::json!({"user": {"name": "Ann"}, "todos": []})).unwrap();
    let renders = Arc::new(AtomicUsize::new(0));

    let s = state.clone();
    let r = renders.clone();
    let effect = Effect::tracked(move || {
        let _ = s.get("user").as_reactive().map(|user| user.get("name"));
        r.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(renders.load(Ordering::SeqCst), 1);

    let user = state.get("user");
    user.as_reactive().unwrap().set("name", Value::from("Bob"));
    assert!(renders.load(Ordering::SeqCst) >= 2);

    let todos = state.get("todos");
    todos.as_reactive().unwrap().push(Value::from("write tests"));
    assert_eq!(state.to_json()["todos"][0], "write tests");
    effect.dispose();
}

/// Test that the debug graph records computed edges.
#[test]
#[serial]
fn graph_records_dependencies() {
    graph::clear();
    graph::enable();

    let a = Signal::new(1);
    let b = Signal::new(2);
    let (x, y) = (a.clone(), b.clone());
    let sum = Computed::tracked(move || x.get() + y.get());

    let dependencies = graph::with(|g| g.dependencies_of(sum.id()));
    assert_eq!(dependencies.len(), 2);
    assert!(dependencies.contains(&a.id()));
    let order = graph::with(|g| g.topological_order());
    let position = |id| order.iter().position(|n| *n == id);
    assert!(position(a.id()) < position(sum.id()));

    graph::disable();
    graph::clear();
}

/// Test that sweeping drops nodes whose owners are gone.
#[test]
#[serial]
fn graph_sweep_prunes_dropped_nodes() {
    graph::clear();
    graph::enable();

    let kept = Signal::new(0);
    {
        let _dropped = Signal::new(1);
    }
    assert!(graph::sweep() >= 1);
    assert!(graph::with(|g| g.get_node(kept.id()).is_some()));

    graph::disable();
    graph::clear();
}
