//! Benchmark: expression evaluation and signal fan-out

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use weave_core::expr::Expression;
use weave_core::reactive::{Effect, Signal};
use weave_core::{evaluate, Scope, Value};

const PIPELINE: &str = "items.filter(x => x % 2 === 0).map(x => x * 3).reduce((a, b) => a + b, 0)";

fn state(len: usize) -> Scope {
    let items: Vec<usize> = (0..len).collect();
    Scope::from_state(&json!({ "items": items, "name": "weave" })).unwrap()
}

fn benchmark_parse_and_evaluate(c: &mut Criterion) {
    let scope = state(100);

    // Goes through the parse cache after the first iteration.
    c.bench_function("evaluate_cached_source", |b| {
        b.iter(|| evaluate(black_box(PIPELINE), &scope))
    });

    let parsed = Expression::parse(PIPELINE).unwrap();
    c.bench_function("evaluate_parsed", |b| b.iter(|| parsed.eval(black_box(&scope))));

    c.bench_function("string_methods", |b| {
        b.iter(|| evaluate(black_box("name.toUpperCase().padStart(12, '*').slice(2)"), &scope))
    });
}

fn benchmark_signal_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_fan_out");
    for subscribers in [1usize, 16, 256] {
        let signal = Signal::new(Value::from(0));
        let effects: Vec<Effect> = (0..subscribers)
            .map(|_| {
                let signal = signal.clone();
                Effect::tracked(move || {
                    black_box(signal.get());
                })
            })
            .collect();

        let mut next = 0;
        group.bench_with_input(BenchmarkId::from_parameter(subscribers), &subscribers, |b, _| {
            b.iter(|| {
                next += 1;
                signal.set(Value::from(next));
            })
        });

        for effect in effects {
            effect.dispose();
        }
    }
    group.finish();
}

criterion_group!(benches, benchmark_parse_and_evaluate, benchmark_signal_fan_out);
criterion_main!(benches);
