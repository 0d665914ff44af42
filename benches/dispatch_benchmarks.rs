//! Benchmarks for the binding layer's hot paths.
//!
//! - Dispatch: a method call through the class metatable and the thunk
//! - Construction: calling the class table, including the wrap
//! - Rewrap: wrapping an object that already has a live handle
//! - Collection: finalizing a batch of unreachable managed objects
//!
//! ## Profiling with Puffin
//!
//! ```bash
//! cargo bench --features profile-with-puffin -- dispatch
//! ```

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

use tether::prelude::*;
use tether::{commit, wrap};

#[cfg(feature = "profile-with-puffin")]
fn setup_profiler() {
    puffin::set_scopes_on(true);
}

#[cfg(not(feature = "profile-with-puffin"))]
fn setup_profiler() {}

#[cfg(feature = "profile-with-puffin")]
fn end_profiling_frame() {
    puffin::GlobalProfiler::lock().new_frame();
}

#[cfg(not(feature = "profile-with-puffin"))]
fn end_profiling_frame() {}

struct Counter {
    count: i64,
}

impl Counter {
    fn add(&mut self, ctx: &mut CallContext<'_>) -> Result<usize, RuntimeError> {
        self.count += ctx.check_int(1)?;
        ctx.push(self.count)?;
        Ok(1)
    }
}

impl NativeClass for Counter {
    const NAME: &'static str = "Counter";
    const METHODS: &'static [Method<Self>] = &[tether::method!(Counter, add)];

    fn construct(_ctx: &mut CallContext<'_>) -> Result<Self, RuntimeError> {
        Ok(Counter { count: 0 })
    }
}

fn counter_state() -> State {
    let mut state = State::new();
    commit::<Counter>(&mut state).unwrap();
    state
}

fn dispatch_benchmarks(c: &mut Criterion) {
    setup_profiler();

    let mut state = counter_state();
    let class = state.global("Counter");
    let counter = state.call(&class, &[]).unwrap().remove(0);
    state.set_global("counter", counter.clone()).unwrap();

    let mut group = c.benchmark_group("bridge/dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("method_call", |b| {
        b.iter(|| {
            let results = state
                .call_method(black_box(&counter), "add", &[Value::Int(1)])
                .unwrap();
            black_box(results)
        });
        end_profiling_frame();
    });

    group.bench_function("construct", |b| {
        b.iter(|| black_box(state.call(&class, &[]).unwrap()));
        state.collect_garbage();
    });

    let native = NativePtr::new(Counter { count: 0 });
    let handle = wrap(&mut state, Some(native.clone()), Ownership::Unmanaged).unwrap();
    state.set_global("native", handle).unwrap();
    group.bench_function("rewrap_existing", |b| {
        b.iter(|| black_box(wrap(&mut state, Some(native.clone()), Ownership::Unmanaged).unwrap()));
    });

    group.finish();
}

fn collection_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("bridge/collection");

    for count in [100usize, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("finalize_{}", count), |b| {
            b.iter_batched(
                || {
                    let mut state = counter_state();
                    let class = state.global("Counter");
                    for _ in 0..count {
                        state.call(&class, &[]).unwrap();
                    }
                    state
                },
                |mut state| {
                    let stats = state.collect_garbage();
                    end_profiling_frame();
                    black_box((stats, state))
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, dispatch_benchmarks, collection_benchmarks);
criterion_main!(benches);
