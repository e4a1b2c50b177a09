use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tickline::{AutomationParam, EventTimeline, IntervalTimeline, RateCurve, TickSource};

/// Benchmark sorted insertion into the event timeline (the hot path of
/// every scheduling call)
fn bench_event_timeline_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_timeline_insert");
    let mut rng = StdRng::seed_from_u64(17);

    for &size in &[100usize, 1_000, 10_000] {
        let times: Vec<f64> = (0..size).map(|_| rng.gen_range(0.0..1_000.0)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &times, |b, times| {
            b.iter(|| {
                let mut timeline = EventTimeline::new();
                for &t in times {
                    timeline.add(t, ()).unwrap();
                }
                black_box(timeline.len())
            });
        });
    }
    group.finish();
}

/// Benchmark the binary-search point queries against a populated timeline
fn bench_event_timeline_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_timeline_query");
    let mut rng = StdRng::seed_from_u64(29);

    for &size in &[1_000usize, 10_000] {
        let mut timeline = EventTimeline::new();
        for _ in 0..size {
            timeline.add(rng.gen_range(0.0..1_000.0), ()).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &timeline, |b, timeline| {
            let mut probe = 0.0;
            b.iter(|| {
                probe = (probe + 37.7) % 1_000.0;
                black_box(timeline.get(probe))
            });
        });
    }
    group.finish();
}

/// Benchmark interval stabbing queries on the repeat-window tree
fn bench_interval_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval_search");
    let mut rng = StdRng::seed_from_u64(43);

    for &size in &[1_000usize, 10_000] {
        let mut tree = IntervalTimeline::new();
        for _ in 0..size {
            let low = rng.gen_range(0.0..10_000.0);
            let len = rng.gen_range(1.0..500.0);
            tree.insert(low, low + len, ()).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(size), &tree, |b, tree| {
            let mut probe = 0.0;
            b.iter(|| {
                probe = (probe + 113.3) % 10_000.0;
                black_box(tree.search(probe).len())
            });
        });
    }
    group.finish();
}

/// Benchmark tick integrals over a rate curve with scheduled ramps
fn bench_rate_curve_integral(c: &mut Criterion) {
    let mut curve = RateCurve::new(384.0);
    for i in 0..50 {
        let t = i as f64 * 2.0;
        curve.set_value_at_time(200.0 + (i % 7) as f64 * 40.0, t).unwrap();
        curve
            .linear_ramp_to_value_at_time(300.0 + (i % 5) as f64 * 30.0, t + 1.0)
            .unwrap();
    }

    c.bench_function("rate_curve_ticks_at_time", |b| {
        let mut t = 0.0;
        b.iter(|| {
            t = (t + 0.37) % 100.0;
            black_box(curve.get_ticks_at_time(t))
        });
    });
}

/// Benchmark a full macro-tick scan over a busy source
fn bench_tick_enumeration(c: &mut Criterion) {
    let mut source = TickSource::new(384.0).unwrap();
    source.start(0.0, None).unwrap();

    c.bench_function("tick_enumeration_50ms_window", |b| {
        let mut window = 0.0;
        b.iter(|| {
            window = (window + 0.05) % 60.0;
            let mut count = 0u64;
            source
                .for_each_tick_between(window, window + 0.05, &mut |_, _| {
                    count += 1;
                    Ok(())
                })
                .unwrap();
            black_box(count)
        });
    });
}

criterion_group!(
    benches,
    bench_event_timeline_insert,
    bench_event_timeline_query,
    bench_interval_search,
    bench_rate_curve_integral,
    bench_tick_enumeration
);
criterion_main!(benches);
