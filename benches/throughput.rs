//! Throughput Benchmarks
//!
//! Single producer and multi producer pipelines feeding one counting consumer,
//! measured per burst of published events for each wait strategy.

use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use ringbatch::disruptor::{
    BlockingWaitStrategy, BusySpinWaitStrategy, DefaultEventFactory, Disruptor, EventHandler,
    ProducerType, ThreadExecutor, WaitStrategy, YieldingWaitStrategy,
};

const BUFFER_SIZE: usize = 1024;
const BURST_SIZES: [u64; 3] = [10, 100, 1000];
const PRODUCERS: usize = 3;

#[derive(Debug, Default, Clone, Copy)]
struct BenchmarkEvent {
    value: i64,
}

/// Counts processed events so the producer can wait for a burst to drain
struct CountingSink {
    counter: Arc<AtomicI64>,
}

impl EventHandler<BenchmarkEvent> for CountingSink {
    fn on_event(&mut self, event: &BenchmarkEvent, _sequence: i64, _end_of_batch: bool) -> anyhow::Result<()> {
        black_box(event.value);
        self.counter.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

fn strategies() -> Vec<(&'static str, Arc<dyn WaitStrategy>)> {
    vec![
        ("BusySpin", Arc::new(BusySpinWaitStrategy::new())),
        ("Yielding", Arc::new(YieldingWaitStrategy::new())),
        ("Blocking", Arc::new(BlockingWaitStrategy::new())),
    ]
}

fn start_pipeline(
    producer_type: ProducerType,
    wait_strategy: Arc<dyn WaitStrategy>,
) -> (Disruptor<BenchmarkEvent>, Arc<AtomicI64>) {
    let counter = Arc::new(AtomicI64::new(0));
    let mut disruptor = Disruptor::new(
        DefaultEventFactory::new(),
        BUFFER_SIZE,
        Arc::new(ThreadExecutor::with_name_prefix("bench")),
        producer_type,
        wait_strategy,
    )
    .unwrap();
    disruptor
        .handle_events_with([CountingSink {
            counter: Arc::clone(&counter),
        }])
        .unwrap();
    disruptor.start().unwrap();
    (disruptor, counter)
}

fn wait_for_count(counter: &AtomicI64, target: i64) {
    while counter.load(Ordering::Acquire) < target {
        std::hint::spin_loop();
    }
}

/// Baseline: a bare atomic handoff on the same thread
fn baseline(group: &mut BenchmarkGroup<WallTime>, burst_size: u64) {
    let sink = AtomicI64::new(0);
    group.throughput(Throughput::Elements(burst_size));
    group.bench_function(BenchmarkId::new("baseline", burst_size), |b| {
        b.iter(|| {
            for i in 1..=burst_size {
                sink.store(black_box(i as i64), Ordering::Release);
            }
        })
    });
}

fn single_producer(
    group: &mut BenchmarkGroup<WallTime>,
    name: &str,
    wait_strategy: Arc<dyn WaitStrategy>,
    burst_size: u64,
) {
    let (disruptor, counter) = start_pipeline(ProducerType::Single, wait_strategy);

    group.throughput(Throughput::Elements(burst_size));
    group.bench_function(BenchmarkId::new(name, burst_size), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let target = counter.load(Ordering::Acquire) + burst_size as i64;
                for i in 0..burst_size {
                    disruptor
                        .publish_event(move |event: &mut BenchmarkEvent, _seq: i64| {
                            event.value = black_box(i as i64);
                        })
                        .unwrap();
                }
                wait_for_count(&counter, target);
            }
            start.elapsed()
        })
    });

    disruptor.shutdown().unwrap();
}

fn multi_producer(
    group: &mut BenchmarkGroup<WallTime>,
    name: &str,
    wait_strategy: Arc<dyn WaitStrategy>,
    burst_size: u64,
) {
    let (disruptor, counter) = start_pipeline(ProducerType::Multi, wait_strategy);
    let ring = disruptor.ring_buffer();
    let per_producer = burst_size / PRODUCERS as u64;
    let total = per_producer * PRODUCERS as u64;

    group.throughput(Throughput::Elements(total));
    group.bench_function(BenchmarkId::new(name, burst_size), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let target = counter.load(Ordering::Acquire) + total as i64;
                let barrier = Arc::new(Barrier::new(PRODUCERS));
                let handles: Vec<_> = (0..PRODUCERS)
                    .map(|_| {
                        let ring = Arc::clone(&ring);
                        let barrier = Arc::clone(&barrier);
                        thread::spawn(move || {
                            barrier.wait();
                            for i in 0..per_producer {
                                ring.publish_event(move |event: &mut BenchmarkEvent, _seq: i64| {
                                    event.value = black_box(i as i64);
                                })
                                .unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
                wait_for_count(&counter, target);
            }
            start.elapsed()
        })
    });

    disruptor.shutdown().unwrap();
}

fn spsc_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("SPSC");
    group.measurement_time(Duration::from_secs(5));

    for burst_size in BURST_SIZES {
        baseline(&mut group, burst_size);
        for (name, wait_strategy) in strategies() {
            single_producer(&mut group, name, wait_strategy, burst_size);
        }
    }
    group.finish();
}

fn mpsc_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("MPSC");
    group.measurement_time(Duration::from_secs(5));

    for burst_size in BURST_SIZES {
        for (name, wait_strategy) in strategies() {
            multi_producer(&mut group, name, wait_strategy, burst_size);
        }
    }
    group.finish();
}

criterion_group!(benches, spsc_benchmarks, mpsc_benchmarks);
criterion_main!(benches);
