use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fibre_memo::{Cache, CacheBuilder, ManualScheduler, Ttl};
use std::convert::Infallible;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

const NUM_KEYS: u64 = 10_000;

fn build_cache(default_timeout: Ttl) -> Arc<Cache<u64, u64>> {
  // Virtual time keeps timers from firing mid-measurement.
  let scheduler = Arc::new(ManualScheduler::new());
  Arc::new(
    CacheBuilder::new()
      .default_timeout(default_timeout)
      .manual_time(scheduler)
      .build()
      .unwrap(),
  )
}

fn populated(default_timeout: Ttl) -> Arc<Cache<u64, u64>> {
  let cache = build_cache(default_timeout);
  for key in 0..NUM_KEYS {
    cache.get_value(key, || Ok::<_, Infallible>(key)).unwrap();
  }
  cache
}

fn bench_hits(c: &mut Criterion) {
  let mut group = c.benchmark_group("GetValueHit");

  for concurrency in [1usize, 4, 8] {
    let cache = populated(Ttl::Unlimited);
    group.throughput(Throughput::Elements(NUM_KEYS));
    group.bench_with_input(
      BenchmarkId::from_parameter(concurrency),
      &concurrency,
      |b, &concurrency| {
        b.iter_custom(|iters| {
          let barrier = Arc::new(Barrier::new(concurrency + 1));
          let handles: Vec<_> = (0..concurrency)
            .map(|t| {
              let cache = cache.clone();
              let barrier = barrier.clone();
              thread::spawn(move || {
                barrier.wait();
                for _ in 0..iters {
                  for key in (t as u64..NUM_KEYS).step_by(concurrency) {
                    let value = cache.get_value(key, || Ok::<_, Infallible>(0)).unwrap();
                    black_box(value);
                  }
                }
              })
            })
            .collect();

          barrier.wait();
          let start = Instant::now();
          for handle in handles {
            handle.join().unwrap();
          }
          start.elapsed()
        })
      },
    );
  }
  group.finish();
}

fn bench_miss_and_load(c: &mut Criterion) {
  let mut group = c.benchmark_group("GetValueMiss");
  group.throughput(Throughput::Elements(NUM_KEYS));

  for (name, ttl) in [
    ("zero", Ttl::Zero),
    ("finite", Ttl::from_secs(60)),
    ("unlimited", Ttl::Unlimited),
  ] {
    group.bench_function(name, |b| {
      b.iter_custom(|iters| {
        let mut total = Duration::ZERO;
        for _ in 0..iters {
          let cache = build_cache(ttl);
          let start = Instant::now();
          for key in 0..NUM_KEYS {
            black_box(cache.get_value(key, || Ok::<_, Infallible>(key)).unwrap());
          }
          total += start.elapsed();
        }
        total
      })
    });
  }
  group.finish();
}

criterion_group!(benches, bench_hits, bench_miss_and_load);
criterion_main!(benches);
