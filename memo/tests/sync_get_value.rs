mod common;

use common::{build_virtual_cache, wait_until, Calls};
use fibre_memo::{CacheBuilder, ManualScheduler, Ttl};

use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_hit_after_first_load() {
  let (cache, _scheduler) = build_virtual_cache(Ttl::from_minutes(1));
  let calls = Calls::new();

  let first = cache.get_value("k".to_string(), calls.supplier("v")).unwrap();
  let second = cache.get_value("k".to_string(), calls.supplier("other")).unwrap();

  assert_eq!(*first, "v");
  assert!(Arc::ptr_eq(&first, &second), "a hit must return the cached Arc");
  assert_eq!(calls.count(), 1);

  let metrics = cache.metrics();
  assert_eq!(metrics.misses, 1);
  assert_eq!(metrics.hits, 1);
  assert_eq!(metrics.loads, 1);
  assert_eq!(cache.len(), 1);
  assert!(cache.contains_key(&"k".to_string()));
}

#[test]
fn test_single_flight_under_contention() {
  let scheduler = Arc::new(ManualScheduler::new());
  let cache = Arc::new(
    CacheBuilder::<u32, u32>::new()
      .default_timeout(Ttl::Unlimited)
      .manual_time(scheduler.clone())
      .build()
      .unwrap(),
  );
  let calls = Calls::new();

  let threads = 16;
  let lookups_per_thread = 10_000 / threads;
  let handles: Vec<_> = (0..threads)
    .map(|t| {
      let cache = cache.clone();
      let calls = calls.clone();
      thread::spawn(move || {
        for i in 0..lookups_per_thread {
          let key = ((t + i) % 10) as u32;
          let calls = calls.clone();
          let value = cache
            .get_value(key, move || {
              calls.record();
              thread::sleep(Duration::from_millis(2));
              Ok::<_, io::Error>(key * 100)
            })
            .unwrap();
          assert_eq!(*value, key * 100);
        }
      })
    })
    .collect();

  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(calls.count(), 10, "each key must be computed exactly once");
  assert_eq!(cache.len(), 10);
  assert_eq!(scheduler.schedule_count(), 0);

  let metrics = cache.metrics();
  assert_eq!(metrics.misses, 10);
  assert_eq!(metrics.hits + metrics.joins + metrics.misses, 10_000);
}

#[test]
fn test_supplier_failure_reaches_every_waiter() {
  let (cache, _scheduler) = build_virtual_cache(Ttl::from_minutes(1));
  let cache = Arc::new(cache);
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let calls = Calls::new();

  let leader = {
    let cache = cache.clone();
    let calls = calls.clone();
    thread::spawn(move || {
      cache.get_value("k".to_string(), move || {
        calls.record();
        release_rx.recv().unwrap();
        Err(io::Error::new(io::ErrorKind::Other, "backend down"))
      })
    })
  };
  wait_until("leader to start", || calls.count() == 1);

  let waiters: Vec<_> = (0..4)
    .map(|_| {
      let cache = cache.clone();
      let calls = calls.clone();
      thread::spawn(move || cache.get_value("k".to_string(), calls.supplier("unused")))
    })
    .collect();
  wait_until("waiters to join", || cache.metrics().joins == 4);

  release_tx.send(()).unwrap();

  let leader_err = leader.join().unwrap().unwrap_err();
  assert_eq!(leader_err.inner().to_string(), "backend down");
  for waiter in waiters {
    let err = waiter.join().unwrap().unwrap_err();
    assert_eq!(err.inner().to_string(), "backend down");
  }

  assert_eq!(calls.count(), 1, "waiters must not run their own suppliers");
  assert!(cache.is_empty(), "a failed load must not be cached");
  assert_eq!(cache.metrics().load_failures, 1);

  // The next lookup starts fresh.
  let value = cache.get_value("k".to_string(), calls.supplier("recovered")).unwrap();
  assert_eq!(*value, "recovered");
}

#[test]
fn test_panicking_supplier_lets_a_waiter_take_over() {
  let (cache, _scheduler) = build_virtual_cache(Ttl::Unlimited);
  let cache = Arc::new(cache);
  let (release_tx, release_rx) = mpsc::channel::<()>();
  let started = Calls::new();

  let leader = {
    let cache = cache.clone();
    let started = started.clone();
    thread::spawn(move || {
      cache.get_value("k".to_string(), move || -> Result<String, io::Error> {
        started.record();
        release_rx.recv().unwrap();
        panic!("supplier blew up");
      })
    })
  };
  wait_until("leader to start", || started.count() == 1);

  let waiter = {
    let cache = cache.clone();
    thread::spawn(move || cache.get_value("k".to_string(), || Ok::<_, io::Error>("second try".to_string())))
  };
  wait_until("waiter to join", || cache.metrics().joins == 1);

  release_tx.send(()).unwrap();
  assert!(leader.join().is_err(), "the leader thread should have panicked");

  let value = waiter.join().unwrap().unwrap();
  assert_eq!(*value, "second try");
  assert!(cache.contains_key(&"k".to_string()));

  let metrics = cache.metrics();
  assert_eq!(metrics.abandoned_loads, 1);
  assert_eq!(metrics.loads, 1);
}

#[test]
fn test_error_types_convert_into_load_error() {
  let (cache, _scheduler) = build_virtual_cache(Ttl::Unlimited);

  let err = cache
    .get_value("k".to_string(), || Err::<String, _>("plain message"))
    .unwrap_err();
  assert_eq!(err.to_string(), "value supplier failed: plain message");
  assert!(std::error::Error::source(&err).is_some());
}
