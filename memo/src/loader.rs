use crate::error::LoadError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, Thread};

/// Represents a waiter in the queue for a `LoadFuture`.
pub(crate) enum Waiter {
  Sync(Thread),
  Async(Waker),
}

impl Waiter {
  fn wake(self) {
    match self {
      Waiter::Sync(thread) => thread.unpark(),
      Waiter::Async(waker) => waker.wake(),
    }
  }
}

/// How an in-flight computation ended.
#[derive(Debug)]
pub(crate) enum Outcome<V> {
  Loaded(Arc<V>),
  Failed(LoadError),
  /// The leader went away (panic or a dropped future) without producing a
  /// result. Waiters retry the lookup instead of failing.
  Abandoned,
}

impl<V> Clone for Outcome<V> {
  fn clone(&self) -> Self {
    match self {
      Outcome::Loaded(value) => Outcome::Loaded(value.clone()),
      Outcome::Failed(error) => Outcome::Failed(error.clone()),
      Outcome::Abandoned => Outcome::Abandoned,
    }
  }
}

/// The internal state of a value being loaded.
enum State<V> {
  Computing,
  Complete(Outcome<V>),
}

/// The internal, mutex-protected core of the LoadFuture.
struct Inner<V> {
  state: State<V>,
  waiters: VecDeque<Waiter>,
}

/// The join point of a single-flight computation. The leader completes it
/// once; any number of sync threads and async tasks can wait on it.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  /// Creates a new `LoadFuture` in the "Computing" state.
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: State::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the future, waking all waiters. Only the first completion
  /// counts.
  pub(crate) fn complete(&self, outcome: Outcome<V>) {
    let mut inner = self.inner.lock();
    if matches!(inner.state, State::Complete(_)) {
      return;
    }
    inner.state = State::Complete(outcome);
    for waiter in inner.waiters.drain(..) {
      waiter.wake();
    }
  }

  /// Blocks the current thread until the future is completed.
  pub(crate) fn wait(&self) -> Outcome<V> {
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        State::Complete(outcome) => return outcome.clone(),
        State::Computing => {
          inner.waiters.push_back(Waiter::Sync(thread::current()));
          drop(inner); // Unlock before parking.
          thread::park();
          inner = self.inner.lock();
        }
      }
    }
  }
}

impl<V> Future for &LoadFuture<V> {
  type Output = Outcome<V>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let mut inner = self.inner.lock();
    match &inner.state {
      State::Complete(outcome) => Poll::Ready(outcome.clone()),
      State::Computing => {
        if !inner.waiters.iter().any(|w| matches!(w, Waiter::Async(waker) if waker.will_wake(cx.waker()))) {
          inner.waiters.push_back(Waiter::Async(cx.waker().clone()));
        }
        Poll::Pending
      }
    }
  }
}
