//! Cancellable one-shot timers.
//!
//! The autosave debouncer never touches ambient scheduling directly; it asks a
//! [`Scheduler`] for a timer and keeps the returned [`TimerHandle`].
//! [`TokioScheduler`] sleeps on tokio's clock, which tests pause and advance.

use std::{future::Future, pin::Pin, time::Duration};

use tokio::task::JoinHandle;

/// A boxed unit of work run when a timer fires.
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Scheduler: Send + Sync {
  /// Run `task` once `delay` has elapsed, unless the handle is cancelled
  /// first.
  fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;
}

/// Owner of a pending timer. Dropping the handle does not cancel the timer.
pub struct TimerHandle {
  cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TimerHandle {
  pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
    Self { cancel: Some(Box::new(cancel)) }
  }

  /// Cancel the timer. Takes effect immediately for a timer that has not
  /// fired yet.
  pub fn cancel(mut self) {
    if let Some(cancel) = self.cancel.take() {
      cancel();
    }
  }
}

impl std::fmt::Debug for TimerHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TimerHandle")
      .field("armed", &self.cancel.is_some())
      .finish()
  }
}

/// Spawns a tokio task per timer. Must be used from within a tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
  fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
    let handle: JoinHandle<()> = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      task.await;
    });
    TimerHandle::new(move || handle.abort())
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use super::*;

  fn counting_task(counter: &Arc<AtomicUsize>) -> Task {
    let counter = counter.clone();
    Box::pin(async move {
      counter.fetch_add(1, Ordering::SeqCst);
    })
  }

  #[tokio::test(start_paused = true)]
  async fn fires_after_delay() {
    let fired = Arc::new(AtomicUsize::new(0));
    let _handle =
      TokioScheduler.schedule(Duration::from_secs(2), counting_task(&fired));

    tokio::time::sleep(Duration::from_millis(1_999)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn cancelled_timer_never_fires() {
    let fired = Arc::new(AtomicUsize::new(0));
    let handle =
      TokioScheduler.schedule(Duration::from_secs(2), counting_task(&fired));

    tokio::time::sleep(Duration::from_secs(1)).await;
    handle.cancel();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);
  }
}
