//! Coalesce bursts of triggers into a single deferred action

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct Pending {
    /// Bumped by every `schedule` and `cancel`. A timer only fires if its generation is still the current one.
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

/// Runs an action once a quiet interval has elapsed since the last call to [`Debouncer::schedule`]
///
/// Every call to `schedule` cancels the pending action (if any) and restarts the timer: a burst of calls only runs the last action, once.
/// An action that has already started is not cancelled by later calls.
///
/// This must be used from within a tokio runtime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Arc<Mutex<Pending>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `action` after the default delay, unless another action is scheduled in the meantime
    pub fn schedule<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.schedule_after(self.delay, action)
    }

    /// Run `action` after `delay`, unless another action is scheduled in the meantime
    pub fn schedule_after<F, Fut>(&self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        // The lock is held until the new handle is stored, so that overlapping calls always leave exactly one timer behind
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
        pending.generation = pending.generation.wrapping_add(1);
        let generation = pending.generation;

        let shared = Arc::clone(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = lock(&shared);
                if pending.generation != generation {
                    return;
                }
                pending.handle = None;
            }
            action().await;
        });
        pending.handle = Some(handle);
    }

    /// Drop the pending action, if any
    pub fn cancel(&self) {
        let mut pending = lock(&self.pending);
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }
        pending.generation = pending.generation.wrapping_add(1);
    }

    /// Whether an action is waiting for its timer
    pub fn is_pending(&self) -> bool {
        lock(&self.pending).handle.is_some()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
