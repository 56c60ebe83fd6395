//! Cancellable expiry timers

use pguard_util::Domain;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::debug;

/// Identifies one scheduled countdown. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

type Registry = Mutex<HashMap<TimerHandle, AbortHandle>>;

/// Runs each countdown on its own tokio task.
///
/// A timer is armed while it sits in the registry. Firing starts by taking
/// the timer out of the registry; cancelling also takes it out. Whichever
/// happens first wins, so a cancel that lands before fire begins guarantees
/// the callback never runs, and a cancel after that point is a no-op.
pub struct TimerScheduler {
    next_handle: AtomicU64,
    armed: Arc<Registry>,
}

impl TimerScheduler {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start a countdown that calls `on_fire(handle, members)` once `duration`
    /// has elapsed, unless cancelled first. Must be called within a tokio
    /// runtime.
    pub fn schedule<F, Fut>(
        &self,
        duration: Duration,
        members: BTreeSet<Domain>,
        on_fire: F,
    ) -> TimerHandle
    where
        F: FnOnce(TimerHandle, BTreeSet<Domain>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + duration;
        let armed = Arc::clone(&self.armed);

        // Registered before the task can observe the registry
        let mut registry = lock(&self.armed);
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;

            if lock(&armed).remove(&handle).is_none() {
                return;
            }

            debug!(timer = %handle, "Timer fired");
            on_fire(handle, members).await;
        });
        registry.insert(handle, task.abort_handle());

        debug!(timer = %handle, duration_secs = duration.as_secs(), "Timer scheduled");
        handle
    }

    /// Disarm a timer. Returns whether it was still armed.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        match lock(&self.armed).remove(&handle) {
            Some(task) => {
                task.abort();
                debug!(timer = %handle, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Disarm every timer. Returns how many were armed.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.armed).drain().collect();
        for (_, task) in &drained {
            task.abort();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "All timers cancelled");
        }
        drained.len()
    }

    /// Number of armed timers
    pub fn pending(&self) -> usize {
        lock(&self.armed).len()
    }

    pub fn is_armed(&self, handle: TimerHandle) -> bool {
        lock(&self.armed).contains_key(&handle)
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<TimerHandle, AbortHandle>> {
    // The map stays consistent even if a holder panicked
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn members() -> BTreeSet<Domain> {
        BTreeSet::from([Domain::new("a.com"), Domain::new("www.a.com")])
    }

    fn counting(
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce(TimerHandle, BTreeSet<Domain>) -> std::future::Ready<()> + Send + 'static {
        let counter = Arc::clone(counter);
        move |_, members| {
            assert_eq!(members.len(), 2);
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_duration() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule(Duration::from_secs(60), members(), counting(&fired));
        assert!(scheduler.is_armed(handle));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending(), 0);

        // Cancelling after fire is a no-op
        assert!(!scheduler.cancel(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_before_fire_suppresses_callback() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let handle = scheduler.schedule(Duration::from_secs(60), members(), counting(&fired));
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn handles_are_unique_and_increasing() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = scheduler.schedule(Duration::from_secs(5), members(), counting(&fired));
        let second = scheduler.schedule(Duration::from_secs(5), members(), counting(&fired));

        assert!(second > first);
        assert_eq!(scheduler.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_disarms_everything() {
        let scheduler = TimerScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.schedule(Duration::from_secs(5), members(), counting(&fired));
        scheduler.schedule(Duration::from_secs(10), members(), counting(&fired));

        assert_eq!(scheduler.cancel_all(), 2);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
