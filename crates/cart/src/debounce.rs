//! Per-key debounce scheduler built on tokio timers.
//!
//! Collapses rapid repeated triggers for the same key into a single
//! invocation after a quiet period. Used by the cart store to coalesce
//! quantity edits into one absolute-set API call per product.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// Per-key delayed-invocation scheduler.
///
/// Each key owns at most one pending timer; scheduling again for the same
/// key cancels and replaces the prior timer. Keys are independent: a
/// pending timer for one key never delays another.
///
/// This is purely a scheduling convenience, not a lock - once a timer
/// fires, the invocation runs to completion even if the key is scheduled
/// again meanwhile.
#[derive(Clone)]
pub struct Debouncer {
    inner: Arc<DebouncerInner>,
}

struct DebouncerInner {
    delay: Duration,
    timers: Mutex<HashMap<String, TimerEntry>>,
    next_id: AtomicU64,
}

struct TimerEntry {
    id: u64,
    handle: JoinHandle<()>,
}

impl Debouncer {
    /// Create a scheduler with the given quiet period.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: Arc::new(DebouncerInner {
                delay,
                timers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// The configured quiet period.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Schedule `fut` to run after the quiet period, cancelling any timer
    /// already pending for `key`.
    pub fn debounce<F>(&self, key: impl Into<String>, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.delay).await;

            // Remove our own entry before invoking. If the entry id no
            // longer matches, a newer schedule superseded this timer while
            // it was waking up and the invocation must not run.
            {
                let mut timers = inner.timers.lock().unwrap_or_else(|e| e.into_inner());
                match timers.get(&task_key) {
                    Some(entry) if entry.id == id => {
                        timers.remove(&task_key);
                    }
                    _ => return,
                }
            }

            fut.await;
        });

        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(prev) = timers.insert(key.clone(), TimerEntry { id, handle }) {
            debug!(key = %key, "superseding pending debounce timer");
            prev.handle.abort();
        }
    }

    /// Cancel a pending timer for `key` without invoking it.
    ///
    /// No-op when nothing is scheduled; always safe to call redundantly.
    pub fn cancel(&self, key: &str) {
        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = timers.remove(key) {
            debug!(key = %key, "cancelled pending debounce timer");
            entry.handle.abort();
        }
    }

    /// Cancel every pending timer. Used on teardown.
    pub fn cancel_all(&self) {
        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for (_, entry) in timers.drain() {
            entry.handle.abort();
        }
    }

    /// Whether a timer is currently scheduled for `key`.
    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }
}

impl Drop for DebouncerInner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(|e| e.into_inner());
        for entry in timers.values() {
            entry.handle.abort();
        }
    }
}
