//! Deduplicating work queue with in-flight tracking and per-key backoff.
//!
//! - A key added while already pending collapses into the pending entry.
//! - A key being processed is never handed out twice; re-adds while in flight
//!   are parked and re-queued when the worker calls [`WorkQueue::done`].
//! - [`WorkQueue::add_rate_limited`] re-adds after an exponential delay that
//!   resets on [`WorkQueue::forget`].

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use metrics::{counter, gauge};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Notify;
use tracing::debug;

pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(5);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(1000);

struct State<T> {
    queue: VecDeque<T>,
    dirty: FxHashSet<T>,
    processing: FxHashSet<T>,
    failures: FxHashMap<T, u32>,
    shutting_down: bool,
}

pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    pub fn new() -> Self { Self::with_backoff(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY) }

    pub fn with_backoff(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: FxHashSet::default(),
                processing: FxHashSet::default(),
                failures: FxHashMap::default(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            base_delay,
            max_delay,
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        // No invariants span a panic inside the lock; keep going on poison.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of keys waiting to be handed out.
    pub fn len(&self) -> usize { self.state().queue.len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn add(&self, item: T) {
        let mut st = self.state();
        if st.shutting_down || st.dirty.contains(&item) {
            return;
        }
        st.dirty.insert(item.clone());
        if st.processing.contains(&item) {
            return;
        }
        st.queue.push_back(item);
        gauge!("rollgate_queue_depth", st.queue.len() as f64);
        drop(st);
        self.notify.notify_one();
    }

    /// Next key to process; `None` once the queue is shut down.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.state();
                if st.shutting_down {
                    return None;
                }
                if let Some(item) = st.queue.pop_front() {
                    st.dirty.remove(&item);
                    st.processing.insert(item.clone());
                    let more = !st.queue.is_empty();
                    gauge!("rollgate_queue_depth", st.queue.len() as f64);
                    drop(st);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Mark a key as finished; re-queue it if it was re-added meanwhile.
    pub fn done(&self, item: &T) {
        let mut st = self.state();
        st.processing.remove(item);
        if st.dirty.contains(item) && !st.shutting_down {
            st.queue.push_back(item.clone());
            drop(st);
            self.notify.notify_one();
        }
    }

    /// Re-add after the key's current backoff delay.
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = {
            let mut st = self.state();
            if st.shutting_down {
                return;
            }
            let n = st.failures.entry(item.clone()).or_insert(0);
            *n = n.saturating_add(1);
            self.backoff(*n)
        };
        counter!("rollgate_queue_retries_total", 1u64);
        debug!(item = ?item, delay_ms = %delay.as_millis(), "requeue with backoff");
        let q = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            q.add(item);
        });
    }

    /// Reset the backoff for a key.
    pub fn forget(&self, item: &T) { self.state().failures.remove(item); }

    pub fn num_requeues(&self, item: &T) -> u32 { self.state().failures.get(item).copied().unwrap_or(0) }

    /// Stop handing out keys; waiting `get` calls return `None`.
    pub fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool { self.state().shutting_down }

    fn backoff(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exp).min(self.max_delay)
    }
}

impl<T> Default for WorkQueue<T>
where
    T: Clone + Eq + Hash + Send + std::fmt::Debug + 'static,
{
    fn default() -> Self { Self::new() }
}
