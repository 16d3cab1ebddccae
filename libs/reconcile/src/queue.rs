//! Work queue with per-key deduplication and serialization.
//!
//! Guarantees:
//! - a key added several times before a worker picks it up is delivered once
//! - a key is never handed to two workers at the same time; adds that arrive
//!   while it is being processed are delivered after [`WorkQueue::done`]
//! - rate-limited adds wait for the key's exponential backoff

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::backoff::{BackoffPolicy, RetryTracker};

/// How long a key's failure count survives without new failures.
const FAILURE_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: RetryTracker<K>,
    shutting_down: bool,
}

/// A deduplicating, per-key serialized work queue.
#[derive(Debug)]
pub struct WorkQueue<K> {
    state: Mutex<State<K>>,
    notify: Notify,
    backoff: BackoffPolicy,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Ord + std::fmt::Debug + Send + 'static,
{
    /// Create a new queue using `backoff` for rate-limited adds.
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                failures: RetryTracker::new(FAILURE_WINDOW),
                shutting_down: false,
            }),
            notify: Notify::new(),
            backoff,
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule `key` for processing.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // Delivered again once the current holder calls done().
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Schedule `key` after `delay`.
    pub fn add_after(self: &Arc<Self>, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Schedule `key` after its backoff delay and count the failure.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) -> Duration {
        let attempt = self.lock().failures.record_failure(&key);
        let delay = self.backoff.delay(attempt.saturating_sub(1));
        debug!(?key, attempt, delay_ms = delay.as_millis() as u64, "requeueing with backoff");
        self.add_after(key, delay);
        delay
    }

    /// Reset the failure count of `key`.
    pub fn forget(&self, key: &K) {
        self.lock().failures.clear(key);
    }

    /// Number of failures currently counted for `key`.
    pub fn failures(&self, key: &K) -> u32 {
        self.lock().failures.failures(key)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    pub async fn next(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so idle workers drain the backlog.
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark `key` as no longer being processed.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop handing out keys and wake every waiting worker.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting to be picked up.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Arc<WorkQueue<String>> {
        Arc::new(WorkQueue::new(BackoffPolicy {
            base: Duration::from_millis(10),
            max: Duration::from_millis(100),
            jitter: 0.0,
        }))
    }

    #[tokio::test]
    async fn test_duplicate_adds_are_delivered_once() {
        let q = queue();
        q.add("p1".to_string());
        q.add("p1".to_string());
        q.add("p2".to_string());

        assert_eq!(q.len(), 2);
        assert_eq!(q.next().await.as_deref(), Some("p1"));
        assert_eq!(q.next().await.as_deref(), Some("p2"));
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_key_in_flight_is_not_handed_out_twice() {
        let q = queue();
        q.add("p1".to_string());
        let key = q.next().await.unwrap();

        q.add("p1".to_string());
        assert!(q.is_empty(), "in-flight key must wait for done()");

        q.done(&key);
        assert_eq!(q.len(), 1);
        assert_eq!(q.next().await.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_done_without_readd_drops_key() {
        let q = queue();
        q.add("p1".to_string());
        let key = q.next().await.unwrap();
        q.done(&key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn test_next_waits_for_add() {
        let q = queue();
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.add("p1".to_string());

        let key = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_add_after_delivers_later() {
        let q = queue();
        q.add_after("p1".to_string(), Duration::from_millis(20));
        assert!(q.is_empty());

        let key = tokio::time::timeout(Duration::from_secs(1), q.next())
            .await
            .unwrap();
        assert_eq!(key.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn test_rate_limited_backoff_grows_and_forget_resets() {
        let q = queue();
        let key = "p1".to_string();

        assert_eq!(q.add_rate_limited(key.clone()), Duration::from_millis(10));
        assert_eq!(q.add_rate_limited(key.clone()), Duration::from_millis(20));
        assert_eq!(q.failures(&key), 2);

        q.forget(&key);
        assert_eq!(q.failures(&key), 0);
        assert_eq!(q.add_rate_limited(key), Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let q = queue();
        let waiter = {
            let q = Arc::clone(&q);
            tokio::spawn(async move { q.next().await })
        };
        tokio::task::yield_now().await;
        q.shutdown();

        let key = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key, None);

        q.add("p1".to_string());
        assert!(q.is_empty());
    }
}
