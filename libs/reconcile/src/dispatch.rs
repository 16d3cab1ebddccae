//! Worker pool that drives reconcile passes from a [`WorkQueue`].

use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::action::{Action, Disposition, ErrorPolicy};
use crate::backoff::BackoffPolicy;
use crate::queue::WorkQueue;

/// A reconcile entry point for one primary kind.
///
/// Implementations must be safe to call concurrently for different keys;
/// the dispatcher guarantees a single key is never reconciled twice at once.
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Reconcile key of the primary kind.
    type Key: Clone + Eq + Hash + Ord + Debug + Display + Send + Sync + 'static;

    /// Error type carrying its own retry classification.
    type Error: std::error::Error + ErrorPolicy + Send + Sync + 'static;

    /// Run one pass for `key`.
    async fn reconcile(&self, key: &Self::Key) -> Result<Action, Self::Error>;
}

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent workers.
    pub workers: usize,

    /// Backoff for failed keys.
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            workers: crate::DEFAULT_WORKERS,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Pulls keys from the queue and hands them to the reconciler.
pub struct Dispatcher<R: Reconciler> {
    reconciler: Arc<R>,
    queue: Arc<WorkQueue<R::Key>>,
    workers: usize,
}

impl<R: Reconciler> Dispatcher<R> {
    /// Create a dispatcher around `reconciler`.
    pub fn new(reconciler: Arc<R>, config: DispatcherConfig) -> Self {
        Self {
            reconciler,
            queue: Arc::new(WorkQueue::new(config.backoff)),
            workers: config.workers.max(1),
        }
    }

    /// The queue feeding this dispatcher.
    pub fn queue(&self) -> Arc<WorkQueue<R::Key>> {
        Arc::clone(&self.queue)
    }

    /// Take one key from the queue and reconcile it.
    ///
    /// Returns false once the queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.next().await else {
            return false;
        };

        let result = self.reconciler.reconcile(&key).await;
        self.handle_result(&key, result);
        self.queue.done(&key);
        true
    }

    fn handle_result(&self, key: &R::Key, result: Result<Action, R::Error>) {
        match result {
            Ok(action) => {
                self.queue.forget(key);
                match action.delay() {
                    Some(delay) => self.queue.add_after(key.clone(), delay),
                    None if action.is_requeue() => {
                        self.queue.add_rate_limited(key.clone());
                    }
                    None => {}
                }
            }
            Err(e) => match e.disposition() {
                Disposition::Retry => {
                    error!(key = %key, error = %e, "Reconcile failed, retrying");
                    self.queue.add_rate_limited(key.clone());
                }
                Disposition::RetryQuiet => {
                    debug!(key = %key, error = %e, "Reconcile incomplete, retrying");
                    self.queue.add_rate_limited(key.clone());
                }
                Disposition::Terminal => {
                    error!(key = %key, error = %e, "Reconcile failed, not retrying");
                    self.queue.forget(key);
                }
            },
        }
    }

    /// Run the worker pool until shutdown is signaled.
    #[instrument(skip_all, fields(workers = self.workers))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("Starting dispatcher");

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            let dispatcher = Arc::clone(&self);
            workers.spawn(async move {
                debug!(worker, "Worker started");
                while dispatcher.process_next().await {}
                debug!(worker, "Worker stopped");
            });
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            if shutdown.changed().await.is_err() {
                break;
            }
        }

        info!("Dispatcher shutting down");
        self.queue.shutdown();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Worker task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;

    #[derive(Debug)]
    struct TestError(Disposition);

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error ({:?})", self.0)
        }
    }

    impl std::error::Error for TestError {}

    impl ErrorPolicy for TestError {
        fn disposition(&self) -> Disposition {
            self.0
        }
    }

    /// Replays scripted results and records every call.
    struct Scripted {
        script: Mutex<Vec<Result<Action, TestError>>>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<Action, TestError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
                calls: Mutex::new(Vec::new()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Reconciler for Scripted {
        type Key = String;
        type Error = TestError;

        async fn reconcile(&self, key: &String) -> Result<Action, TestError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.calls.lock().unwrap().push(key.clone());
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(Action::done())
            } else {
                script.remove(0)
            }
        }
    }

    fn config() -> DispatcherConfig {
        DispatcherConfig {
            workers: 1,
            backoff: BackoffPolicy {
                base: Duration::from_millis(1),
                max: Duration::from_millis(5),
                jitter: 0.0,
            },
        }
    }

    #[tokio::test]
    async fn test_retry_error_requeues_until_success() {
        let reconciler = Scripted::new(vec![
            Err(TestError(Disposition::Retry)),
            Err(TestError(Disposition::RetryQuiet)),
        ]);
        let dispatcher = Dispatcher::new(Arc::clone(&reconciler), config());
        let queue = dispatcher.queue();
        queue.add("p1".to_string());

        for _ in 0..3 {
            assert!(dispatcher.process_next().await);
        }

        assert_eq!(reconciler.calls(), vec!["p1", "p1", "p1"]);
        assert_eq!(queue.failures(&"p1".to_string()), 0);
    }

    #[tokio::test]
    async fn test_terminal_error_is_not_requeued() {
        let reconciler = Scripted::new(vec![Err(TestError(Disposition::Terminal))]);
        let dispatcher = Dispatcher::new(Arc::clone(&reconciler), config());
        let queue = dispatcher.queue();
        queue.add("p1".to_string());

        assert!(dispatcher.process_next().await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(queue.is_empty());
        assert_eq!(reconciler.calls(), vec!["p1"]);
    }

    #[tokio::test]
    async fn test_requeue_after_schedules_again() {
        let reconciler = Scripted::new(vec![Ok(Action::requeue_after(Duration::from_millis(10)))]);
        let dispatcher = Dispatcher::new(Arc::clone(&reconciler), config());
        dispatcher.queue().add("p1".to_string());

        assert!(dispatcher.process_next().await);
        let second = tokio::time::timeout(Duration::from_secs(1), dispatcher.process_next()).await;
        assert_eq!(second.ok(), Some(true));
        assert_eq!(reconciler.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_run_serializes_per_key_and_stops_on_shutdown() {
        let reconciler = Scripted::new(Vec::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&reconciler),
            DispatcherConfig {
                workers: 4,
                ..config()
            },
        ));
        let queue = dispatcher.queue();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(Arc::clone(&dispatcher).run(shutdown_rx));

        for _ in 0..10 {
            queue.add("p1".to_string());
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(reconciler.max_in_flight.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(queue.is_shutting_down());
    }
}
