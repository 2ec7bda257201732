//! Proxy Module Tests
//!
//! ## Test Scopes
//! - **Close**: tracked bulk loads are drained, listeners hear each outcome
//!   exactly once, side effects run once under concurrent callers.
//! - **Destroy**: one grid-wide destroy, never repeated.
//! - **Tracking**: completion settles an entry; fatal outcomes stay for the drain.
//! - **Guards**: `ensure_open()` after close, `open()` after destroy.

#[cfg(test)]
mod tests {
    use crate::config::GridConfig;
    use crate::container::CacheLoader;
    use crate::error::GridError;
    use crate::operation::{OperationKind, OperationResponse, ServiceKind};
    use crate::invocation::InvocationFuture;
    use crate::proxy::{
        CacheProxy, CompletionListener, InvocationTracker, ProxyState, QueueProxy,
    };
    use crate::testing::{TestCluster, eventually};
    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct SlowLoader {
        delay: Duration,
    }

    impl CacheLoader for SlowLoader {
        fn load(&self, _cache: &str, key: &str) -> anyhow::Result<Option<Value>> {
            std::thread::sleep(self.delay);
            Ok(Some(json!(format!("v-{}", key))))
        }
    }

    #[derive(Default)]
    struct RecordingListener {
        responses: Mutex<Vec<OperationResponse>>,
        failures: Mutex<Vec<GridError>>,
    }

    impl RecordingListener {
        fn notifications(&self) -> usize {
            self.responses.lock().len() + self.failures.lock().len()
        }
    }

    impl CompletionListener for RecordingListener {
        fn on_response(&self, response: OperationResponse) {
            self.responses.lock().push(response);
        }

        fn on_failure(&self, error: GridError) {
            self.failures.lock().push(error);
        }
    }

    fn config(drain_ms: u64) -> GridConfig {
        let mut config = GridConfig::default();
        config.invocation.call_timeout_ms = 2_000;
        config.invocation.close_drain_timeout_ms = drain_ms;
        config
    }

    fn slow_cluster(delay_ms: u64) -> TestCluster {
        let loader = SlowLoader {
            delay: Duration::from_millis(delay_ms),
        };
        TestCluster::with_loader(3, 1, Some(Arc::new(loader)))
    }

    fn start_loads(proxy: &CacheProxy, count: usize) -> Vec<Arc<RecordingListener>> {
        (0..count)
            .map(|i| {
                let listener = Arc::new(RecordingListener::default());
                proxy
                    .load_all(vec![format!("key-{}", i)], true, Some(listener.clone()))
                    .unwrap();
                listener
            })
            .collect()
    }

    // ============================================================
    // TRACKING
    // ============================================================

    #[tokio::test]
    async fn test_completion_settles_tracked_entry() {
        // ARRANGE
        let tracker = InvocationTracker::new();
        let listener = Arc::new(RecordingListener::default());
        let future = InvocationFuture::new();
        tracker.track(&future, Some(listener.clone())).unwrap();

        // ACT
        future.complete(Ok(OperationResponse::Done));

        // ASSERT
        assert!(eventually(|| tracker.is_empty()).await);
        assert_eq!(listener.responses.lock().as_slice(), &[OperationResponse::Done]);
        assert!(listener.failures.lock().is_empty());
        assert_eq!(tracker.drain(Duration::from_millis(10)).await, Ok(0));
    }

    #[tokio::test]
    async fn test_fatal_outcome_is_left_for_drain() {
        // ARRANGE
        let tracker = InvocationTracker::new();
        let listener = Arc::new(RecordingListener::default());
        let future = InvocationFuture::new();
        tracker.track(&future, Some(listener.clone())).unwrap();
        let fatal = GridError::FatalResourceExhaustion {
            message: "heap".to_string(),
        };

        // ACT
        future.complete(Err(fatal.clone()));
        let reraised = future.callback_finished().await;
        let drained = tracker.drain(Duration::from_millis(10)).await;

        // ASSERT
        assert_eq!(reraised, Err(fatal.clone()));
        assert_eq!(drained, Err(fatal));
        assert_eq!(listener.notifications(), 0);
    }

    // ============================================================
    // CLOSE
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_close_drains_tracked_loads() {
        // ARRANGE
        let cluster = slow_cluster(100);
        let proxy = CacheProxy::new(cluster.non_owner_of("books").clone(), "books", &config(2_000));
        let listeners = start_loads(&proxy, 3);
        assert_eq!(proxy.tracked_count(), 3);

        // ACT
        proxy.close().await.unwrap();

        // ASSERT
        assert!(proxy.is_closed());
        assert_eq!(proxy.tracked_count(), 0);
        assert!(eventually(|| listeners.iter().all(|l| l.notifications() == 1)).await);
        for listener in &listeners {
            assert_eq!(
                *listener.responses.lock(),
                vec![OperationResponse::Loaded { count: 1 }]
            );
            assert!(listener.failures.lock().is_empty());
        }
        let owner = cluster.owner_of("books");
        assert_eq!(owner.store().cache_value("books", "key-2"), Some(json!("v-key-2")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_runs_side_effects_once() {
        // ARRANGE
        let cluster = slow_cluster(50);
        let proxy = CacheProxy::new(cluster.owner_of("books").clone(), "books", &config(2_000));
        let hook_runs = Arc::new(AtomicUsize::new(0));
        let counter = hook_runs.clone();
        proxy.add_close_hook(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let listeners = start_loads(&proxy, 3);

        // ACT
        let first = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.close().await }
        });
        let second = tokio::spawn({
            let proxy = proxy.clone();
            async move { proxy.close().await }
        });
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        proxy.close().await.unwrap();

        // ASSERT
        assert!(proxy.is_closed());
        assert!(
            eventually(|| hook_runs.load(Ordering::SeqCst) == 1).await,
            "Close hooks must run"
        );
        assert!(
            eventually(|| listeners.iter().all(|l| l.notifications() == 1)).await
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
        assert!(listeners.iter().all(|l| l.notifications() == 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_drain_timeout_is_reported_once_to_listener() {
        // ARRANGE
        let cluster = slow_cluster(300);
        let proxy = CacheProxy::new(cluster.owner_of("books").clone(), "books", &config(30));
        let listeners = start_loads(&proxy, 1);

        // ACT
        proxy.close().await.unwrap();
        let after_close = listeners[0].failures.lock().clone();
        tokio::time::sleep(Duration::from_millis(500)).await;

        // ASSERT
        assert_eq!(after_close, vec![GridError::Timeout { waited_ms: 30 }]);
        assert_eq!(listeners[0].notifications(), 1, "Late completion must not notify again");
        let owner = cluster.owner_of("books");
        assert_eq!(
            owner.store().cache_value("books", "key-0"),
            Some(json!("v-key-0")),
            "A drain timeout does not cancel the load"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_load_after_close_is_rejected() {
        let cluster = slow_cluster(1);
        let proxy = CacheProxy::new(cluster.nodes[0].clone(), "books", &config(100));
        proxy.close().await.unwrap();

        let err = proxy.load_all(vec!["a".to_string()], true, None).unwrap_err();

        assert!(matches!(err, GridError::LifecycleViolation { .. }));
        assert_eq!(proxy.tracked_count(), 0);
    }

    // ============================================================
    // DESTROY & GUARDS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_destroy_issues_a_single_remote_destroy() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let owner = cluster.owner_of("books").clone();
        let backup = cluster.backups_of("books")[0].clone();
        let proxy = CacheProxy::new(cluster.non_owner_of("books").clone(), "books", &config(100));
        proxy.put("k", json!(1)).await.unwrap();
        assert!(cluster.quiesce().await);

        // ACT
        proxy.destroy().await.unwrap();
        assert!(cluster.quiesce().await);
        let recreate = owner.new_operation(
            ServiceKind::Cache,
            "books",
            OperationKind::CachePut {
                key: "k".to_string(),
                value: json!(2),
            },
        );
        owner.dispatch(recreate).get(Duration::from_secs(2)).await.unwrap();
        proxy.destroy().await.unwrap();

        // ASSERT
        assert_eq!(proxy.state(), ProxyState::Destroyed);
        assert_eq!(
            owner.store().cache_value("books", "k"),
            Some(json!(2)),
            "A second destroy must not reach the owner"
        );
        assert!(cluster.quiesce().await);
        assert_eq!(backup.store().cache_value("books", "k"), Some(json!(2)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_destroy_reaches_backups() {
        let cluster = TestCluster::start(3, 1);
        let backup = cluster.backups_of("books")[0].clone();
        let proxy = CacheProxy::new(cluster.owner_of("books").clone(), "books", &config(100));
        proxy.put("k", json!(1)).await.unwrap();

        proxy.destroy().await.unwrap();
        assert!(cluster.quiesce().await);

        assert!(!backup.store().has_container(ServiceKind::Cache, "books"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_calls_after_close_fail_until_reopened() {
        // ARRANGE
        let cluster = TestCluster::start(2, 1);
        let proxy = CacheProxy::new(cluster.nodes[0].clone(), "books", &config(100));
        proxy.put("k", json!(1)).await.unwrap();

        // ACT
        proxy.close().await.unwrap();
        let closed = proxy.get("k").await;
        proxy.open().unwrap();
        let reopened = proxy.get("k").await;

        // ASSERT
        assert!(matches!(closed, Err(GridError::LifecycleViolation { .. })));
        assert!(proxy.ensure_open().is_ok());
        assert_eq!(reopened, Ok(Some(json!(1))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_after_destroy_is_lifecycle_violation() {
        let cluster = TestCluster::start(2, 1);
        let proxy = CacheProxy::new(cluster.nodes[0].clone(), "books", &config(100));

        proxy.destroy().await.unwrap();

        assert!(proxy.is_destroyed());
        assert!(matches!(
            proxy.open(),
            Err(GridError::LifecycleViolation { .. })
        ));
        assert!(proxy.ensure_open().is_err());
    }

    // ============================================================
    // QUEUE PROXY
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_proxy_round_trip_and_transaction() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let proxy = QueueProxy::new(cluster.nodes[0].clone(), "jobs", &config(100));

        // ACT
        assert!(proxy.offer(json!("a")).await.unwrap());
        assert!(proxy.offer(json!("b")).await.unwrap());
        let peeked = proxy.peek().await.unwrap();
        let txn = proxy.new_transaction().unwrap();
        let taken = txn.poll().await.unwrap();
        let size_during = proxy.size().await.unwrap();
        txn.commit().await.unwrap();

        // ASSERT
        assert_eq!(peeked, Some(json!("a")));
        assert_eq!(taken, Some(json!("a")));
        assert_eq!(size_during, 1);
        assert_eq!(proxy.poll().await.unwrap(), Some(json!("b")));
        assert_eq!(proxy.poll().await.unwrap(), None);

        proxy.close().await.unwrap();
        assert!(matches!(
            proxy.new_transaction(),
            Err(GridError::LifecycleViolation { .. })
        ));
    }
}
