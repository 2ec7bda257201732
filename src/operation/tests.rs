//! Operation Module Tests
//!
//! Dispatch and backup replication across an in-process cluster wired with
//! `LocalTransport`.
//!
//! ## Test Scopes
//! - **Routing**: forwarding from non-owners, `RoutingStale` on wrong owners.
//! - **Replication**: ack after owner, backups applied in the background,
//!   exactly once per backup replica, never for failed or local operations.
//! - **Reservations**: distinct increasing ids under concurrent reservers, and
//!   no id reissued after a backup takes over.

#[cfg(test)]
mod tests {
    use crate::error::GridError;
    use crate::membership::types::{MembershipEvent, NodeState};
    use crate::operation::{OperationKind, OperationResponse, ServiceKind};
    use crate::testing::{TestCluster, eventually};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(2);

    fn put(key: &str, value: serde_json::Value) -> OperationKind {
        OperationKind::CachePut {
            key: key.to_string(),
            value,
        }
    }

    // ============================================================
    // ROUTING
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_put_from_non_owner_is_forwarded_and_backed_up() {
        // ARRANGE
        let cluster = TestCluster::start(3, 2);
        let caller = cluster.non_owner_of("books");
        let owner = cluster.owner_of("books");

        // ACT
        let op = caller.new_operation(ServiceKind::Cache, "books", put("k", json!("v")));
        let result = caller.dispatch(op).get(WAIT).await;

        // ASSERT
        assert_eq!(result, Ok(OperationResponse::Value(None)));
        assert_eq!(cluster.transport.executed(owner.local_id()), 1);
        assert_eq!(owner.store().cache_value("books", "k"), Some(json!("v")));
        for backup in cluster.backups_of("books") {
            let applied = eventually(|| backup.store().cache_value("books", "k").is_some()).await;
            assert!(applied, "Backup {} never received the put", backup.local_id());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_execute_on_non_owner_is_routing_stale() {
        let cluster = TestCluster::start(3, 1);
        let stranger = cluster.non_owner_of("books");
        let owner_id = cluster.owner_of("books").local_id().clone();

        let op = stranger.new_operation(ServiceKind::Cache, "books", OperationKind::CacheSize);
        let err = stranger.execute_as_owner(op).await.unwrap_err();

        match err {
            GridError::RoutingStale { target, owner, .. } => {
                assert_eq!(target, stranger.local_id().to_string());
                assert_eq!(owner, Some(owner_id.to_string()));
            }
            other => panic!("expected RoutingStale, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dispatch_without_alive_owner_is_routing_stale() {
        let cluster = TestCluster::start(1, 1);
        let node = &cluster.nodes[0];
        node.router().membership().apply(MembershipEvent::StateChanged {
            node_id: node.local_id().clone(),
            state: NodeState::Dead,
            incarnation: 2,
        });

        let op = node.new_operation(ServiceKind::Cache, "books", OperationKind::CacheSize);
        let err = node.dispatch(op).get(WAIT).await.unwrap_err();

        assert!(matches!(err, GridError::RoutingStale { owner: None, .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_reads_run_once_on_owner_without_backups() {
        let cluster = TestCluster::start(3, 2);
        let caller = cluster.non_owner_of("books");

        let op = caller.new_operation(ServiceKind::Cache, "books", OperationKind::CacheSize);
        let result = caller.dispatch(op).get(WAIT).await;

        assert_eq!(result, Ok(OperationResponse::Size(0)));
        assert!(cluster.quiesce().await);
        for node in &cluster.nodes {
            assert_eq!(cluster.transport.delivered_backups(node.local_id()), 0);
        }
    }

    // ============================================================
    // REPLICATION
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_each_backup_receives_exactly_one_copy() {
        // ARRANGE
        let cluster = TestCluster::start(4, 2);
        let owner = cluster.owner_of("books");

        // ACT
        let op = owner.new_operation(ServiceKind::Cache, "books", put("k", json!(1)));
        owner.dispatch(op).get(WAIT).await.unwrap();
        assert!(cluster.quiesce().await);

        // ASSERT
        let backups = cluster.backups_of("books");
        assert_eq!(backups.len(), 2);
        for backup in backups {
            assert_eq!(cluster.transport.delivered_backups(backup.local_id()), 1);
        }
        assert_eq!(cluster.transport.delivered_backups(owner.local_id()), 0);
        if let Some(outsider) = cluster.outsider_of("books") {
            assert_eq!(cluster.transport.delivered_backups(outsider.local_id()), 0);
            assert_eq!(outsider.store().cache_value("books", "k"), None);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_owner_failure_sends_no_backup() {
        let cluster = TestCluster::start(3, 2);
        let owner = cluster.owner_of("jobs");

        let op = owner.new_operation(
            ServiceKind::Queue,
            "jobs",
            OperationKind::TxnCommitPoll { reservation_id: 42 },
        );
        let err = owner.dispatch(op).get(WAIT).await.unwrap_err();

        assert!(matches!(err, GridError::ReservationProtocolViolation { .. }));
        assert!(cluster.quiesce().await);
        for backup in cluster.backups_of("jobs") {
            assert_eq!(cluster.transport.delivered_backups(backup.local_id()), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unreachable_backup_does_not_fail_the_call() {
        // ARRANGE
        let cluster = TestCluster::start(3, 2);
        let owner = cluster.owner_of("books");
        let backups = cluster.backups_of("books");
        cluster.transport.disconnect(backups[0].local_id());

        // ACT
        let op = owner.new_operation(ServiceKind::Cache, "books", put("k", json!("v")));
        let result = owner.dispatch(op).get(WAIT).await;
        assert!(cluster.quiesce().await);

        // ASSERT
        assert_eq!(result, Ok(OperationResponse::Value(None)));
        assert_eq!(backups[0].store().cache_value("books", "k"), None);
        assert_eq!(backups[1].store().cache_value("books", "k"), Some(json!("v")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_backups_apply_queue_effects_in_owner_order() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let owner = cluster.owner_of("jobs");

        // ACT
        for i in 0..20 {
            let op = owner.new_operation(
                ServiceKind::Queue,
                "jobs",
                OperationKind::QueueOffer { value: json!(i) },
            );
            owner.dispatch(op).get(WAIT).await.unwrap();
        }
        let poll = owner.new_operation(ServiceKind::Queue, "jobs", OperationKind::QueuePoll);
        owner.dispatch(poll).get(WAIT).await.unwrap();
        assert!(cluster.quiesce().await);

        // ASSERT
        let backup = cluster.backups_of("jobs")[0];
        let expected: Vec<_> = (1..20).map(|i| json!(i)).collect();
        assert_eq!(owner.store().queue_values("jobs"), Some(expected.clone()));
        assert_eq!(backup.store().queue_values("jobs"), Some(expected));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_backup_matches_owner_under_concurrent_offers_and_reserves() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let owner = cluster.owner_of("jobs");
        let mut futures = Vec::new();

        // ACT: interleave offers with reserve-polls of the items they create
        for i in 0..200 {
            let kind = if i % 2 == 0 {
                OperationKind::QueueOffer { value: json!(i) }
            } else {
                OperationKind::TxnReservePoll
            };
            let op = owner.new_operation(ServiceKind::Queue, "jobs", kind);
            futures.push(owner.dispatch(op));
        }
        for future in futures {
            future.get(WAIT).await.unwrap();
        }
        assert!(cluster.quiesce().await);

        // ASSERT
        let backup = cluster.backups_of("jobs")[0];
        assert_eq!(
            backup.store().queue_values("jobs"),
            owner.store().queue_values("jobs")
        );
        assert_eq!(
            backup.store().reservation_count("jobs"),
            owner.store().reservation_count("jobs")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_local_destroy_stays_on_owner() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let owner = cluster.owner_of("books");
        let op = owner.new_operation(ServiceKind::Cache, "books", put("k", json!(1)));
        owner.dispatch(op).get(WAIT).await.unwrap();
        assert!(cluster.quiesce().await);
        let backup = cluster.backups_of("books")[0];

        // ACT
        let destroy = owner.new_operation(
            ServiceKind::Cache,
            "books",
            OperationKind::Destroy { is_local: true },
        );
        let result = owner.dispatch(destroy).get(WAIT).await;
        assert!(cluster.quiesce().await);

        // ASSERT
        assert_eq!(result, Ok(OperationResponse::Bool(true)));
        assert_eq!(owner.store().cache_value("books", "k"), None);
        assert_eq!(backup.store().cache_value("books", "k"), Some(json!(1)));
    }

    // ============================================================
    // RESERVATIONS
    // ============================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserves_get_distinct_ids() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let mut futures = Vec::new();

        // ACT
        for i in 0..60 {
            let caller = &cluster.nodes[i % cluster.nodes.len()];
            let op = caller.new_operation(ServiceKind::Queue, "jobs", OperationKind::TxnReserveId);
            futures.push(caller.dispatch(op));
        }
        let mut ids = Vec::new();
        for future in futures {
            match future.get(WAIT).await.unwrap() {
                OperationResponse::ReservationId(id) => ids.push(id),
                other => panic!("expected a reservation id, got {:?}", other),
            }
        }
        let owner = cluster.owner_of("jobs");
        let later = owner.new_operation(ServiceKind::Queue, "jobs", OperationKind::TxnReserveId);
        let last = owner.dispatch(later).get(WAIT).await.unwrap();

        // ASSERT
        let distinct: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), ids.len(), "Reservation ids must never repeat");
        match last {
            OperationResponse::ReservationId(id) => {
                assert!(ids.iter().all(|&earlier| earlier < id));
            }
            other => panic!("expected a reservation id, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_promoted_backup_never_reissues_a_reserved_id() {
        // ARRANGE
        let cluster = TestCluster::start(2, 1);
        let owner = cluster.owner_of("jobs");
        let backup = cluster.backups_of("jobs")[0];
        let offer = owner.new_operation(
            ServiceKind::Queue,
            "jobs",
            OperationKind::QueueOffer { value: json!("a") },
        );
        owner.dispatch(offer).get(WAIT).await.unwrap();
        let reserve = owner.new_operation(ServiceKind::Queue, "jobs", OperationKind::TxnReserveId);
        let reserved = match owner.dispatch(reserve).get(WAIT).await.unwrap() {
            OperationResponse::ReservationId(id) => id,
            other => panic!("expected a reservation id, got {:?}", other),
        };
        assert!(cluster.quiesce().await);
        assert_eq!(backup.store().reservation_count("jobs"), 1);

        // ACT: the owner leaves and the backup takes over the partition
        backup.router().membership().apply(MembershipEvent::Left {
            node_id: owner.local_id().clone(),
        });
        let partition = backup.router().resolve_partition("jobs");
        assert!(backup.router().resolve_replicas(partition).is_owner(backup.local_id()));
        let again = backup.new_operation(ServiceKind::Queue, "jobs", OperationKind::TxnReserveId);
        let promoted = backup.dispatch(again).get(WAIT).await.unwrap();

        // ASSERT
        match promoted {
            OperationResponse::ReservationId(id) => assert!(id > reserved),
            other => panic!("expected a reservation id, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_commit_of_same_reservation_is_rejected() {
        // ARRANGE
        let cluster = TestCluster::start(3, 1);
        let caller = cluster.non_owner_of("jobs");
        let reserve = caller.new_operation(ServiceKind::Queue, "jobs", OperationKind::TxnReserveId);
        let id = match caller.dispatch(reserve).get(WAIT).await.unwrap() {
            OperationResponse::ReservationId(id) => id,
            other => panic!("expected a reservation id, got {:?}", other),
        };
        let commit = OperationKind::TxnCommitOffer {
            reservation_id: id,
            value: json!("x"),
        };

        // ACT
        let first = caller
            .dispatch(caller.new_operation(ServiceKind::Queue, "jobs", commit.clone()))
            .get(WAIT)
            .await;
        let second = caller
            .dispatch(caller.new_operation(ServiceKind::Queue, "jobs", commit))
            .get(WAIT)
            .await;

        // ASSERT
        assert_eq!(first, Ok(OperationResponse::Done));
        assert_eq!(
            second,
            Err(GridError::ReservationProtocolViolation {
                name: "jobs".to_string(),
                reservation_id: id,
            })
        );
        assert!(cluster.quiesce().await);
        let backup = cluster.backups_of("jobs")[0];
        assert_eq!(backup.store().queue_values("jobs"), Some(vec![json!("x")]));
    }

    // ============================================================
    // HTTP TRANSPORT
    // ============================================================

    mod http {
        use super::*;
        use crate::config::TransportConfig;
        use crate::container::PartitionStore;
        use crate::membership::types::{MembershipEvent, Node, NodeId};
        use crate::membership::view::MembershipView;
        use crate::operation::handlers::node_router;
        use crate::operation::protocol::{
            ENDPOINT_MEMBERSHIP, ENDPOINT_STATS, MembershipRequest, MembershipResponse,
            StatsResponse,
        };
        use crate::operation::{HttpTransport, OperationService, PartitionExecutor, Transport};
        use crate::partition::PartitionRouter;
        use std::sync::Arc;

        async fn http_pair() -> Vec<Arc<OperationService>> {
            let mut listeners = Vec::new();
            let mut members = Vec::new();
            for i in 0..2 {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                let addr = listener.local_addr().unwrap();
                members.push(Node::alive(NodeId(format!("node-{}", i)), addr));
                listeners.push(listener);
            }

            let mut services = Vec::new();
            for (local, listener) in members.clone().into_iter().zip(listeners) {
                let others = members.iter().filter(|m| m.id != local.id).cloned().collect();
                let view = MembershipView::with_members(local, others);
                let router = PartitionRouter::new(view.clone(), 16, 1);
                let executor = PartitionExecutor::start(PartitionStore::new(None, None), 2).unwrap();
                let transport = HttpTransport::new(view, &TransportConfig::default());
                let service = OperationService::new(router, executor, transport);
                let app = node_router(service.clone());
                tokio::spawn(async move {
                    axum::serve(listener, app).await.unwrap();
                });
                services.push(service);
            }
            services
        }

        fn owner_and_other<'a>(
            nodes: &'a [Arc<OperationService>],
            name: &str,
        ) -> (&'a Arc<OperationService>, &'a Arc<OperationService>) {
            let router = nodes[0].router();
            let replicas = router.resolve_replicas(router.resolve_partition(name));
            let owner_id = replicas.owner().unwrap().clone();
            if nodes[0].local_id() == &owner_id {
                (&nodes[0], &nodes[1])
            } else {
                (&nodes[1], &nodes[0])
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_put_is_forwarded_and_replicated_over_http() {
            // ARRANGE
            let nodes = http_pair().await;
            let (owner, other) = owner_and_other(&nodes, "books");

            // ACT
            let op = other.new_operation(ServiceKind::Cache, "books", put("k", json!("v")));
            let result = other.dispatch(op).get(WAIT).await;

            // ASSERT
            assert_eq!(result, Ok(OperationResponse::Value(None)));
            assert_eq!(owner.store().cache_value("books", "k"), Some(json!("v")));
            let replicated = eventually(|| other.store().cache_value("books", "k").is_some()).await;
            assert!(replicated, "The only backup should receive the put");
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_remote_failure_keeps_its_variant() {
            let nodes = http_pair().await;
            let (owner, other) = owner_and_other(&nodes, "books");
            let transport = HttpTransport::new(
                owner.router().membership().clone(),
                &TransportConfig::default(),
            );

            let op = owner.new_operation(ServiceKind::Cache, "books", OperationKind::CacheSize);
            let err = transport.execute(other.local_id(), op).await.unwrap_err();

            assert!(matches!(err, GridError::RoutingStale { .. }));
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn test_membership_and_stats_endpoints() {
            // ARRANGE
            let nodes = http_pair().await;
            let node = &nodes[0];
            let addr = node.router().membership().local_node.http_addr;
            let client = reqwest::Client::new();
            let joiner = Node::alive(NodeId("node-9".to_string()), "127.0.0.1:9".parse().unwrap());

            // ACT
            let membership: MembershipResponse = client
                .post(format!("http://{}{}", addr, ENDPOINT_MEMBERSHIP))
                .json(&MembershipRequest {
                    event: MembershipEvent::Joined { node: joiner },
                })
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            let stats: StatsResponse = client
                .get(format!("http://{}{}", addr, ENDPOINT_STATS))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();

            // ASSERT
            assert!(membership.changed);
            assert_eq!(membership.epoch, 2);
            assert_eq!(stats.node_id, "node-0");
            assert_eq!(stats.alive_members, 3);
            assert_eq!(stats.epoch, 2);
        }
    }
}
