// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `engine.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::Route;
    use crate::labels::K8S_MANAGED_BY;
    use crate::mesh_resources::{build_service, service_name, virtual_service_name};
    use crate::reconcilers::cluster_state::list_managed;
    use crate::reconcilers::desired::{build_desired_state, ServiceTarget};
    use crate::reconcilers::diff::plan;
    use crate::reconcilers::test_support::{destination, route, FakeCluster, FakeOp};
    use kube::ResourceExt;
    use std::collections::BTreeMap;
    use std::time::Duration;

    async fn plan_for(cluster: &FakeCluster, routes: &[Route]) -> ReconcilePlan {
        let actual = list_managed(cluster, Duration::from_secs(1)).await.unwrap();
        plan(&build_desired_state(routes), &actual, "default", &[])
    }

    async fn converge_routes(cluster: &FakeCluster, routes: &[Route]) -> ReconcileResult {
        let actual = list_managed(cluster, Duration::from_secs(1)).await.unwrap();
        reconcile(cluster, &build_desired_state(routes), &actual, "default", &[]).await
    }

    fn conflict(name: &str) -> ClusterError {
        ClusterError::Conflict {
            kind: "Service".to_string(),
            name: name.to_string(),
            message: "the object has been modified".to_string(),
        }
    }

    #[tokio::test]
    async fn test_creates_everything_on_empty_cluster() {
        let cluster = FakeCluster::new();
        let routes = vec![
            route("r1", "a.example.com", vec![destination("destination-guid-1", 8080)]),
            route("r2", "a.example.com", vec![destination("destination-guid-2", 9000)]),
        ];

        let result = converge_routes(&cluster, &routes).await;

        assert!(result.is_clean());
        assert_eq!(result.created, 3);
        assert_eq!(
            cluster.names(ManagedKind::Service),
            vec!["s-destination-guid-1", "s-destination-guid-2"]
        );
        assert_eq!(
            cluster.names(ManagedKind::VirtualHost),
            vec![virtual_service_name("a.example.com")]
        );
    }

    #[tokio::test]
    async fn test_second_pass_writes_nothing() {
        let cluster = FakeCluster::new();
        let routes = vec![route(
            "r1",
            "a.example.com",
            vec![destination("g1", 8080), destination("g2", 8080)],
        )];
        converge_routes(&cluster, &routes).await;
        cluster.clear_writes();

        let result = converge_routes(&cluster, &routes).await;

        assert_eq!(result.writes(), 0);
        assert_eq!(result.unchanged, 3);
        assert!(cluster.writes().is_empty());
    }

    #[tokio::test]
    async fn test_removed_route_deletes_objects() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;

        let result = converge_routes(&cluster, &[]).await;

        assert_eq!(result.deleted, 2);
        assert!(cluster.names(ManagedKind::Service).is_empty());
        assert!(cluster.names(ManagedKind::VirtualHost).is_empty());
        let writes = cluster.writes();
        assert_eq!(writes[writes.len() - 2].1, ManagedKind::VirtualHost);
        assert_eq!(writes[writes.len() - 1].1, ManagedKind::Service);
    }

    #[tokio::test]
    async fn test_update_conflict_is_retried_after_reread() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;
        let routes = [route("r1", "a.example.com", vec![destination("g1", 9000)])];
        let plan = plan_for(&cluster, &routes).await;

        // Someone else writes between our read and our write
        cluster.touch(ManagedKind::Service, "s-g1");
        let result = apply_plan(&cluster, &plan).await;

        assert!(result.is_clean());
        assert_eq!(result.updated, 2);
        assert_eq!(cluster.calls(FakeOp::Get), 1);
        let Some(ManagedObject::Service(svc)) = cluster.object(ManagedKind::Service, "s-g1")
        else {
            panic!("service missing");
        };
        assert_eq!(svc.spec.unwrap().ports.unwrap()[0].port, 9000);
    }

    #[tokio::test]
    async fn test_conflict_retries_are_bounded() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;
        for _ in 0..=MAX_CONFLICT_RETRIES {
            cluster.fail_next(FakeOp::Replace, conflict("s-g1"));
        }

        let result = converge_routes(
            &cluster,
            &[route("r1", "b.example.com", vec![destination("g1", 9000)])],
        )
        .await;

        let failure = result
            .failures
            .iter()
            .find(|f| f.name == "s-g1")
            .expect("service update should fail");
        assert_eq!(failure.reason, FailureReason::ConflictRetriesExhausted);
        assert_eq!(cluster.calls(FakeOp::Replace), (MAX_CONFLICT_RETRIES + 1) as usize);
        // The rest of the plan still ran
        assert_eq!(result.created, 1);
        assert_eq!(result.deleted, 1);
    }

    #[tokio::test]
    async fn test_unmanaged_object_is_never_overwritten() {
        let cluster = FakeCluster::new();
        let mut foreign = build_service(
            &ServiceTarget {
                guid: "g1".to_string(),
                port: 1234,
                selector: BTreeMap::from([("app".to_string(), "legacy".to_string())]),
            },
            "default",
        );
        foreign.labels_mut().remove(K8S_MANAGED_BY);
        cluster.insert(ManagedObject::Service(foreign));

        let result = converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].reason, FailureReason::UnmanagedCollision);
        let Some(ManagedObject::Service(svc)) = cluster.object(ManagedKind::Service, "s-g1")
        else {
            panic!("foreign service removed");
        };
        assert_eq!(svc.spec.unwrap().ports.unwrap()[0].port, 1234);
    }

    #[tokio::test]
    async fn test_unmanaged_object_is_never_deleted() {
        let cluster = FakeCluster::new();
        let mut foreign = build_service(
            &ServiceTarget {
                guid: "g9".to_string(),
                port: 8080,
                selector: BTreeMap::new(),
            },
            "default",
        );
        foreign.labels_mut().remove(K8S_MANAGED_BY);
        cluster.insert(ManagedObject::Service(foreign));

        let result = converge_routes(&cluster, &[]).await;

        assert_eq!(result.writes(), 0);
        assert!(cluster.object(ManagedKind::Service, &service_name("g9")).is_some());
    }

    #[tokio::test]
    async fn test_delete_of_vanished_object_succeeds() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;
        let plan = plan_for(&cluster, &[]).await;
        cluster.remove(ManagedKind::Service, "s-g1");

        let result = apply_plan(&cluster, &plan).await;

        assert!(result.is_clean());
        assert_eq!(result.deleted, 2);
    }

    #[tokio::test]
    async fn test_stale_delete_rereads_and_retries() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;
        let plan = plan_for(&cluster, &[]).await;
        cluster.touch(ManagedKind::Service, "s-g1");

        let result = apply_plan(&cluster, &plan).await;

        assert!(result.is_clean());
        assert!(cluster.names(ManagedKind::Service).is_empty());
        assert_eq!(cluster.calls(FakeOp::Get), 1);
    }

    #[tokio::test]
    async fn test_update_of_vanished_object_recreates_it() {
        let cluster = FakeCluster::new();
        converge_routes(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 8080)])],
        )
        .await;
        let plan = plan_for(
            &cluster,
            &[route("r1", "a.example.com", vec![destination("g1", 9000)])],
        )
        .await;
        cluster.remove(ManagedKind::Service, "s-g1");

        let result = apply_plan(&cluster, &plan).await;

        assert!(result.is_clean());
        assert!(cluster.object(ManagedKind::Service, "s-g1").is_some());
        assert_eq!(result.created, 1);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_pass() {
        let cluster = FakeCluster::new();
        cluster.fail_next(
            FakeOp::Create,
            ClusterError::Transient {
                operation: "create Service s-g1".to_string(),
                message: "connection reset".to_string(),
            },
        );

        let result = converge_routes(
            &cluster,
            &[route(
                "r1",
                "a.example.com",
                vec![destination("g1", 8080), destination("g2", 8080)],
            )],
        )
        .await;

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].reason.as_label(), "transient");
        assert_eq!(result.created, 2);
    }

    #[tokio::test]
    async fn test_concurrent_create_of_identical_object_is_unchanged() {
        let cluster = FakeCluster::new();
        let routes = [route("r1", "a.example.com", vec![destination("g1", 8080)])];
        let plan = plan_for(&cluster, &routes).await;

        // Another replica wins the race with identical content
        for action in &plan.creates {
            cluster.insert(action.desired.clone().unwrap());
        }
        let result = apply_plan(&cluster, &plan).await;

        assert!(result.is_clean());
        assert_eq!(result.created, 0);
        assert_eq!(result.unchanged, 2);
    }
}
