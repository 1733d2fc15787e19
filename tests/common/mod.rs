// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::client::Client;
use routecontroller::crd::{Route, RouteDestination, RouteSpec};
use routecontroller::istio::VirtualService;
use std::collections::BTreeMap;

/// Get a Kubernetes client or skip the test if no cluster is reachable
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: no Kubernetes cluster available: {e}");
            None
        }
    }
}

/// Returns `true` when both the Route and the Istio `VirtualService` CRDs are installed.
pub async fn crds_installed(client: &Client, namespace: &str) -> bool {
    let routes: Api<Route> = Api::namespaced(client.clone(), namespace);
    let virtual_services: Api<VirtualService> = Api::namespaced(client.clone(), namespace);
    let lp = ListParams::default().limit(1);

    match (routes.list(&lp).await, virtual_services.list(&lp).await) {
        (Ok(_), Ok(_)) => true,
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("Skipping integration test: required CRDs are missing: {e}");
            false
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());

    let test_ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                "test".to_string(),
                "routecontroller-integration".to_string(),
            )])),
            ..Default::default()
        },
        ..Default::default()
    };

    match namespaces.create(&PostParams::default(), &test_ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Delete a test namespace, ignoring one that is already gone
pub async fn delete_test_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) | Err(kube::Error::Api(_)) => {}
        Err(e) => eprintln!("Failed to delete test namespace {name}: {e}"),
    }
}

/// Create a Route with unweighted destinations
pub async fn create_route(
    client: &Client,
    namespace: &str,
    name: &str,
    host: &str,
    destinations: &[(&str, i32)],
) -> Result<Route, kube::Error> {
    let routes: Api<Route> = Api::namespaced(client.clone(), namespace);

    let mut route = Route::new(
        name,
        RouteSpec {
            host: host.to_string(),
            destinations: destinations
                .iter()
                .map(|(guid, port)| RouteDestination {
                    guid: (*guid).to_string(),
                    port: *port,
                    weight: None,
                    selector: None,
                })
                .collect(),
        },
    );
    route.metadata.namespace = Some(namespace.to_string());

    routes.create(&PostParams::default(), &route).await
}

/// Delete a Route
pub async fn delete_route(client: &Client, namespace: &str, name: &str) -> Result<(), kube::Error> {
    let routes: Api<Route> = Api::namespaced(client.clone(), namespace);
    routes.delete(name, &DeleteParams::default()).await.map(|_| ())
}
