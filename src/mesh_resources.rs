// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Rendering of the Kubernetes objects the controller manages.
//!
//! Builds Istio `VirtualService`s from [`VirtualHostTarget`]s and core `Service`s from
//! [`ServiceTarget`]s, and merges a rendered object onto a live one for full-replace
//! updates. Names are derived deterministically from the identity key so re-rendering the
//! same target always addresses the same object.

use crate::constants::{
    SERVICE_NAME_PREFIX, SERVICE_PORT_NAME, SERVICE_PORT_PROTOCOL, TOTAL_ROUTE_WEIGHT,
    VIRTUAL_SERVICE_NAME_PREFIX,
};
use crate::istio::{
    Destination, HttpRoute, HttpRouteDestination, PortSelector, VirtualService,
    VirtualServiceSpec,
};
use crate::labels::{
    managed_labels, COMPONENT_BACKING_SERVICE, COMPONENT_VIRTUAL_HOST, DESTINATION_GUID_LABEL,
    HOST_ANNOTATION,
};
use crate::reconcilers::desired::{ServiceTarget, VirtualHostTarget, WeightedDestination};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Name of the backing service for a workload guid.
#[must_use]
pub fn service_name(guid: &str) -> String {
    format!("{SERVICE_NAME_PREFIX}{guid}")
}

/// Name of the virtual service for a host.
///
/// Hostnames may exceed the 63-character object name limit and contain characters that are
/// not valid in names, so the name is the hex SHA-256 digest of the host.
#[must_use]
pub fn virtual_service_name(host: &str) -> String {
    let digest = Sha256::digest(host.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{VIRTUAL_SERVICE_NAME_PREFIX}{hex}")
}

/// Weights to render for each destination of a virtual host, in order.
///
/// When no destination declares a weight and traffic is shared by more than one
/// destination, an equal split summing to [`TOTAL_ROUTE_WEIGHT`] is produced with the
/// remainder going to the first entries. Otherwise declared weights pass through untouched.
#[must_use]
pub fn render_weights(destinations: &[WeightedDestination]) -> Vec<Option<u32>> {
    let all_omitted = destinations.iter().all(|d| d.weight.is_none());
    if destinations.len() < 2 || !all_omitted {
        return destinations.iter().map(|d| d.weight).collect();
    }

    let count = u32::try_from(destinations.len()).unwrap_or(u32::MAX);
    let base = TOTAL_ROUTE_WEIGHT / count;
    let remainder = TOTAL_ROUTE_WEIGHT % count;
    (0..count).map(|i| Some(base + u32::from(i < remainder))).collect()
}

/// Build the `VirtualService` for a virtual host.
///
/// # Arguments
///
/// * `target` - The desired virtual host
/// * `namespace` - Namespace the object lives in
/// * `gateways` - Istio gateways to bind to; empty means the mesh-internal default
#[must_use]
pub fn build_virtual_service(
    target: &VirtualHostTarget,
    namespace: &str,
    gateways: &[String],
) -> VirtualService {
    let route = target
        .destinations
        .iter()
        .zip(render_weights(&target.destinations))
        .map(|(destination, weight)| HttpRouteDestination {
            destination: Destination {
                host: service_name(&destination.guid),
                port: Some(PortSelector {
                    number: u32::from(destination.port),
                }),
            },
            weight,
        })
        .collect();

    let mut annotations = BTreeMap::new();
    annotations.insert(HOST_ANNOTATION.to_string(), target.host.clone());

    let mut vs = VirtualService::new(
        &virtual_service_name(&target.host),
        VirtualServiceSpec {
            hosts: vec![target.host.clone()],
            gateways: gateways.to_vec(),
            http: vec![HttpRoute { route }],
        },
    );
    vs.metadata.namespace = Some(namespace.to_string());
    vs.metadata.labels = Some(managed_labels(COMPONENT_VIRTUAL_HOST));
    vs.metadata.annotations = Some(annotations);
    vs
}

/// Build the backing `Service` for a workload.
///
/// The service exposes exactly one TCP port whose `port` and `targetPort` both equal the
/// declared destination port.
#[must_use]
pub fn build_service(target: &ServiceTarget, namespace: &str) -> Service {
    let mut labels = managed_labels(COMPONENT_BACKING_SERVICE);
    labels.insert(DESTINATION_GUID_LABEL.to_string(), target.guid.clone());

    Service {
        metadata: ObjectMeta {
            name: Some(service_name(&target.guid)),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(target.selector.clone()),
            ports: Some(service_ports(target.port)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn service_ports(port: u16) -> Vec<ServicePort> {
    vec![ServicePort {
        name: Some(SERVICE_PORT_NAME.into()),
        port: i32::from(port),
        target_port: Some(IntOrString::Int(i32::from(port))),
        protocol: Some(SERVICE_PORT_PROTOCOL.into()),
        ..Default::default()
    }]
}

/// Overlay `desired` key/value pairs onto `existing`, keeping foreign keys.
fn merge_map(
    existing: Option<&BTreeMap<String, String>>,
    desired: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    let mut merged = existing.cloned().unwrap_or_default();
    if let Some(desired) = desired {
        merged.extend(desired.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    Some(merged)
}

/// Prepare a full replace of a live `VirtualService`.
///
/// Identity and the `resourceVersion` come from `actual`, so the write fails with a
/// conflict if the object changed since it was read. The whole spec is replaced.
#[must_use]
pub fn merge_virtual_service(desired: &VirtualService, actual: &VirtualService) -> VirtualService {
    let mut merged = actual.clone();
    merged.metadata.labels = merge_map(
        actual.metadata.labels.as_ref(),
        desired.metadata.labels.as_ref(),
    );
    merged.metadata.annotations = merge_map(
        actual.metadata.annotations.as_ref(),
        desired.metadata.annotations.as_ref(),
    );
    merged.spec = desired.spec.clone();
    merged
}

/// Prepare a full replace of a live `Service`.
///
/// Ports and selector are replaced wholesale; server-assigned fields such as `clusterIP`
/// are carried over from `actual` because they are immutable.
#[must_use]
pub fn merge_service(desired: &Service, actual: &Service) -> Service {
    let mut merged = actual.clone();
    merged.metadata.labels = merge_map(
        actual.metadata.labels.as_ref(),
        desired.metadata.labels.as_ref(),
    );

    let mut spec = actual.spec.clone().unwrap_or_default();
    let desired_spec = desired.spec.clone().unwrap_or_default();
    spec.ports = desired_spec.ports;
    spec.selector = desired_spec.selector;
    merged.spec = Some(spec);
    merged
}

#[cfg(test)]
#[path = "mesh_resources_tests.rs"]
mod mesh_resources_tests;
