// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Label and annotation constants stamped on every object the controller manages.
//!
//! The ownership marker ([`K8S_MANAGED_BY`] = [`MANAGED_BY_ROUTE_CONTROLLER`]) is the only
//! signal used to decide whether an object belongs to the controller. These values are part
//! of the controller's external contract and must stay stable across versions.

use std::collections::BTreeMap;

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Value for `app.kubernetes.io/managed-by` on every controller-owned object
pub const MANAGED_BY_ROUTE_CONTROLLER: &str = "routecontroller";

/// Component value for virtual-host routing objects
pub const COMPONENT_VIRTUAL_HOST: &str = "virtual-host";

/// Component value for backing services
pub const COMPONENT_BACKING_SERVICE: &str = "backing-service";

// ============================================================================
// Controller-Specific Labels and Annotations
// ============================================================================

/// Label on backing `Service`s carrying the destination guid they were derived from
pub const DESTINATION_GUID_LABEL: &str = "routecontroller.cloudfoundry.org/destination-guid";

/// Annotation on `VirtualService`s carrying the host they were derived from
pub const HOST_ANNOTATION: &str = "routecontroller.cloudfoundry.org/host";

/// Default pod label selected by a backing `Service` when the destination declares no selector
pub const WORKLOAD_GUID_LABEL: &str = "routecontroller.cloudfoundry.org/workload-guid";

/// Label selector string matching every controller-owned object.
#[must_use]
pub fn ownership_selector() -> String {
    format!("{K8S_MANAGED_BY}={MANAGED_BY_ROUTE_CONTROLLER}")
}

/// Whether the given label map carries the ownership marker.
#[must_use]
pub fn is_managed(labels: &BTreeMap<String, String>) -> bool {
    labels
        .get(K8S_MANAGED_BY)
        .is_some_and(|value| value == MANAGED_BY_ROUTE_CONTROLLER)
}

/// Base label set for a managed object of the given component.
#[must_use]
pub fn managed_labels(component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_ROUTE_CONTROLLER.to_string(),
        ),
        (K8S_COMPONENT.to_string(), component.to_string()),
    ])
}

#[cfg(test)]
#[path = "labels_tests.rs"]
mod labels_tests;
