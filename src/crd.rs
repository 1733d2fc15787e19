// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definition for the `Route` input resource.
//!
//! A [`Route`] binds one fully-qualified hostname to a list of workload destinations.
//! Routes are owned by upstream API clients; the controller only ever reads them.
//!
//! # Example: Declaring a Route
//!
//! ```rust,no_run
//! use routecontroller::crd::{RouteDestination, RouteSpec};
//!
//! let spec = RouteSpec {
//!     host: "hostname.apps.example.com".to_string(),
//!     destinations: vec![RouteDestination {
//!         guid: "destination-guid-1".to_string(),
//!         port: 8080,
//!         weight: None,
//!         selector: None,
//!     }],
//! };
//! ```

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Route specification.
///
/// # Example YAML
///
/// ```yaml
/// apiVersion: networking.cloudfoundry.org/v1alpha1
/// kind: Route
/// metadata:
///   name: cc-route-guid
///   namespace: cf-workloads
/// spec:
///   host: hostname.apps.example.com
///   destinations:
///     - guid: destination-guid-1
///       port: 8080
///       weight: 80
///     - guid: destination-guid-2
///       port: 9000
///       weight: 20
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "networking.cloudfoundry.org",
    version = "v1alpha1",
    kind = "Route",
    namespaced,
    doc = "Route maps a fully-qualified hostname to a set of workload destinations. Routes sharing a host are merged into a single virtual host; every destination workload gets one backing Service."
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Fully-qualified hostname served by this route (e.g. `myapp.apps.example.com`).
    pub host: String,

    /// Workloads receiving traffic for `host`. An empty list is valid and routes nothing.
    #[serde(default)]
    pub destinations: Vec<RouteDestination>,
}

/// One workload receiving traffic for a route.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RouteDestination {
    /// Stable identifier of the destination workload.
    pub guid: String,

    /// Port the workload listens on. Must be in `1..=65535`.
    pub port: i32,

    /// Relative traffic weight. Destinations without a weight share traffic equally.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,

    /// Pod selector for the backing Service. Defaults to the workload-guid label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<DestinationSelector>,
}

/// Label selector choosing the pods behind a destination.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSelector {
    /// Exact-match pod labels.
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

impl Route {
    /// `namespace/name` identifier used in logs and exclusion reports.
    #[must_use]
    pub fn reference(&self) -> String {
        format!(
            "{}/{}",
            self.namespace().unwrap_or_default(),
            self.name_any()
        )
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
