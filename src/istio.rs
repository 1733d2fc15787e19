// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed subset of the Istio `VirtualService` kind.
//!
//! Only the fields the controller renders are modelled. Unknown fields are ignored when
//! reading, so a replace of a managed object drops anything outside this subset.
//! The CRD itself is installed by Istio, so no schema is generated here.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// `VirtualService` specification (`networking.istio.io/v1alpha3`).
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[kube(
    group = "networking.istio.io",
    version = "v1alpha3",
    kind = "VirtualService",
    namespaced,
    derive = "PartialEq",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualServiceSpec {
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gateways: Vec<String>,

    #[serde(default)]
    pub http: Vec<HttpRoute>,
}

/// One HTTP routing rule.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpRoute {
    #[serde(default)]
    pub route: Vec<HttpRouteDestination>,
}

/// Weighted destination of an HTTP routing rule.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpRouteDestination {
    pub destination: Destination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// Service host and port traffic is forwarded to.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Destination {
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSelector>,
}

/// Port of a destination service.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortSelector {
    pub number: u32,
}
