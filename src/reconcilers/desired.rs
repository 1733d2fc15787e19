// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-state builder.
//!
//! Turns the complete set of observed [`Route`]s into the virtual hosts and backing services
//! that should exist. The computation is pure and recomputed from scratch on every pass, so a
//! missed watch event can never leave stale desired state behind.
//!
//! # Merge Rules
//!
//! - Routes are grouped by their exact `host` string; every host with at least one
//!   destination yields one [`VirtualHostTarget`]
//! - Destinations of a host are deduplicated by `(guid, port)`; the surviving weight is the
//!   maximum observed, an explicit weight beating an omitted one
//! - Every distinct `guid` yields one [`ServiceTarget`]. When a guid is declared with several
//!   ports the most recently observed one wins and a [`BuildWarning::PortConflict`] is raised
//!
//! "Most recently observed" is defined by processing routes sorted by
//! `(creationTimestamp, namespace, name)` and destinations in declaration order, which keeps
//! the result independent of the order routes were listed in.

use crate::constants::MAX_LABEL_LENGTH;
use crate::crd::{Route, RouteDestination};
use crate::errors::RouteValidationError;
use crate::labels::WORKLOAD_GUID_LABEL;
use crate::mesh_resources::service_name;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One routing rule of a virtual host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedDestination {
    pub guid: String,
    pub port: u16,
    pub weight: Option<u32>,
}

/// Desired routing object for one hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualHostTarget {
    pub host: String,
    /// Ordered by `(guid, port)`, no duplicates.
    pub destinations: Vec<WeightedDestination>,
}

/// Desired backing service for one workload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceTarget {
    pub guid: String,
    pub port: u16,
    pub selector: BTreeMap<String, String>,
}

/// Non-fatal data conflicts found while merging routes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildWarning {
    /// The same workload guid was declared with more than one port
    PortConflict {
        guid: String,
        kept_port: u16,
        discarded_ports: Vec<u16>,
    },
}

impl fmt::Display for BuildWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortConflict {
                guid,
                kept_port,
                discarded_ports,
            } => write!(
                f,
                "destination guid '{guid}' declared with conflicting ports; using {kept_port}, ignoring {discarded_ports:?}"
            ),
        }
    }
}

/// A route left out of this pass because it is malformed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteExclusion {
    /// `namespace/name` of the route
    pub route: String,
    pub reason: RouteValidationError,
}

/// Snapshot of everything that should exist, keyed by identity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DesiredState {
    /// Keyed by host
    pub virtual_hosts: BTreeMap<String, VirtualHostTarget>,
    /// Keyed by guid
    pub services: BTreeMap<String, ServiceTarget>,
    pub warnings: Vec<BuildWarning>,
    pub exclusions: Vec<RouteExclusion>,
}

/// Check a route for the fields every derived object depends on.
///
/// # Errors
///
/// Returns the first problem found: empty or whitespace-bearing host, empty guid, a guid
/// that cannot name a `Service`, or a port outside `1..=65535`.
pub fn validate_route(route: &Route) -> Result<(), RouteValidationError> {
    let host = &route.spec.host;
    if host.is_empty() {
        return Err(RouteValidationError::EmptyHost);
    }
    if host.chars().any(char::is_whitespace) {
        return Err(RouteValidationError::InvalidHost(host.clone()));
    }

    for (index, destination) in route.spec.destinations.iter().enumerate() {
        if destination.guid.trim().is_empty() {
            return Err(RouteValidationError::EmptyGuid { index });
        }
        if !is_valid_guid(&destination.guid) {
            return Err(RouteValidationError::InvalidGuid(destination.guid.clone()));
        }
        if u16::try_from(destination.port).map_or(true, |port| port == 0) {
            return Err(RouteValidationError::InvalidPort {
                guid: destination.guid.clone(),
                port: destination.port,
            });
        }
    }

    Ok(())
}

/// Whether `s-<guid>` is a DNS-1035 label and `guid` a valid label value.
fn is_valid_guid(guid: &str) -> bool {
    let alphanumeric = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();

    service_name(guid).len() <= MAX_LABEL_LENGTH
        && guid.chars().all(|c| alphanumeric(c) || c == '-')
        && guid.starts_with(alphanumeric)
        && guid.ends_with(alphanumeric)
}

/// Per-guid bookkeeping while walking routes in observation order.
struct GuidClaim {
    port: u16,
    selector: BTreeMap<String, String>,
    ports_seen: BTreeSet<u16>,
}

/// Build the desired state from the full set of observed routes.
///
/// Total and deterministic: malformed routes are reported in
/// [`DesiredState::exclusions`] rather than failing the build.
#[must_use]
pub fn build_desired_state(routes: &[Route]) -> DesiredState {
    let mut ordered: Vec<&Route> = routes.iter().collect();
    ordered.sort_by(|a, b| observation_key(a).cmp(&observation_key(b)));

    let mut exclusions = Vec::new();
    let mut hosts: BTreeMap<String, BTreeMap<(String, u16), Option<u32>>> = BTreeMap::new();
    let mut claims: BTreeMap<String, GuidClaim> = BTreeMap::new();

    for route in ordered {
        if let Err(reason) = validate_route(route) {
            exclusions.push(RouteExclusion {
                route: route.reference(),
                reason,
            });
            continue;
        }

        for destination in &route.spec.destinations {
            // validate_route guarantees the range
            let Ok(port) = u16::try_from(destination.port) else {
                continue;
            };

            let weights = hosts.entry(route.spec.host.clone()).or_default();
            let weight = weights
                .entry((destination.guid.clone(), port))
                .or_insert(destination.weight);
            *weight = (*weight).max(destination.weight);

            let selector = selector_for(destination);
            claims
                .entry(destination.guid.clone())
                .and_modify(|claim| {
                    claim.port = port;
                    claim.selector.clone_from(&selector);
                    claim.ports_seen.insert(port);
                })
                .or_insert_with(|| GuidClaim {
                    port,
                    selector: selector.clone(),
                    ports_seen: BTreeSet::from([port]),
                });
        }
    }

    let virtual_hosts = hosts
        .into_iter()
        .map(|(host, weights)| {
            let destinations = weights
                .into_iter()
                .map(|((guid, port), weight)| WeightedDestination { guid, port, weight })
                .collect();
            (host.clone(), VirtualHostTarget { host, destinations })
        })
        .collect();

    let mut warnings = Vec::new();
    let services = claims
        .into_iter()
        .map(|(guid, claim)| {
            if claim.ports_seen.len() > 1 {
                warnings.push(BuildWarning::PortConflict {
                    guid: guid.clone(),
                    kept_port: claim.port,
                    discarded_ports: claim
                        .ports_seen
                        .iter()
                        .copied()
                        .filter(|p| *p != claim.port)
                        .collect(),
                });
            }
            let target = ServiceTarget {
                guid: guid.clone(),
                port: claim.port,
                selector: claim.selector,
            };
            (guid, target)
        })
        .collect();

    DesiredState {
        virtual_hosts,
        services,
        warnings,
        exclusions,
    }
}

/// Sort key defining which route was observed most recently.
fn observation_key(
    route: &Route,
) -> (
    Option<&k8s_openapi::apimachinery::pkg::apis::meta::v1::Time>,
    Option<&str>,
    Option<&str>,
) {
    (
        route.metadata.creation_timestamp.as_ref(),
        route.metadata.namespace.as_deref(),
        route.metadata.name.as_deref(),
    )
}

/// Pod selector for a destination's backing service.
fn selector_for(destination: &RouteDestination) -> BTreeMap<String, String> {
    match &destination.selector {
        Some(selector) if !selector.match_labels.is_empty() => selector.match_labels.clone(),
        _ => BTreeMap::from([(WORKLOAD_GUID_LABEL.to_string(), destination.guid.clone())]),
    }
}

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
