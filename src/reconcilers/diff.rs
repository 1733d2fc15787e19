// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Diff engine.
//!
//! Compares the desired state against the managed objects read from the cluster and plans
//! the minimal set of creates, updates and deletes. Only the fields the controller owns are
//! compared, so server-populated fields (`clusterIP`, `resourceVersion`, status, foreign
//! labels) never cause an update.
//!
//! Within a plan, backing services are created before the virtual hosts that point at
//! them, and virtual hosts are deleted before their services.

use crate::constants::SERVICE_PORT_PROTOCOL;
use crate::mesh_resources::{build_service, build_virtual_service};
use crate::reconcilers::cluster_state::ActualState;
use crate::reconcilers::desired::DesiredState;
use crate::reconcilers::types::{ManagedKind, ManagedObject, ObjectKey};
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::fmt;

/// What to do to one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One planned write.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedAction {
    pub action: ActionKind,
    pub kind: ManagedKind,
    /// Identity key, `None` for strays
    pub key: Option<ObjectKey>,
    pub name: String,
    /// Rendered object; set for creates and updates
    pub desired: Option<ManagedObject>,
    /// Object as last read; set for updates and deletes
    pub actual: Option<ManagedObject>,
}

/// Minimal change set turning actual state into desired state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcilePlan {
    pub creates: Vec<PlannedAction>,
    pub updates: Vec<PlannedAction>,
    pub deletes: Vec<PlannedAction>,
    /// Desired objects already matching the cluster
    pub unchanged: usize,
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Actions in execution order: creates, then updates, then deletes.
    pub fn actions(&self) -> impl Iterator<Item = &PlannedAction> {
        self.creates
            .iter()
            .chain(self.updates.iter())
            .chain(self.deletes.iter())
    }
}

/// Compare desired and actual state.
///
/// # Arguments
///
/// * `desired` - Output of the desired-state builder
/// * `actual` - Managed objects currently in the cluster
/// * `namespace` - Namespace rendered objects are written to
/// * `gateways` - Istio gateways bound by every virtual host
#[must_use]
pub fn plan(
    desired: &DesiredState,
    actual: &ActualState,
    namespace: &str,
    gateways: &[String],
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();

    let services: BTreeMap<String, ManagedObject> = desired
        .services
        .iter()
        .map(|(guid, target)| {
            (
                guid.clone(),
                ManagedObject::Service(build_service(target, namespace)),
            )
        })
        .collect();
    let virtual_hosts: BTreeMap<String, ManagedObject> = desired
        .virtual_hosts
        .iter()
        .map(|(host, target)| {
            (
                host.clone(),
                ManagedObject::VirtualHost(build_virtual_service(target, namespace, gateways)),
            )
        })
        .collect();

    // A stray holding a desired object's name is taken over by an update instead of
    // being deleted after it.
    let mut live_services = actual.services.clone();
    let mut live_virtual_hosts = actual.virtual_hosts.clone();
    let mut strays = Vec::new();
    for stray in &actual.strays {
        let (rendered, live) = match stray.kind() {
            ManagedKind::Service => (&services, &mut live_services),
            ManagedKind::VirtualHost => (&virtual_hosts, &mut live_virtual_hosts),
        };
        let claimed = rendered
            .iter()
            .find(|(key, object)| object.name() == stray.name() && !live.contains_key(*key))
            .map(|(key, _)| key.clone());
        match claimed {
            Some(key) => {
                live.insert(key, stray.clone());
            }
            None => strays.push(stray),
        }
    }

    plan_kind(&mut plan, &services, &live_services, ObjectKey::Guid);
    plan_kind(&mut plan, &virtual_hosts, &live_virtual_hosts, ObjectKey::Host);

    // Deletes were appended services first; virtual hosts must go first.
    plan.deletes.sort_by_key(|action| match action.kind {
        ManagedKind::VirtualHost => 0,
        ManagedKind::Service => 1,
    });

    for stray in strays {
        plan.deletes.push(PlannedAction {
            action: ActionKind::Delete,
            kind: stray.kind(),
            key: None,
            name: stray.name(),
            desired: None,
            actual: Some(stray.clone()),
        });
    }

    plan
}

fn plan_kind(
    plan: &mut ReconcilePlan,
    desired: &BTreeMap<String, ManagedObject>,
    actual: &BTreeMap<String, ManagedObject>,
    key_of: fn(String) -> ObjectKey,
) {
    for (key, rendered) in desired {
        match actual.get(key) {
            None => plan.creates.push(PlannedAction {
                action: ActionKind::Create,
                kind: rendered.kind(),
                key: Some(key_of(key.clone())),
                name: rendered.name(),
                desired: Some(rendered.clone()),
                actual: None,
            }),
            Some(live) if needs_update(rendered, live) => plan.updates.push(PlannedAction {
                action: ActionKind::Update,
                kind: rendered.kind(),
                key: Some(key_of(key.clone())),
                name: rendered.name(),
                desired: Some(rendered.clone()),
                actual: Some(live.clone()),
            }),
            Some(_) => plan.unchanged += 1,
        }
    }

    for (key, live) in actual {
        if !desired.contains_key(key) {
            plan.deletes.push(PlannedAction {
                action: ActionKind::Delete,
                kind: live.kind(),
                key: Some(key_of(key.clone())),
                name: live.name(),
                desired: None,
                actual: Some(live.clone()),
            });
        }
    }
}

/// Whether the controller-owned content of `actual` differs from `desired`.
#[must_use]
pub fn needs_update(desired: &ManagedObject, actual: &ManagedObject) -> bool {
    match (desired, actual) {
        (ManagedObject::VirtualHost(want), ManagedObject::VirtualHost(have)) => {
            want.spec != have.spec
                || !owns_metadata(
                    want.metadata.labels.as_ref(),
                    have.metadata.labels.as_ref(),
                )
                || !owns_metadata(
                    want.metadata.annotations.as_ref(),
                    have.metadata.annotations.as_ref(),
                )
        }
        (ManagedObject::Service(want), ManagedObject::Service(have)) => {
            ServiceContent::of(want) != ServiceContent::of(have)
                || !owns_metadata(
                    want.metadata.labels.as_ref(),
                    have.metadata.labels.as_ref(),
                )
        }
        _ => true,
    }
}

/// Every key the controller sets must be present with the same value; extra keys are
/// someone else's.
fn owns_metadata(
    desired: Option<&BTreeMap<String, String>>,
    actual: Option<&BTreeMap<String, String>>,
) -> bool {
    let Some(desired) = desired else {
        return true;
    };
    desired
        .iter()
        .all(|(k, v)| actual.and_then(|a| a.get(k)) == Some(v))
}

/// The parts of a `Service` spec the controller owns.
#[derive(Debug, PartialEq)]
struct ServiceContent {
    ports: Vec<PortContent>,
    selector: BTreeMap<String, String>,
}

#[derive(Debug, PartialEq)]
struct PortContent {
    name: Option<String>,
    port: i32,
    target_port: String,
    protocol: String,
}

impl ServiceContent {
    fn of(svc: &Service) -> Self {
        let spec = svc.spec.as_ref();
        Self {
            ports: spec
                .and_then(|s| s.ports.as_ref())
                .map(|ports| ports.iter().map(PortContent::of).collect())
                .unwrap_or_default(),
            selector: spec
                .and_then(|s| s.selector.clone())
                .unwrap_or_default(),
        }
    }
}

impl PortContent {
    fn of(port: &ServicePort) -> Self {
        Self {
            name: port.name.clone(),
            port: port.port,
            // An omitted targetPort defaults to port on the server
            target_port: match &port.target_port {
                Some(IntOrString::Int(n)) => n.to_string(),
                Some(IntOrString::String(s)) => s.clone(),
                None => port.port.to_string(),
            },
            protocol: port
                .protocol
                .clone()
                .unwrap_or_else(|| SERVICE_PORT_PROTOCOL.to_string()),
        }
    }
}

#[cfg(test)]
#[path = "diff_tests.rs"]
mod diff_tests;
