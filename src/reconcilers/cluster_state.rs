// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Cluster state reader.
//!
//! [`ClusterApi`] is the only door to the Kubernetes API. [`KubeCluster`] implements it on
//! top of `kube::Api`, bounding every call with a fixed timeout and classifying failures
//! into [`ClusterError`]. [`list_managed`] builds the actual-state snapshot the diff engine
//! compares against.
//!
//! # Ownership
//!
//! Objects are listed with the ownership label selector and then re-checked client side.
//! Name prefixes are never trusted: an object is managed only if it carries the marker.

use crate::constants::{KIND_ROUTE, KIND_SERVICE, KIND_VIRTUAL_SERVICE};
use crate::crd::Route;
use crate::errors::ClusterError;
use crate::istio::VirtualService;
use crate::labels::{ownership_selector, DESTINATION_GUID_LABEL, HOST_ANNOTATION};
use crate::mesh_resources::{service_name, virtual_service_name};
use crate::reconcilers::retry::{read_backoff, retry_transient};
use crate::reconcilers::types::{ManagedKind, ManagedObject};
use k8s_openapi::api::core::v1::Service;
use kube::api::{Api, DeleteParams, ListParams, PostParams, Preconditions};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Cluster API operations the reconciliation pipeline depends on.
///
/// All object operations are scoped to the controller's namespace.
#[async_trait::async_trait]
pub trait ClusterApi: Send + Sync {
    /// List every `Route`.
    async fn list_routes(&self) -> Result<Vec<Route>, ClusterError>;

    /// List objects of `kind` carrying the ownership label.
    async fn list_managed(&self, kind: ManagedKind) -> Result<Vec<ManagedObject>, ClusterError>;

    /// Read one object by name, `None` if absent.
    async fn get(&self, kind: ManagedKind, name: &str)
        -> Result<Option<ManagedObject>, ClusterError>;

    /// Create an object; fails with `AlreadyExists` if the name is taken.
    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError>;

    /// Replace an object; fails with `Conflict` if its `resourceVersion` is stale.
    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError>;

    /// Delete an object, guarded by `resource_version` when given.
    async fn delete(
        &self,
        kind: ManagedKind,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<(), ClusterError>;
}

/// [`ClusterApi`] backed by a live Kubernetes client.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    namespace: String,
    timeout: Duration,
}

impl KubeCluster {
    #[must_use]
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            timeout,
        }
    }

    fn routes(&self) -> Api<Route> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn virtual_services(&self) -> Api<VirtualService> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn services(&self) -> Api<Service> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Run one API call under the per-call timeout, classifying failures.
    async fn call<T, Fut>(
        &self,
        operation: &str,
        kind: &str,
        name: &str,
        fut: Fut,
    ) -> Result<T, ClusterError>
    where
        Fut: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(ClusterError::from_kube(&e, operation, kind, name)),
            Err(_) => Err(ClusterError::Timeout {
                operation: format!("{operation} {kind} {name}").trim_end().to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait::async_trait]
impl ClusterApi for KubeCluster {
    async fn list_routes(&self) -> Result<Vec<Route>, ClusterError> {
        let api = self.routes();
        let list = self
            .call("list", KIND_ROUTE, "", api.list(&ListParams::default()))
            .await?;
        Ok(list.items)
    }

    async fn list_managed(&self, kind: ManagedKind) -> Result<Vec<ManagedObject>, ClusterError> {
        let params = ListParams::default().labels(&ownership_selector());
        match kind {
            ManagedKind::VirtualHost => {
                let api = self.virtual_services();
                let list = self
                    .call("list", KIND_VIRTUAL_SERVICE, "", api.list(&params))
                    .await?;
                Ok(list.items.into_iter().map(ManagedObject::VirtualHost).collect())
            }
            ManagedKind::Service => {
                let api = self.services();
                let list = self.call("list", KIND_SERVICE, "", api.list(&params)).await?;
                Ok(list.items.into_iter().map(ManagedObject::Service).collect())
            }
        }
    }

    async fn get(
        &self,
        kind: ManagedKind,
        name: &str,
    ) -> Result<Option<ManagedObject>, ClusterError> {
        match kind {
            ManagedKind::VirtualHost => {
                let api = self.virtual_services();
                let found = self
                    .call("get", KIND_VIRTUAL_SERVICE, name, api.get_opt(name))
                    .await?;
                Ok(found.map(ManagedObject::VirtualHost))
            }
            ManagedKind::Service => {
                let api = self.services();
                let found = self.call("get", KIND_SERVICE, name, api.get_opt(name)).await?;
                Ok(found.map(ManagedObject::Service))
            }
        }
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError> {
        let name = object.name();
        let params = PostParams::default();
        match object {
            ManagedObject::VirtualHost(vs) => {
                let api = self.virtual_services();
                let created = self
                    .call("create", KIND_VIRTUAL_SERVICE, &name, api.create(&params, vs))
                    .await?;
                Ok(ManagedObject::VirtualHost(created))
            }
            ManagedObject::Service(svc) => {
                let api = self.services();
                let created = self
                    .call("create", KIND_SERVICE, &name, api.create(&params, svc))
                    .await?;
                Ok(ManagedObject::Service(created))
            }
        }
    }

    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError> {
        let name = object.name();
        let params = PostParams::default();
        match object {
            ManagedObject::VirtualHost(vs) => {
                let api = self.virtual_services();
                let replaced = self
                    .call(
                        "replace",
                        KIND_VIRTUAL_SERVICE,
                        &name,
                        api.replace(&name, &params, vs),
                    )
                    .await?;
                Ok(ManagedObject::VirtualHost(replaced))
            }
            ManagedObject::Service(svc) => {
                let api = self.services();
                let replaced = self
                    .call("replace", KIND_SERVICE, &name, api.replace(&name, &params, svc))
                    .await?;
                Ok(ManagedObject::Service(replaced))
            }
        }
    }

    async fn delete(
        &self,
        kind: ManagedKind,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<(), ClusterError> {
        let params = delete_params(resource_version);
        match kind {
            ManagedKind::VirtualHost => {
                let api = self.virtual_services();
                self.call("delete", KIND_VIRTUAL_SERVICE, name, api.delete(name, &params))
                    .await?;
            }
            ManagedKind::Service => {
                let api = self.services();
                self.call("delete", KIND_SERVICE, name, api.delete(name, &params))
                    .await?;
            }
        }
        Ok(())
    }
}

/// Delete parameters guarded by `resource_version` when given.
pub(crate) fn delete_params(resource_version: Option<&str>) -> DeleteParams {
    DeleteParams {
        preconditions: resource_version.map(|rv| Preconditions {
            resource_version: Some(rv.to_string()),
            uid: None,
        }),
        ..DeleteParams::default()
    }
}

/// Snapshot of the managed objects currently in the cluster.
#[derive(Clone, Debug, Default)]
pub struct ActualState {
    /// Managed virtual services keyed by host
    pub virtual_hosts: BTreeMap<String, ManagedObject>,
    /// Managed services keyed by destination guid
    pub services: BTreeMap<String, ManagedObject>,
    /// Managed objects no key can own: unreadable key, or a name that is not the
    /// canonical one for their key. Always scheduled for deletion.
    pub strays: Vec<ManagedObject>,
}

impl ActualState {
    /// Index managed objects by identity key.
    ///
    /// Objects without the ownership marker are dropped here even if the server-side
    /// selector let them through.
    #[must_use]
    pub fn from_objects(objects: Vec<ManagedObject>) -> Self {
        let mut state = Self::default();

        for object in objects {
            if !object.is_managed() {
                debug!(
                    kind = %object.kind(),
                    name = %object.name(),
                    "Ignoring object without ownership marker"
                );
                continue;
            }

            match identity_key(&object) {
                Some(key) => {
                    let index = match object.kind() {
                        ManagedKind::VirtualHost => &mut state.virtual_hosts,
                        ManagedKind::Service => &mut state.services,
                    };
                    index.insert(key, object);
                }
                None => {
                    warn!(
                        kind = %object.kind(),
                        name = %object.name(),
                        "Managed object has no canonical identity, scheduling removal"
                    );
                    state.strays.push(object);
                }
            }
        }

        state
    }

    /// Total number of managed objects observed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.virtual_hosts.len() + self.services.len() + self.strays.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Identity key of a managed object, `None` if missing or if the object's name is not the
/// canonical name for that key.
fn identity_key(object: &ManagedObject) -> Option<String> {
    match object {
        ManagedObject::VirtualHost(vs) => {
            let host = vs
                .annotations()
                .get(HOST_ANNOTATION)
                .cloned()
                .or_else(|| match vs.spec.hosts.as_slice() {
                    [only] => Some(only.clone()),
                    _ => None,
                })?;
            (vs.name_any() == virtual_service_name(&host)).then_some(host)
        }
        ManagedObject::Service(svc) => {
            let guid = svc.labels().get(DESTINATION_GUID_LABEL).cloned()?;
            (svc.name_any() == service_name(&guid)).then_some(guid)
        }
    }
}

/// Read the managed-object snapshot, retrying transient list failures within `budget`.
///
/// # Errors
///
/// Returns the list error once retries are exhausted. No partial snapshot is ever
/// returned, so a failed read can never lead to deletions.
pub async fn list_managed(
    cluster: &dyn ClusterApi,
    budget: Duration,
) -> Result<ActualState, ClusterError> {
    let mut objects = retry_transient(
        || cluster.list_managed(ManagedKind::VirtualHost),
        "list managed VirtualServices",
        read_backoff(budget),
    )
    .await?;

    let services = retry_transient(
        || cluster.list_managed(ManagedKind::Service),
        "list managed Services",
        read_backoff(budget),
    )
    .await?;
    objects.extend(services);

    Ok(ActualState::from_objects(objects))
}

/// Read every `Route`, retrying transient failures within `budget`.
///
/// # Errors
///
/// Returns the list error once retries are exhausted.
pub async fn list_routes(
    cluster: &dyn ClusterApi,
    budget: Duration,
) -> Result<Vec<Route>, ClusterError> {
    retry_transient(|| cluster.list_routes(), "list Routes", read_backoff(budget)).await
}

#[cfg(test)]
#[path = "cluster_state_tests.rs"]
mod cluster_state_tests;
