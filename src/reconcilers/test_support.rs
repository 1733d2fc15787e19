// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared fixtures for reconciler tests: route builders and an in-memory cluster.

use crate::crd::{Route, RouteDestination, RouteSpec};
use crate::errors::ClusterError;
use crate::reconcilers::cluster_state::ClusterApi;
use crate::reconcilers::types::{ManagedKind, ManagedObject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

pub const TEST_NAMESPACE: &str = "default";

pub fn route(name: &str, host: &str, destinations: Vec<RouteDestination>) -> Route {
    let mut route = Route::new(
        name,
        RouteSpec {
            host: host.to_string(),
            destinations,
        },
    );
    route.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    route
}

pub fn route_created_at(
    name: &str,
    host: &str,
    destinations: Vec<RouteDestination>,
    timestamp: &str,
) -> Route {
    let mut route = route(name, host, destinations);
    let created: Time =
        serde_json::from_value(serde_json::json!(timestamp)).expect("valid RFC 3339 timestamp");
    route.metadata.creation_timestamp = Some(created);
    route
}

pub fn destination(guid: &str, port: i32) -> RouteDestination {
    RouteDestination {
        guid: guid.to_string(),
        port,
        weight: None,
        selector: None,
    }
}

pub fn weighted_destination(guid: &str, port: i32, weight: u32) -> RouteDestination {
    RouteDestination {
        weight: Some(weight),
        ..destination(guid, port)
    }
}

/// Cluster call kinds, used for failure injection and the write log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum FakeOp {
    ListRoutes,
    ListManaged,
    Get,
    Create,
    Replace,
    Delete,
}

#[derive(Default)]
struct FakeState {
    routes: Vec<Route>,
    objects: BTreeMap<(ManagedKind, String), ManagedObject>,
    next_resource_version: u64,
    failures: BTreeMap<FakeOp, VecDeque<ClusterError>>,
    writes: Vec<(FakeOp, ManagedKind, String)>,
    calls: BTreeMap<FakeOp, usize>,
}

impl FakeState {
    fn bump(&mut self) -> String {
        self.next_resource_version += 1;
        self.next_resource_version.to_string()
    }

    fn record(&mut self, op: FakeOp) -> Result<(), ClusterError> {
        *self.calls.entry(op).or_default() += 1;
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn set_resource_version(object: &mut ManagedObject, rv: String) {
    match object {
        ManagedObject::VirtualHost(vs) => vs.metadata.resource_version = Some(rv),
        ManagedObject::Service(svc) => svc.metadata.resource_version = Some(rv),
    }
}

/// In-memory [`ClusterApi`] that enforces `resourceVersion` preconditions the way the API
/// server does.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes(routes: Vec<Route>) -> Self {
        let cluster = Self::new();
        cluster.set_routes(routes);
        cluster
    }

    pub fn set_routes(&self, routes: Vec<Route>) {
        self.state.lock().unwrap().routes = routes;
    }

    /// Store an object as if another client had created it.
    pub fn insert(&self, mut object: ManagedObject) {
        let mut state = self.state.lock().unwrap();
        let rv = state.bump();
        set_resource_version(&mut object, rv);
        state.objects.insert((object.kind(), object.name()), object);
    }

    /// Change an object's `resourceVersion` as a concurrent writer would.
    pub fn touch(&self, kind: ManagedKind, name: &str) {
        let mut state = self.state.lock().unwrap();
        let rv = state.bump();
        if let Some(object) = state.objects.get_mut(&(kind, name.to_string())) {
            set_resource_version(object, rv);
        }
    }

    /// Remove an object behind the controller's back.
    pub fn remove(&self, kind: ManagedKind, name: &str) {
        self.state
            .lock()
            .unwrap()
            .objects
            .remove(&(kind, name.to_string()));
    }

    /// Fail the next call of `op` with `err`. Injected failures queue up in order.
    pub fn fail_next(&self, op: FakeOp, err: ClusterError) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(op)
            .or_default()
            .push_back(err);
    }

    pub fn object(&self, kind: ManagedKind, name: &str) -> Option<ManagedObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(kind, name.to_string()))
            .cloned()
    }

    pub fn names(&self, kind: ManagedKind) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Successful writes, in order.
    pub fn writes(&self) -> Vec<(FakeOp, ManagedKind, String)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state.lock().unwrap().writes.clear();
    }

    /// Number of calls of `op`, including failed ones.
    pub fn calls(&self, op: FakeOp) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&op)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ClusterApi for FakeCluster {
    async fn list_routes(&self) -> Result<Vec<Route>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::ListRoutes)?;
        Ok(state.routes.clone())
    }

    async fn list_managed(&self, kind: ManagedKind) -> Result<Vec<ManagedObject>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::ListManaged)?;
        Ok(state
            .objects
            .iter()
            .filter(|((k, _), object)| *k == kind && object.is_managed())
            .map(|(_, object)| object.clone())
            .collect())
    }

    async fn get(
        &self,
        kind: ManagedKind,
        name: &str,
    ) -> Result<Option<ManagedObject>, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::Get)?;
        Ok(state.objects.get(&(kind, name.to_string())).cloned())
    }

    async fn create(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::Create)?;

        let key = (object.kind(), object.name());
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: key.0.to_string(),
                name: key.1,
            });
        }

        let mut stored = object.clone();
        let rv = state.bump();
        set_resource_version(&mut stored, rv);
        state.objects.insert(key.clone(), stored.clone());
        state.writes.push((FakeOp::Create, key.0, key.1));
        Ok(stored)
    }

    async fn replace(&self, object: &ManagedObject) -> Result<ManagedObject, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::Replace)?;

        let key = (object.kind(), object.name());
        let Some(current) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound {
                kind: key.0.to_string(),
                name: key.1,
            });
        };
        if current.resource_version() != object.resource_version() {
            return Err(ClusterError::Conflict {
                kind: key.0.to_string(),
                name: key.1,
                message: "the object has been modified".to_string(),
            });
        }

        let mut stored = object.clone();
        let rv = state.bump();
        set_resource_version(&mut stored, rv);
        state.objects.insert(key.clone(), stored.clone());
        state.writes.push((FakeOp::Replace, key.0, key.1));
        Ok(stored)
    }

    async fn delete(
        &self,
        kind: ManagedKind,
        name: &str,
        resource_version: Option<&str>,
    ) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.record(FakeOp::Delete)?;

        let key = (kind, name.to_string());
        let Some(current) = state.objects.get(&key) else {
            return Err(ClusterError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            });
        };
        if let Some(expected) = resource_version {
            if current.resource_version().as_deref() != Some(expected) {
                return Err(ClusterError::Conflict {
                    kind: kind.to_string(),
                    name: name.to_string(),
                    message: "precondition failed: resourceVersion".to_string(),
                });
            }
        }

        state.objects.remove(&key);
        state.writes.push((FakeOp::Delete, kind, name.to_string()));
        Ok(())
    }
}
