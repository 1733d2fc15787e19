// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Object kinds managed by the controller.
//!
//! Virtual hosts and backing services flow through the same read/diff/write pipeline, so
//! both are carried as variants of one closed set rather than behind a trait object.

use crate::constants::{KIND_SERVICE, KIND_VIRTUAL_SERVICE};
use crate::istio::VirtualService;
use crate::labels::is_managed;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::fmt;

/// Kind of a managed object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ManagedKind {
    VirtualHost,
    Service,
}

impl ManagedKind {
    /// Kubernetes kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VirtualHost => KIND_VIRTUAL_SERVICE,
            Self::Service => KIND_SERVICE,
        }
    }
}

impl fmt::Display for ManagedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity key of a managed object: the host of a virtual host, the guid of a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectKey {
    Host(String),
    Guid(String),
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(host) => write!(f, "host={host}"),
            Self::Guid(guid) => write!(f, "guid={guid}"),
        }
    }
}

/// A virtual-host or service object as read from, or written to, the cluster.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    VirtualHost(VirtualService),
    Service(Service),
}

impl ManagedObject {
    #[must_use]
    pub fn kind(&self) -> ManagedKind {
        match self {
            Self::VirtualHost(_) => ManagedKind::VirtualHost,
            Self::Service(_) => ManagedKind::Service,
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::VirtualHost(vs) => vs.name_any(),
            Self::Service(svc) => svc.name_any(),
        }
    }

    /// Optimistic-concurrency token of the object as last read.
    #[must_use]
    pub fn resource_version(&self) -> Option<String> {
        match self {
            Self::VirtualHost(vs) => vs.resource_version(),
            Self::Service(svc) => svc.resource_version(),
        }
    }

    /// Whether the object bears the controller's ownership marker.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        match self {
            Self::VirtualHost(vs) => is_managed(vs.labels()),
            Self::Service(svc) => is_managed(svc.labels()),
        }
    }
}
