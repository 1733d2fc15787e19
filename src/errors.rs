// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the route controller.
//!
//! - [`ClusterError`] - failures talking to the Kubernetes API, classified once so callers
//!   can decide between retrying, re-reading on conflict, or giving up
//! - [`RouteValidationError`] - reasons a `Route` is excluded from a reconciliation pass
//! - [`PassError`] - failures that abort a whole reconciliation pass

use thiserror::Error;

/// Errors returned by the cluster API seam.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// Optimistic-concurrency conflict: the object changed since it was read (HTTP 409)
    #[error("Conflicting write to {kind} '{name}': {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    /// Create raced with another writer that created the same name (HTTP 409 `AlreadyExists`)
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// Object vanished between read and write (HTTP 404)
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// The per-call timeout elapsed before the API server answered
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    /// Rate limiting, server errors, connection failures
    #[error("Transient API failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// Credentials rejected (HTTP 401/403)
    #[error("Unauthorized during {operation}: {message}")]
    Unauthorized { operation: String, message: String },

    /// Any other API failure; not retried within a pass
    #[error("API error during {operation} (HTTP {code}): {message}")]
    Api {
        operation: String,
        code: u16,
        message: String,
    },
}

impl ClusterError {
    /// Whether the failure is expected to clear on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. }
                | Self::AlreadyExists { .. }
                | Self::Timeout { .. }
                | Self::Transient { .. }
        )
    }

    /// Whether the failure should be answered by re-reading the object and retrying the write.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::AlreadyExists { .. })
    }

    /// Classify a `kube::Error` raised while performing `operation` on `kind`/`name`.
    #[must_use]
    pub fn from_kube(err: &kube::Error, operation: &str, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(status) => Self::from_api_status(
                status.code,
                &status.reason,
                &status.message,
                operation,
                kind,
                name,
            ),
            kube::Error::Service(e) => Self::Transient {
                operation: operation.to_string(),
                message: e.to_string(),
            },
            other => Self::Api {
                operation: operation.to_string(),
                code: 0,
                message: other.to_string(),
            },
        }
    }

    /// Classify an API server error status by HTTP code and reason.
    #[must_use]
    pub fn from_api_status(
        code: u16,
        reason: &str,
        message: &str,
        operation: &str,
        kind: &str,
        name: &str,
    ) -> Self {
        match code {
            409 if reason == "AlreadyExists" => Self::AlreadyExists {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            409 => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: message.to_string(),
            },
            404 => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            401 | 403 => Self::Unauthorized {
                operation: operation.to_string(),
                message: message.to_string(),
            },
            429 | 500..=599 => Self::Transient {
                operation: operation.to_string(),
                message: message.to_string(),
            },
            code => Self::Api {
                operation: operation.to_string(),
                code,
                message: message.to_string(),
            },
        }
    }
}

/// Reasons a `Route` is excluded from desired-state computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteValidationError {
    #[error("host is empty")]
    EmptyHost,

    #[error("host '{0}' contains whitespace")]
    InvalidHost(String),

    #[error("destination #{index} has an empty guid")]
    EmptyGuid { index: usize },

    /// The guid cannot form a valid `Service` name and label value
    #[error("destination guid '{0}' must be lowercase alphanumerics or '-', start and end alphanumeric, and fit a 63-character service name")]
    InvalidGuid(String),

    #[error("destination '{guid}' has port {port} outside 1..=65535")]
    InvalidPort { guid: String, port: i32 },
}

/// Failures that abort a reconciliation pass before any write is issued.
#[derive(Error, Debug, Clone)]
pub enum PassError {
    /// The full Route set could not be read
    #[error("Failed to list Routes: {0}")]
    ListRoutes(#[source] ClusterError),

    /// The managed-object set could not be read; nothing may be deleted on a partial view
    #[error("Failed to list managed objects: {0}")]
    ListManaged(#[source] ClusterError),
}

impl PassError {
    /// The underlying cluster failure.
    #[must_use]
    pub fn cluster_error(&self) -> &ClusterError {
        match self {
            Self::ListRoutes(e) | Self::ListManaged(e) => e,
        }
    }

    /// Whether the controller's credentials were rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.cluster_error(), ClusterError::Unauthorized { .. })
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
