// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation engine.
//!
//! Applies a [`ReconcilePlan`] to the cluster. Each object is converged independently: a
//! failure on one object is recorded and the remaining actions still run.
//!
//! # Concurrency
//!
//! Every update and delete carries the `resourceVersion` the object was read at. When a
//! write loses a race (`409 Conflict`, `AlreadyExists`, or the object vanished) the object
//! is re-read and the write retried against the fresh copy, at most
//! [`MAX_CONFLICT_RETRIES`] times. A re-read that finds an object without the ownership
//! marker stops the write: the controller never overwrites or deletes what it does not own.

use crate::constants::MAX_CONFLICT_RETRIES;
use crate::errors::ClusterError;
use crate::mesh_resources::{merge_service, merge_virtual_service};
use crate::metrics;
use crate::reconcilers::cluster_state::{ActualState, ClusterApi};
use crate::reconcilers::desired::DesiredState;
use crate::reconcilers::diff::{needs_update, plan, ActionKind, PlannedAction, ReconcilePlan};
use crate::reconcilers::types::{ManagedKind, ManagedObject};
use std::fmt;
use tracing::{debug, info, warn};

/// Why converging one object failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// Lost the optimistic-concurrency race on every attempt
    ConflictRetriesExhausted,
    /// An object without the ownership marker holds the name
    UnmanagedCollision,
    /// Any other API failure
    Api(ClusterError),
}

impl FailureReason {
    /// Short label for metrics.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::ConflictRetriesExhausted => "conflict",
            Self::UnmanagedCollision => "unmanaged_collision",
            Self::Api(ClusterError::Timeout { .. }) => "timeout",
            Self::Api(ClusterError::Unauthorized { .. }) => "unauthorized",
            Self::Api(ClusterError::Transient { .. }) => "transient",
            Self::Api(_) => "api",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConflictRetriesExhausted => write!(
                f,
                "still conflicting after {MAX_CONFLICT_RETRIES} re-reads"
            ),
            Self::UnmanagedCollision => {
                f.write_str("name is held by an object this controller does not manage")
            }
            Self::Api(e) => write!(f, "{e}"),
        }
    }
}

/// A managed object that could not be converged in this pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectFailure {
    pub kind: ManagedKind,
    pub name: String,
    pub action: ActionKind,
    pub reason: FailureReason,
}

/// What happened to one object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Deleted,
    /// Already converged when re-read, or no longer ours
    Unchanged,
}

/// Counts of the writes a pass performed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub failures: Vec<ObjectFailure>,
}

impl ReconcileResult {
    /// Whether every planned action succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.created + self.updated + self.deleted
    }
}

/// Plan the changes turning `actual` into `desired` and apply them.
///
/// # Arguments
///
/// * `cluster` - Cluster API writes go through
/// * `desired` - Output of the desired-state builder
/// * `actual` - Managed objects as read at the start of the pass
/// * `namespace` - Namespace rendered objects are written to
/// * `gateways` - Istio gateways bound by every virtual host
pub async fn reconcile(
    cluster: &dyn ClusterApi,
    desired: &DesiredState,
    actual: &ActualState,
    namespace: &str,
    gateways: &[String],
) -> ReconcileResult {
    apply_plan(cluster, &plan(desired, actual, namespace, gateways)).await
}

/// Apply every action of `plan`, creates and updates before deletes.
pub async fn apply_plan(cluster: &dyn ClusterApi, plan: &ReconcilePlan) -> ReconcileResult {
    let mut result = ReconcileResult {
        unchanged: plan.unchanged,
        ..ReconcileResult::default()
    };

    for action in plan.actions() {
        match converge(cluster, action).await {
            Ok(outcome) => {
                let kind = action.kind.as_str();
                match outcome {
                    Outcome::Created => {
                        info!(kind, name = %action.name, "Created managed object");
                        metrics::record_resource_created(kind);
                        result.created += 1;
                    }
                    Outcome::Updated => {
                        info!(kind, name = %action.name, "Updated managed object");
                        metrics::record_resource_updated(kind);
                        result.updated += 1;
                    }
                    Outcome::Deleted => {
                        info!(kind, name = %action.name, "Deleted managed object");
                        metrics::record_resource_deleted(kind);
                        result.deleted += 1;
                    }
                    Outcome::Unchanged => {
                        debug!(kind, name = %action.name, "Object already converged");
                        result.unchanged += 1;
                    }
                }
            }
            Err(reason) => {
                warn!(
                    kind = %action.kind,
                    name = %action.name,
                    action = %action.action,
                    reason = %reason,
                    "Failed to converge managed object"
                );
                metrics::record_error(action.kind.as_str(), reason.as_label());
                result.failures.push(ObjectFailure {
                    kind: action.kind,
                    name: action.name.clone(),
                    action: action.action,
                    reason,
                });
            }
        }
    }

    result
}

/// Drive one object to its desired content (or absence).
async fn converge(
    cluster: &dyn ClusterApi,
    action: &PlannedAction,
) -> Result<Outcome, FailureReason> {
    let desired = action.desired.as_ref();
    let mut live = action.actual.clone();
    let mut rereads = 0;

    loop {
        let attempt = match (desired, live.as_ref()) {
            (Some(want), None) => cluster.create(want).await.map(|_| Outcome::Created),
            (Some(want), Some(have)) => {
                if !have.is_managed() {
                    return Err(FailureReason::UnmanagedCollision);
                }
                if !needs_update(want, have) {
                    return Ok(Outcome::Unchanged);
                }
                cluster
                    .replace(&merge_onto(want, have))
                    .await
                    .map(|_| Outcome::Updated)
            }
            (None, Some(have)) => {
                if !have.is_managed() {
                    return Ok(Outcome::Unchanged);
                }
                match cluster
                    .delete(action.kind, &action.name, have.resource_version().as_deref())
                    .await
                {
                    Ok(()) | Err(ClusterError::NotFound { .. }) => Ok(Outcome::Deleted),
                    Err(e) => Err(e),
                }
            }
            (None, None) => return Ok(Outcome::Unchanged),
        };

        match attempt {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_conflict() || matches!(e, ClusterError::NotFound { .. }) => {
                if rereads >= MAX_CONFLICT_RETRIES {
                    return Err(FailureReason::ConflictRetriesExhausted);
                }
                rereads += 1;
                metrics::record_write_conflict(action.kind.as_str());
                debug!(
                    kind = %action.kind,
                    name = %action.name,
                    attempt = rereads,
                    error = %e,
                    "Write lost a race, re-reading object"
                );
                live = cluster
                    .get(action.kind, &action.name)
                    .await
                    .map_err(FailureReason::Api)?;
            }
            Err(e) => return Err(FailureReason::Api(e)),
        }
    }
}

/// Full-replace payload: `want`'s owned content on top of `have`'s identity.
fn merge_onto(want: &ManagedObject, have: &ManagedObject) -> ManagedObject {
    match (want, have) {
        (ManagedObject::VirtualHost(w), ManagedObject::VirtualHost(h)) => {
            ManagedObject::VirtualHost(merge_virtual_service(w, h))
        }
        (ManagedObject::Service(w), ManagedObject::Service(h)) => {
            ManagedObject::Service(merge_service(w, h))
        }
        _ => want.clone(),
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
