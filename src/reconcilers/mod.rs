// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Level-triggered reconciliation of routes into mesh objects.
//!
//! Every pass recomputes the complete picture from scratch. Change events only decide
//! *when* a pass runs, never *what* it does, so a missed or duplicated event can at worst
//! delay convergence.
//!
//! # Reconciliation Pipeline
//!
//! 1. **Read routes** - [`cluster_state::list_routes`]
//! 2. **Build desired state** - [`desired::build_desired_state`]
//! 3. **Read managed objects** - [`cluster_state::list_managed`]
//! 4. **Diff** - [`diff::plan`]
//! 5. **Apply** - [`engine::apply_plan`]
//!
//! A failure in steps 1 or 3 aborts the pass before any write is issued. Failures in
//! step 5 are per object and reported in the [`PassReport`].
//!
//! # Example: Running One Pass
//!
//! ```rust,no_run
//! use routecontroller::context::ControllerSettings;
//! use routecontroller::reconcilers::{cluster_state::KubeCluster, run_reconciliation_pass};
//!
//! async fn once(cluster: KubeCluster) -> anyhow::Result<()> {
//!     let report = run_reconciliation_pass(&cluster, &ControllerSettings::default()).await?;
//!     println!("{} writes", report.result.writes());
//!     Ok(())
//! }
//! ```

pub mod cluster_state;
pub mod desired;
pub mod diff;
pub mod engine;
pub mod retry;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

use crate::context::ControllerSettings;
use crate::errors::PassError;
use crate::metrics;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub use engine::{FailureReason, ObjectFailure, ReconcileResult};

/// Summary of one reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Routes read from the cluster
    pub routes: usize,
    /// Routes left out as malformed
    pub excluded_routes: usize,
    /// Guids declared with conflicting ports
    pub port_conflicts: usize,
    pub desired_virtual_hosts: usize,
    pub desired_services: usize,
    pub result: ReconcileResult,
    pub duration: Duration,
}

impl PassReport {
    /// Whether every object converged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.result.is_clean()
    }
}

/// Run one full reconciliation pass.
///
/// # Errors
///
/// Returns [`PassError`] when routes or managed objects cannot be read. No write has been
/// issued in that case.
pub async fn run_reconciliation_pass(
    cluster: &dyn cluster_state::ClusterApi,
    settings: &ControllerSettings,
) -> Result<PassReport, PassError> {
    let start = Instant::now();

    let routes = cluster_state::list_routes(cluster, settings.read_retry_budget)
        .await
        .map_err(PassError::ListRoutes)?;
    debug!(count = routes.len(), "Listed routes");

    let desired = desired::build_desired_state(&routes);
    for exclusion in &desired.exclusions {
        warn!(
            route = %exclusion.route,
            reason = %exclusion.reason,
            "Skipping malformed route"
        );
        metrics::record_route_excluded(exclusion_label(&exclusion.reason));
    }
    for warning in &desired.warnings {
        warn!("{warning}");
        metrics::record_port_conflict();
    }

    let actual = cluster_state::list_managed(cluster, settings.read_retry_budget)
        .await
        .map_err(PassError::ListManaged)?;
    debug!(count = actual.len(), "Listed managed objects");

    let plan = diff::plan(&desired, &actual, &settings.namespace, &settings.gateways);
    if !plan.is_empty() {
        info!(
            creates = plan.creates.len(),
            updates = plan.updates.len(),
            deletes = plan.deletes.len(),
            "Applying reconciliation plan"
        );
    }

    let result = engine::apply_plan(cluster, &plan).await;

    metrics::set_resources_active(
        types::ManagedKind::VirtualHost.as_str(),
        desired.virtual_hosts.len(),
    );
    metrics::set_resources_active(types::ManagedKind::Service.as_str(), desired.services.len());

    Ok(PassReport {
        routes: routes.len(),
        excluded_routes: desired.exclusions.len(),
        port_conflicts: desired.warnings.len(),
        desired_virtual_hosts: desired.virtual_hosts.len(),
        desired_services: desired.services.len(),
        result,
        duration: start.elapsed(),
    })
}

fn exclusion_label(reason: &crate::errors::RouteValidationError) -> &'static str {
    use crate::errors::RouteValidationError;

    match reason {
        RouteValidationError::EmptyHost => "empty_host",
        RouteValidationError::InvalidHost(_) => "invalid_host",
        RouteValidationError::EmptyGuid { .. } => "empty_guid",
        RouteValidationError::InvalidGuid(_) => "invalid_guid",
        RouteValidationError::InvalidPort { .. } => "invalid_port",
    }
}
