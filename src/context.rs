// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciliation worker.
//!
//! [`ControllerSettings`] carries the tunables resolved from the command line, and
//! [`Context`] bundles them with the cluster API the pipeline writes through.

use crate::constants::{
    DEFAULT_API_TIMEOUT_SECS, DEFAULT_DEBOUNCE_MILLIS, DEFAULT_NAMESPACE,
    DEFAULT_RESYNC_INTERVAL_SECS,
};
use crate::reconcilers::cluster_state::ClusterApi;
use std::sync::Arc;
use std::time::Duration;

/// Runtime configuration of the controller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Namespace routes are read from and managed objects written to
    pub namespace: String,

    /// Istio gateways every virtual host binds to; empty for mesh-internal routing
    pub gateways: Vec<String>,

    /// Upper bound on a single Kubernetes API call
    pub api_timeout: Duration,

    /// Quiet period that coalesces bursts of change events into one pass
    pub debounce: Duration,

    /// Interval of the unconditional full pass; `None` disables it
    pub resync_interval: Option<Duration>,

    /// How long a pass keeps retrying a transient list failure before aborting
    pub read_retry_budget: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        let api_timeout = Duration::from_secs(DEFAULT_API_TIMEOUT_SECS);
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            gateways: Vec::new(),
            api_timeout,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MILLIS),
            resync_interval: Some(Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS)),
            read_retry_budget: api_timeout * 3,
        }
    }
}

/// Shared context passed to the reconciliation worker.
#[derive(Clone)]
pub struct Context {
    /// Cluster API every read and write goes through
    pub cluster: Arc<dyn ClusterApi>,

    pub settings: ControllerSettings,
}

impl Context {
    #[must_use]
    pub fn new(cluster: Arc<dyn ClusterApi>, settings: ControllerSettings) -> Self {
        Self { cluster, settings }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
