// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # routecontroller - Route to Istio controller for Kubernetes
//!
//! Watches `Route` custom resources and keeps one Istio `VirtualService` per hostname and
//! one Kubernetes `Service` per destination workload in step with them.
//!
//! ## Overview
//!
//! Every trigger (startup, watch event, periodic resync or requeue) runs one full
//! level-triggered reconciliation pass:
//!
//! 1. list all routes and derive the desired virtual hosts and services
//! 2. list every object the controller owns
//! 3. diff the two, then create, update and delete until they match
//!
//! Triggers arriving during a pass are coalesced into a single follow-up pass.
//!
//! ## Modules
//!
//! - [`crd`] - the `Route` custom resource
//! - [`istio`] - the subset of the Istio `VirtualService` API the controller writes
//! - [`mesh_resources`] - builders for managed `VirtualService` and `Service` objects
//! - [`reconcilers`] - desired state, cluster reads, diff and apply
//! - [`controller`] - the single-worker reconciliation loop and readiness
//! - [`work_queue`] - the coalescing trigger queue
//! - [`watch`] - watch streams turned into triggers
//! - [`health`] - `/healthz`, `/readyz` and `/metrics`
//!
//! ## Example
//!
//! ```rust,no_run
//! use routecontroller::context::ControllerSettings;
//! use routecontroller::reconcilers::run_reconciliation_pass;
//! use routecontroller::reconcilers::cluster_state::KubeCluster;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let settings = ControllerSettings::default();
//! let cluster = KubeCluster::new(client, &settings.namespace, settings.api_timeout);
//!
//! let report = run_reconciliation_pass(&cluster, &settings).await?;
//! println!("{} writes", report.result.writes());
//! # Ok(())
//! # }
//! ```

pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod errors;
pub mod health;
pub mod istio;
pub mod labels;
pub mod mesh_resources;
pub mod metrics;
pub mod reconcilers;
pub mod watch;
pub mod work_queue;
