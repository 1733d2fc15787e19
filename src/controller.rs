// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller driver.
//!
//! [`RouteController::run`] wires the pieces together: it enqueues the startup pass,
//! forwards trigger events into the [`TriggerQueue`], and runs the single reconciliation
//! worker until shutdown.
//!
//! # Failure Handling
//!
//! - An aborted pass (routes or managed objects unreadable) is requeued with exponential
//!   backoff and retried forever
//! - A pass with per-object write failures is requeued the same way
//! - A clean pass resets the backoff
//! - Rejected credentials before the first successful pass are fatal
//!
//! # Shutdown
//!
//! On shutdown the queue is closed and any pending trigger dropped. A pass already in
//! flight runs to completion before [`RouteController::run`] returns.

use crate::context::Context;
use crate::metrics;
use crate::reconcilers::retry::requeue_backoff;
use crate::reconcilers::run_reconciliation_pass;
use crate::work_queue::{Trigger, TriggerQueue, TriggerSource};
use anyhow::{bail, Result};
use futures::{Stream, StreamExt};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Readiness flag shared with the health server.
///
/// Set once the first pass that was not aborted has completed. Never cleared.
///
/// A pass with per-object write failures still counts: the full route and managed-object
/// sets were read and every other object converged, and the failed objects are retried by
/// the requeued pass. Holding readiness back would take a healthy controller out of
/// service over a single object the API server keeps rejecting.
#[derive(Clone, Debug, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        if !self.0.swap(true, Ordering::AcqRel) {
            info!("Controller is ready");
        }
    }
}

/// The route controller.
pub struct RouteController {
    ctx: Context,
    queue: Arc<TriggerQueue>,
    readiness: Readiness,
}

impl RouteController {
    #[must_use]
    pub fn new(ctx: Context) -> Self {
        let queue = Arc::new(TriggerQueue::new(ctx.settings.debounce));
        Self {
            ctx,
            queue,
            readiness: Readiness::default(),
        }
    }

    /// Handle for the health server.
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        self.readiness.clone()
    }

    #[must_use]
    pub fn queue(&self) -> Arc<TriggerQueue> {
        self.queue.clone()
    }

    /// Run until `shutdown` resolves.
    ///
    /// # Arguments
    ///
    /// * `events` - Change notifications, usually [`crate::watch::cluster_events`]
    /// * `shutdown` - Resolves when the process should stop
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster rejects the controller's credentials before the
    /// first successful pass.
    pub async fn run<S, F>(&self, events: S, shutdown: F) -> Result<()>
    where
        S: Stream<Item = TriggerSource> + Send,
        F: Future<Output = ()> + Send,
    {
        info!(
            namespace = %self.ctx.settings.namespace,
            gateways = ?self.ctx.settings.gateways,
            "Starting route controller"
        );
        self.queue.enqueue(TriggerSource::Startup);

        let feeder = async {
            tokio::pin!(shutdown);
            tokio::select! {
                () = &mut shutdown => {}
                () = self.forward(events) => {
                    debug!("Event stream ended, waiting for shutdown");
                    (&mut shutdown).await;
                }
            }
            info!("Shutdown requested, closing work queue");
            self.queue.close();
        };
        let worker = self.work();
        tokio::pin!(feeder);
        tokio::pin!(worker);

        tokio::select! {
            result = &mut worker => return result,
            () = &mut feeder => {}
        }

        // The queue is closed; let an in-flight pass finish.
        worker.await?;
        info!("Route controller stopped");
        Ok(())
    }

    async fn forward<S>(&self, events: S)
    where
        S: Stream<Item = TriggerSource> + Send,
    {
        futures::pin_mut!(events);
        while let Some(source) = events.next().await {
            debug!(source = %source, "Change event received");
            self.queue.enqueue(source);
        }
    }

    /// The reconciliation worker. Returns when the queue is closed.
    async fn work(&self) -> Result<()> {
        let mut backoff = requeue_backoff();
        let mut failures: u32 = 0;

        while let Some(trigger) = self.queue.next().await {
            debug!(
                source = %trigger.source,
                coalesced = trigger.coalesced,
                attempt = trigger.attempt,
                "Starting reconciliation pass"
            );

            let clean = self.process(&trigger).await?;
            if clean {
                failures = 0;
                backoff.reset();
                continue;
            }

            failures = failures.saturating_add(1);
            let delay = backoff.next_backoff().unwrap_or(backoff.max_interval);
            info!(
                attempt = failures,
                retry_after = ?delay,
                "Requeueing reconciliation pass"
            );
            self.queue.requeue_after(delay, failures);
        }

        Ok(())
    }

    /// Run one pass. Returns whether it was clean.
    async fn process(&self, trigger: &Trigger) -> Result<bool> {
        let settings = &self.ctx.settings;
        let start = Instant::now();

        match run_reconciliation_pass(self.ctx.cluster.as_ref(), settings).await {
            Ok(report) if report.is_clean() => {
                metrics::record_pass("success", report.duration);
                info!(
                    source = %trigger.source,
                    routes = report.routes,
                    virtual_hosts = report.desired_virtual_hosts,
                    services = report.desired_services,
                    created = report.result.created,
                    updated = report.result.updated,
                    deleted = report.result.deleted,
                    elapsed = ?report.duration,
                    "Reconciliation pass complete"
                );
                self.readiness.mark_ready();
                Ok(true)
            }
            Ok(report) => {
                metrics::record_pass("partial", report.duration);
                metrics::record_requeue("partial");
                for failure in &report.result.failures {
                    warn!(
                        kind = %failure.kind,
                        name = %failure.name,
                        reason = %failure.reason,
                        "Object not converged"
                    );
                }
                warn!(
                    failed = report.result.failures.len(),
                    elapsed = ?report.duration,
                    "Reconciliation pass finished with failures"
                );
                self.readiness.mark_ready();
                Ok(false)
            }
            Err(e) => {
                metrics::record_pass("aborted", start.elapsed());
                metrics::record_requeue("aborted");
                error!(error = %e, "Reconciliation pass aborted");

                if e.is_unauthorized() && !self.readiness.is_ready() {
                    self.queue.close();
                    bail!("Kubernetes API rejected the controller's credentials: {e}");
                }
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
