// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::Client;
use routecontroller::{
    constants::{
        DEFAULT_API_TIMEOUT_SECS, DEFAULT_DEBOUNCE_MILLIS, DEFAULT_HEALTH_PORT, DEFAULT_NAMESPACE,
        DEFAULT_RESYNC_INTERVAL_SECS,
    },
    context::{Context, ControllerSettings},
    controller::RouteController,
    health,
    reconcilers::cluster_state::KubeCluster,
    watch::cluster_events,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Kubernetes controller turning `Route` resources into Istio `VirtualService`s and
/// backing `Service`s.
#[derive(Parser, Debug)]
#[command(name = "routecontroller", version, about)]
struct Args {
    /// Namespace to watch routes in and write managed objects to
    #[arg(long, env = "ROUTE_CONTROLLER_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Istio gateway every virtual host binds to (repeatable)
    #[arg(
        long = "gateway",
        env = "ROUTE_CONTROLLER_GATEWAYS",
        value_delimiter = ','
    )]
    gateways: Vec<String>,

    /// Port of the /healthz, /readyz and /metrics server
    #[arg(long, env = "ROUTE_CONTROLLER_HEALTH_PORT", default_value_t = DEFAULT_HEALTH_PORT)]
    health_port: u16,

    /// Timeout of a single Kubernetes API call, in seconds
    #[arg(long, env = "ROUTE_CONTROLLER_API_TIMEOUT_SECS", default_value_t = DEFAULT_API_TIMEOUT_SECS)]
    api_timeout_secs: u64,

    /// Interval of the periodic full pass, in seconds; 0 disables it
    #[arg(long, env = "ROUTE_CONTROLLER_RESYNC_INTERVAL_SECS", default_value_t = DEFAULT_RESYNC_INTERVAL_SECS)]
    resync_interval_secs: u64,

    /// Quiet period coalescing bursts of change events, in milliseconds
    #[arg(long, env = "ROUTE_CONTROLLER_DEBOUNCE_MILLIS", default_value_t = DEFAULT_DEBOUNCE_MILLIS)]
    debounce_millis: u64,
}

impl Args {
    fn settings(&self) -> ControllerSettings {
        let api_timeout = Duration::from_secs(self.api_timeout_secs);
        ControllerSettings {
            namespace: self.namespace.clone(),
            gateways: self
                .gateways
                .iter()
                .map(|g| g.trim().to_string())
                .filter(|g| !g.is_empty())
                .collect(),
            api_timeout,
            debounce: Duration::from_millis(self.debounce_millis),
            resync_interval: (self.resync_interval_secs > 0)
                .then(|| Duration::from_secs(self.resync_interval_secs)),
            read_retry_budget: api_timeout * 3,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("routecontroller")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

fn init_tracing() {
    // Respects RUST_LOG, defaulting to INFO; RUST_LOG_FORMAT=json switches to JSON lines
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(args: Args) -> Result<()> {
    init_tracing();
    info!("Starting route controller");

    let settings = args.settings();
    debug!(?settings, "Resolved configuration");

    let client = Client::try_default()
        .await
        .context("Failed to build Kubernetes client")?;
    debug!("Kubernetes client initialized successfully");

    let cluster = KubeCluster::new(client.clone(), &settings.namespace, settings.api_timeout);
    let events = cluster_events(&client, &settings.namespace, settings.resync_interval);
    let controller = RouteController::new(Context::new(Arc::new(cluster), settings));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let health = tokio::spawn(health::serve(
        args.health_port,
        controller.readiness(),
        wait_for(shutdown_rx.clone()),
    ));
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = signal_tx.send(true);
    });

    let result = controller.run(events, wait_for(shutdown_rx)).await;
    if let Err(e) = &result {
        error!("Route controller exited with error: {e:#}");
    }
    // Also stops the health server when the controller failed on its own
    let _ = shutdown_tx.send(true);

    match health.await {
        Ok(Err(e)) => error!("Health server exited with error: {e:#}"),
        Err(e) => error!("Health server task failed: {e}"),
        Ok(Ok(())) => {}
    }

    result
}

/// Resolves once `rx` observes a shutdown request.
async fn wait_for(mut rx: watch::Receiver<bool>) {
    // A dropped sender also means shutdown
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
