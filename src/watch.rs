// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch subscriptions feeding the trigger queue.
//!
//! Routes are watched in full; `VirtualService`s and `Service`s only through the ownership
//! label selector, so that external edits or deletions of managed objects are repaired on
//! the next pass. Watch events carry no payload into the pipeline: they only say *that*
//! something changed.
//!
//! Watch errors never end a stream. The watcher re-lists with backoff and the error is
//! logged.

use crate::crd::Route;
use crate::istio::VirtualService;
use crate::labels::ownership_selector;
use crate::work_queue::TriggerSource;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Whether a watch event can change the outcome of a pass.
///
/// Initial-list bookkeeping only matters once the list is complete: `InitDone` covers
/// deletions that happened while the watch was down.
#[must_use]
pub fn is_change<K>(event: &Event<K>) -> bool {
    matches!(event, Event::Apply(_) | Event::Delete(_) | Event::InitDone)
}

/// Map one resource watch into a stream of triggers tagged with `source`.
pub fn trigger_stream<K>(
    api: Api<K>,
    config: watcher::Config,
    source: TriggerSource,
) -> impl Stream<Item = TriggerSource> + Send
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    watcher(api, config)
        .default_backoff()
        .filter_map(move |event| async move {
            match event {
                Ok(event) if is_change(&event) => Some(source),
                Ok(_) => None,
                Err(e) => {
                    warn!(source = %source, error = %e, "Watch stream error, re-listing");
                    None
                }
            }
        })
}

/// Stream yielding a resync trigger every `period`, first tick after one full period.
pub fn resync_stream(period: Duration) -> impl Stream<Item = TriggerSource> + Send {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    stream::unfold(ticker, |mut ticker| async move {
        ticker.tick().await;
        debug!("Periodic resync");
        Some((TriggerSource::Resync, ticker))
    })
}

/// All trigger sources of the controller, merged.
///
/// # Arguments
///
/// * `client` - Kubernetes client
/// * `namespace` - Namespace the controller manages
/// * `resync` - Interval of the periodic full pass, `None` to disable
#[must_use]
pub fn cluster_events(
    client: &Client,
    namespace: &str,
    resync: Option<Duration>,
) -> BoxStream<'static, TriggerSource> {
    let routes: Api<Route> = Api::namespaced(client.clone(), namespace);
    let virtual_services: Api<VirtualService> = Api::namespaced(client.clone(), namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), namespace);
    let managed = watcher::Config::default().labels(&ownership_selector());

    let mut sources: Vec<BoxStream<'static, TriggerSource>> = vec![
        trigger_stream(routes, watcher::Config::default(), TriggerSource::Route).boxed(),
        trigger_stream(
            virtual_services,
            managed.clone(),
            TriggerSource::VirtualService,
        )
        .boxed(),
        trigger_stream(services, managed, TriggerSource::Service).boxed(),
    ];
    if let Some(period) = resync {
        sources.push(resync_stream(period).boxed());
    }

    stream::select_all(sources).boxed()
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
