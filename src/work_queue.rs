// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Coalescing trigger queue feeding the reconciliation worker.
//!
//! Every pass is a full pass, so the queue never needs to hold more than one trigger: any
//! number of change events arriving while a trigger is pending fold into it. A change event
//! becomes ready after the debounce window; a requeue after a failed pass becomes ready
//! after its backoff delay. When both are pending the earlier deadline wins.

use crate::metrics;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// What caused a reconciliation pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerSource {
    /// Initial full pass at process start
    Startup,
    /// A `Route` changed
    Route,
    /// A managed `VirtualService` changed
    VirtualService,
    /// A managed `Service` changed
    Service,
    /// Periodic resync tick
    Resync,
    /// Retry of a failed pass
    Requeue,
}

impl TriggerSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Route => "route",
            Self::VirtualService => "virtual_service",
            Self::Service => "service",
            Self::Resync => "resync",
            Self::Requeue => "requeue",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready request for one reconciliation pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Trigger {
    /// Source of the first event folded into this trigger
    pub source: TriggerSource,
    /// Number of further events folded in
    pub coalesced: usize,
    /// Consecutive failed passes preceding this one, 0 when not a retry
    pub attempt: u32,
}

#[derive(Debug)]
struct Pending {
    ready_at: Instant,
    trigger: Trigger,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: Option<Pending>,
    closed: bool,
}

/// Single-slot queue of reconciliation triggers with one consumer.
#[derive(Debug)]
pub struct TriggerQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    debounce: Duration,
}

impl TriggerQueue {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            debounce,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a pass for a change event. Startup triggers skip the debounce window.
    pub fn enqueue(&self, source: TriggerSource) {
        let delay = if source == TriggerSource::Startup {
            Duration::ZERO
        } else {
            self.debounce
        };
        metrics::record_trigger(source.as_str());
        self.schedule(source, Instant::now() + delay, 0);
    }

    /// Request a retry pass after `delay`.
    pub fn requeue_after(&self, delay: Duration, attempt: u32) {
        metrics::record_trigger(TriggerSource::Requeue.as_str());
        self.schedule(TriggerSource::Requeue, Instant::now() + delay, attempt);
    }

    fn schedule(&self, source: TriggerSource, ready_at: Instant, attempt: u32) {
        let mut state = self.lock();
        if state.closed {
            return;
        }

        match state.pending.as_mut() {
            Some(pending) => {
                pending.ready_at = pending.ready_at.min(ready_at);
                pending.trigger.coalesced += 1;
                pending.trigger.attempt = pending.trigger.attempt.max(attempt);
                metrics::record_trigger_coalesced();
            }
            None => {
                state.pending = Some(Pending {
                    ready_at,
                    trigger: Trigger {
                        source,
                        coalesced: 0,
                        attempt,
                    },
                });
            }
        }
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the pending trigger to become ready and take it.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn next(&self) -> Option<Trigger> {
        loop {
            let deadline = {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }
                match state.pending.as_ref().map(|p| p.ready_at) {
                    Some(ready_at) if ready_at <= Instant::now() => {
                        return state.pending.take().map(|p| p.trigger);
                    }
                    other => other,
                }
            };

            match deadline {
                Some(ready_at) => {
                    tokio::select! {
                        () = self.notify.notified() => {}
                        () = tokio::time::sleep_until(ready_at) => {}
                    }
                }
                None => self.notify.notified().await,
            }
        }
    }

    /// Stop accepting triggers and drop the pending one. Wakes a waiting consumer.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.pending = None;
        drop(state);
        self.notify.notify_one();
    }

    /// Whether a trigger is waiting, ready or not.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
#[path = "work_queue_tests.rs"]
mod work_queue_tests;
