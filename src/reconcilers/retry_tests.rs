// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `retry.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::errors::ClusterError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn no_jitter(initial_ms: u64, max_ms: u64, budget: Option<Duration>) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
            budget,
            2.0,
            0.0,
        )
    }

    fn transient() -> ClusterError {
        ClusterError::Transient {
            operation: "list Routes".to_string(),
            message: "connection refused".to_string(),
        }
    }

    /// Test that the requeue schedule never gives up
    #[test]
    fn test_requeue_backoff_configuration() {
        let backoff = requeue_backoff();

        assert_eq!(backoff.initial_interval, Duration::from_millis(500));
        assert_eq!(backoff.max_interval, Duration::from_secs(60));
        assert_eq!(
            backoff.max_elapsed_time, None,
            "Pass requeues must retry indefinitely"
        );
    }

    #[test]
    fn test_read_backoff_uses_budget() {
        let backoff = read_backoff(Duration::from_secs(30));
        assert_eq!(backoff.initial_interval, Duration::from_millis(100));
        assert_eq!(backoff.max_elapsed_time, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = no_jitter(100, 350, None);

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(200)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(350)));
        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(350)));
    }

    #[test]
    fn test_backoff_reset_restores_initial_interval() {
        let mut backoff = no_jitter(100, 1_000, None);
        backoff.next_backoff();
        backoff.next_backoff();

        backoff.reset();

        assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(1_000),
            Duration::from_secs(10),
            None,
            2.0,
            0.1,
        );
        let first = backoff.next_backoff().unwrap();
        assert!(first >= Duration::from_millis(900) && first <= Duration::from_millis(1_100));
    }

    #[test]
    fn test_exhausted_budget_returns_none() {
        let mut backoff = no_jitter(1, 1, Some(Duration::ZERO));
        assert_eq!(backoff.next_backoff(), None);
    }

    #[tokio::test]
    async fn test_retry_transient_recovers() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = retry_transient(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok("routes")
                    }
                }
            },
            "list Routes",
            no_jitter(1, 2, Some(Duration::from_secs(5))),
        )
        .await;

        assert_eq!(result, Ok("routes"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_transient_fails_fast_on_permanent_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), ClusterError> = retry_transient(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ClusterError::Unauthorized {
                        operation: "list Routes".to_string(),
                        message: "forbidden".to_string(),
                    })
                }
            },
            "list Routes",
            no_jitter(1, 2, Some(Duration::from_secs(5))),
        )
        .await;

        assert!(matches!(result, Err(ClusterError::Unauthorized { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_transient_gives_up_after_budget() {
        let result: Result<(), ClusterError> = retry_transient(
            || async { Err(transient()) },
            "list Routes",
            no_jitter(1, 2, Some(Duration::from_millis(20))),
        )
        .await;

        assert_eq!(result, Err(transient()));
    }
}
