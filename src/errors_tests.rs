// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `errors.rs`

#[cfg(test)]
mod tests {
    use super::super::*;

    fn classify(
        code: u16,
        reason: &str,
        operation: &str,
        kind: &str,
        name: &str,
    ) -> ClusterError {
        let message = format!("{reason} happened");
        ClusterError::from_api_status(code, reason, &message, operation, kind, name)
    }

    #[test]
    fn test_409_conflict_maps_to_conflict() {
        let err = classify(409, "Conflict", "replace", "Service", "s-g1");
        assert_eq!(
            err.to_string(),
            "Conflicting write to Service 's-g1': Conflict happened"
        );
        assert!(err.is_conflict());
        assert!(err.is_transient());
    }

    #[test]
    fn test_409_already_exists_is_distinguished() {
        let err = classify(409, "AlreadyExists", "create", "Service", "s-g1");
        assert_eq!(
            err,
            ClusterError::AlreadyExists {
                kind: "Service".to_string(),
                name: "s-g1".to_string(),
            }
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn test_404_maps_to_not_found() {
        let err = classify(404, "NotFound", "get", "Service", "s-g1");
        assert!(matches!(err, ClusterError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        for code in [429, 500, 502, 503, 504] {
            let err = classify(code, "Busy", "list", "Route", "");
            assert!(err.is_transient(), "HTTP {code} should be transient");
            assert!(!err.is_conflict(), "HTTP {code} is not a conflict");
        }
    }

    #[test]
    fn test_auth_failures_are_not_transient() {
        for code in [401, 403] {
            let err = classify(code, "Forbidden", "list", "Route", "");
            assert!(matches!(err, ClusterError::Unauthorized { .. }));
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_unprocessable_entity_is_permanent() {
        let err = classify(422, "Invalid", "create", "Service", "s-g1");
        assert!(matches!(err, ClusterError::Api { code: 422, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_timeout_display() {
        let err = ClusterError::Timeout {
            operation: "list Routes".to_string(),
            timeout_secs: 10,
        };
        assert_eq!(err.to_string(), "list Routes timed out after 10s");
        assert!(err.is_transient());
    }

    #[test]
    fn test_pass_error_wraps_source() {
        let err = PassError::ListManaged(ClusterError::Timeout {
            operation: "list Services".to_string(),
            timeout_secs: 10,
        });
        assert!(err.to_string().starts_with("Failed to list managed objects"));
    }

    #[test]
    fn test_pass_error_detects_rejected_credentials() {
        let err = PassError::ListRoutes(ClusterError::Unauthorized {
            operation: "list Routes".to_string(),
            message: "forbidden".to_string(),
        });
        assert!(err.is_unauthorized());

        let err = PassError::ListRoutes(ClusterError::Transient {
            operation: "list Routes".to_string(),
            message: "connection refused".to_string(),
        });
        assert!(!err.is_unauthorized());
    }
}
