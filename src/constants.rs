// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the route controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for the `Route` CRD
pub const API_GROUP: &str = "networking.cloudfoundry.org";

/// API version for the `Route` CRD
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "networking.cloudfoundry.org/v1alpha1";

/// Kind name for `Route` resource
pub const KIND_ROUTE: &str = "Route";

/// API group of the Istio `VirtualService` kind
pub const ISTIO_API_GROUP: &str = "networking.istio.io";

/// API version of the Istio `VirtualService` kind
pub const ISTIO_API_VERSION: &str = "v1alpha3";

/// Kind name for Istio `VirtualService` resource
pub const KIND_VIRTUAL_SERVICE: &str = "VirtualService";

/// Kind name for core `Service` resource
pub const KIND_SERVICE: &str = "Service";

// ============================================================================
// Naming Constants
// ============================================================================

/// Prefix of backing `Service` names (`s-<guid>`)
pub const SERVICE_NAME_PREFIX: &str = "s-";

/// Prefix of `VirtualService` names (`vs-<sha256(host)>`)
pub const VIRTUAL_SERVICE_NAME_PREFIX: &str = "vs-";

/// Maximum length of a `Service` name (DNS-1035 label) and of a label value
pub const MAX_LABEL_LENGTH: usize = 63;

/// Name of the single port exposed by every backing `Service`
pub const SERVICE_PORT_NAME: &str = "http";

/// Protocol of the single port exposed by every backing `Service`
pub const SERVICE_PORT_PROTOCOL: &str = "TCP";

/// Total weight Istio expects across the destinations of one HTTP route
pub const TOTAL_ROUTE_WEIGHT: u32 = 100;

// ============================================================================
// Kubernetes API Timeouts
// ============================================================================

/// Per-call timeout for Kubernetes API requests (seconds)
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Maximum attempts for one managed-object write that keeps hitting
/// optimistic-concurrency conflicts
pub const MAX_CONFLICT_RETRIES: u32 = 3;

// ============================================================================
// Work Queue Timing
// ============================================================================

/// Window during which rapid Route changes collapse into one reconciliation (milliseconds)
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 250;

/// Interval of the periodic full resync (5 minutes)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// First requeue delay after a failed reconciliation pass (milliseconds)
pub const REQUEUE_INITIAL_INTERVAL_MILLIS: u64 = 500;

/// Cap on the requeue delay after repeated failed passes (seconds)
pub const REQUEUE_MAX_INTERVAL_SECS: u64 = 60;

// ============================================================================
// Health Server
// ============================================================================

/// Default port for the `/healthz`, `/readyz` and `/metrics` endpoints
pub const DEFAULT_HEALTH_PORT: u16 = 8081;

/// Default namespace watched when none is configured
pub const DEFAULT_NAMESPACE: &str = "default";
