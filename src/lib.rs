//! Mesh conformance - end-to-end checks of service mesh traffic policy
//!
//! Each scenario applies policy to a live cluster, waits a fixed settle time,
//! probes traffic over HTTP or from inside a mesh pod, and asserts on
//! substrings of the output. Cleanup runs no matter how the scenario ends.
//!
//! # Modules
//!
//! - [`config`] - Runner configuration (YAML file plus `MESH_*` overrides)
//! - [`kubectl`] - Cluster CLI wrapper over a mockable process runner
//! - [`manifests`] - Policy artifacts (authorization and egress)
//! - [`apps`] - Example workloads: bookinfo, sleep, nginx
//! - [`probe`] - HTTP and pod-exec probes with substring expectations
//! - [`scenario`] - Scenario model, runner and reports
//! - [`suites`] - The concrete scenarios
//! - [`retry`] - Backoff for transient cluster errors
//! - [`error`] - Error types for the runner

#![deny(missing_docs)]

pub mod apps;
pub mod config;
pub mod error;
pub mod kubectl;
pub mod manifests;
pub mod probe;
pub mod retry;
pub mod scenario;
pub mod suites;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Namespace the example workloads and most policies live in.
///
/// Authorization principals embed it (`cluster.local/ns/bookinfo/sa/...`),
/// so it is not configurable.
pub const APP_NAMESPACE: &str = "bookinfo";

/// Default mesh control plane namespace
pub const MESH_NAMESPACE: &str = "istio-system";
