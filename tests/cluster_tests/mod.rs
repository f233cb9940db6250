//! Integration tests for the conformance runner
//!
//! # Test Organization
//!
//! - `scenario_flow`: Stories about how the shipped scenarios drive the
//!   cluster, run against a scripted CLI and a canned HTTP prober
//!
//! - `live`: Each scenario run against a real mesh (ignored by default)
//!
//! # Running These Tests
//!
//! ```bash
//! # Offline flow tests
//! cargo test --test cluster scenario_flow
//!
//! # Live tests; the current kubeconfig must point at a cluster with the
//! # mesh control plane in istio-system and the bookinfo namespace enrolled
//! cargo test --test cluster live -- --ignored --nocapture
//! ```

mod helpers;
mod live;
mod scenario_flow;
