//! Live scenario runs
//!
//! Each test runs one scenario against the cluster the current kubeconfig
//! points at, with configuration from `MESH_*` environment variables. They
//! take minutes and mutate the cluster, so they are ignored by default.

use std::sync::Arc;

use mesh_conformance::config::RunnerConfig;
use mesh_conformance::kubectl::{Kubectl, ProcessRunner};
use mesh_conformance::probe::ReqwestProber;
use mesh_conformance::scenario::Runner;
use mesh_conformance::suites;

use super::helpers::init_test_tracing;

async fn run_live(name: &str) {
    init_test_tracing();
    let config = RunnerConfig::load(None).expect("configuration should load");
    let scenarios = suites::select(&[name.to_string()]).expect("scenario should exist");

    let kubectl = Kubectl::new(Arc::new(ProcessRunner), &config);
    let prober = ReqwestProber::new(config.http_timeout()).expect("HTTP client should build");
    let runner = Runner::new(kubectl, Arc::new(prober), config);

    let report = runner.run_all(&scenarios).await;
    report.log_summary();
    if let Err(e) = report.into_result() {
        panic!("{}", e);
    }
}

#[tokio::test]
#[ignore]
async fn authorization_http_on_a_live_mesh() {
    run_live(suites::AUTHORIZATION_HTTP).await;
}

#[tokio::test]
#[ignore]
async fn egress_gateways_on_a_live_mesh() {
    run_live(suites::EGRESS_GATEWAYS).await;
}

#[tokio::test]
#[ignore]
async fn tls_origination_file_mount_on_a_live_mesh() {
    run_live(suites::EGRESS_TLS_ORIGINATION_FILE_MOUNT).await;
}
