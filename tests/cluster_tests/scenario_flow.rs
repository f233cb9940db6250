//! Scenario flow tests
//!
//! The shipped scenarios run end to end against a scripted CLI. These pin
//! down the ordering guarantees: checks that fail keep the case going, setup
//! failures skip cases, and cleanup always runs in full.

use mesh_conformance::kubectl::CommandOutput;
use mesh_conformance::manifests::authorization::{
    DENY_ALL, DETAILS_GET, PRODUCTPAGE_GET, RATINGS_GET, REVIEWS_GET,
};
use mesh_conformance::manifests::egress::{
    CNN_GATEWAY, CNN_GATEWAY_HTTPS, CNN_GATEWAY_TLS_FILE, CNN_SERVICE_ENTRY,
    CNN_SERVICE_ENTRY_TLS, NGINX_GATEWAY_TLS, NGINX_MESH_RULE,
};
use mesh_conformance::suites;

use super::helpers::{exec_command, init_test_tracing, offline_runner, CannedProber, ScriptedRunner};

const REDIRECT: &str = "HTTP/1.1 301 Moved Permanently\r\nlocation: https://edition.cnn.com/politics\r\n\r\n";
const REDIRECT_THEN_OK: &str =
    "HTTP/1.1 301 Moved Permanently\r\nlocation: https://www.cnn.com/politics\r\n\r\nHTTP/2 200\r\n\r\n";

fn scenario(name: &str) -> mesh_conformance::scenario::Scenario {
    suites::select(&[name.to_string()]).unwrap().remove(0)
}

fn contents(artifacts: &[mesh_conformance::manifests::PolicyArtifact]) -> Vec<String> {
    artifacts.iter().map(|a| a.contents.to_string()).collect()
}

// =============================================================================
// Story: authorization over HTTP
// =============================================================================

/// With every request denied, the deny case passes and the allow case fails
/// only on its first check; the GET policies still get applied and cleaned.
#[tokio::test]
async fn story_denied_productpage_fails_only_the_partial_page_check() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|_| CommandOutput::ok(""));
    let prober = CannedProber::new("RBAC: access denied");
    let runner = offline_runner(cli.clone(), prober.clone());

    let report = runner.run(&scenario(suites::AUTHORIZATION_HTTP)).await;

    assert!(report.setup_error.is_none());
    assert!(report.cases[0].passed, "{:?}", report.cases[0].failures);
    let allow = &report.cases[1];
    assert!(!allow.passed);
    assert_eq!(allow.failures.len(), 1);
    assert!(allow.failures[0].starts_with("productpage GET policy"));

    // one check, then warmup + check twice
    assert_eq!(prober.urls().len(), 5);
    assert!(prober
        .urls()
        .iter()
        .all(|u| u == "http://ingress.example.com/productpage"));

    assert_eq!(
        cli.deleted_contents(),
        contents(&[DETAILS_GET, REVIEWS_GET, RATINGS_GET, PRODUCTPAGE_GET, DENY_ALL])
    );
}

#[tokio::test]
async fn story_control_plane_mtls_is_switched_off_during_cleanup() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|_| CommandOutput::ok(""));
    let runner = offline_runner(cli.clone(), CannedProber::new(""));

    runner.run(&scenario(suites::AUTHORIZATION_HTTP)).await;

    let patches = cli.matching(&["patch", "smcp/basic"]);
    assert_eq!(patches.len(), 2);
    assert!(patches[0].args.iter().any(|a| a.contains(r#""mtls":true"#)));
    assert!(patches[1].args.iter().any(|a| a.contains(r#""mtls":false"#)));
    assert!(cli.calls().last().unwrap().has_arg("smcp/basic"));
}

// =============================================================================
// Story: egress gateways
// =============================================================================

/// HTTPS through a redirect chain fails both HTTPS checks, but the HTTP case
/// is unaffected and cleanup removes everything.
#[tokio::test]
async fn story_redirected_https_fails_its_case_and_cleanup_still_runs() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|inv| {
        if inv.has_arg("get") && inv.has_arg("pods") {
            return CommandOutput::ok("sleep-7d9c6 ");
        }
        match exec_command(inv) {
            Some(cmd) if cmd.contains("https://") => CommandOutput::ok(REDIRECT_THEN_OK),
            Some(_) => CommandOutput::ok(REDIRECT),
            None => CommandOutput::ok(""),
        }
    });
    let runner = offline_runner(cli.clone(), CannedProber::new(""));

    let report = runner.run(&scenario(suites::EGRESS_GATEWAYS)).await;

    assert!(report.cases[0].passed, "{:?}", report.cases[0].failures);
    assert!(!report.cases[1].passed);
    assert_eq!(report.cases[1].failures.len(), 2);
    assert!(report.cleanup_errors.is_empty());

    let deleted = cli.deleted_contents();
    assert_eq!(
        deleted[deleted.len() - 4..].to_vec(),
        contents(&[CNN_GATEWAY_HTTPS, CNN_GATEWAY, CNN_SERVICE_ENTRY_TLS, CNN_SERVICE_ENTRY])
    );
    assert!(cli.calls().last().unwrap().has_arg("samples/sleep/sleep.yaml"));

    let execs = cli.matching(&["exec", "sleep-7d9c6"]);
    assert_eq!(execs.len(), 4);
    assert!(execs.iter().all(|inv| inv.has_arg("-c") && inv.has_arg("sleep")));
}

#[tokio::test]
async fn story_missing_sleep_pod_aborts_each_case_at_its_first_probe() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|_| CommandOutput::ok(""));
    let runner = offline_runner(cli.clone(), CannedProber::new(""));

    let report = runner.run(&scenario(suites::EGRESS_GATEWAYS)).await;

    for case in &report.cases {
        assert_eq!(case.failures.len(), 1, "{}", case.name);
        assert!(case.failures[0].contains("no running pod matches app=sleep"));
    }
    // the gateways were never applied because each case stopped at its first probe
    let applied: Vec<_> = cli
        .matching(&["apply"])
        .into_iter()
        .filter_map(|inv| inv.stdin)
        .collect();
    assert_eq!(applied, contents(&[CNN_SERVICE_ENTRY, CNN_SERVICE_ENTRY_TLS]));
}

// =============================================================================
// Story: TLS origination with mounted certificates
// =============================================================================

/// A missing nginx certificate fails setup. Neither case runs, yet cleanup
/// rolls the gateway back and removes every artifact and secret.
#[tokio::test]
async fn story_setup_failure_skips_cases_but_not_cleanup() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|inv| {
        if inv.has_arg("create") && inv.has_arg("nginx-server-certs") {
            CommandOutput::failed(
                "error: open sampleCerts/nginx.example.com/nginx.example.com.key: no such file or directory",
            )
        } else {
            CommandOutput::ok("")
        }
    });
    let runner = offline_runner(cli.clone(), CannedProber::new(""));

    let report = runner.run(&scenario(suites::EGRESS_TLS_ORIGINATION_FILE_MOUNT)).await;

    assert!(report
        .setup_error
        .as_deref()
        .unwrap()
        .contains("no such file or directory"));
    assert_eq!(report.cases.len(), 2);
    assert!(report
        .cases
        .iter()
        .all(|c| !c.passed && c.failures[0].starts_with("setup failed: ")));
    assert!(cli.matching(&["exec"]).is_empty());
    assert!(cli.matching(&["patch"]).is_empty());

    assert_eq!(cli.matching(&["rollout", "undo", "deploy/istio-egressgateway"]).len(), 1);
    assert_eq!(cli.matching(&["wait", "smmr/default"]).len(), 1);
    assert_eq!(cli.matching(&["secret", "nginx-client-certs", "istio-system"]).len(), 1);
    assert_eq!(cli.matching(&["secret", "nginx-ca-certs", "istio-system"]).len(), 1);
    assert_eq!(
        cli.deleted_contents(),
        contents(&[
            NGINX_MESH_RULE,
            NGINX_GATEWAY_TLS,
            CNN_GATEWAY_TLS_FILE,
            CNN_SERVICE_ENTRY,
            mesh_conformance::manifests::egress::NGINX_SERVER,
        ])
    );
    assert!(cli.calls().last().unwrap().has_arg("samples/sleep/sleep.yaml"));
}

#[tokio::test]
async fn story_mtls_origination_patches_the_gateway_and_reaches_nginx() {
    init_test_tracing();
    let cli = ScriptedRunner::new(|inv| {
        if inv.has_arg("get") && inv.has_arg("pods") {
            return if inv.has_arg("istio=egressgateway") {
                CommandOutput::ok("istio-egressgateway-5f7b9")
            } else {
                CommandOutput::ok("sleep-7d9c6")
            };
        }
        match exec_command(inv) {
            Some(cmd) if cmd.starts_with("ls -al") => CommandOutput::ok("tls.crt\ntls.key\n"),
            Some(cmd) if cmd.contains("my-nginx") => {
                CommandOutput::ok("<title>Welcome to nginx!</title>")
            }
            Some(cmd) if cmd.contains("https://") => CommandOutput::ok("HTTP/2 200\r\n"),
            Some(_) => CommandOutput::ok(REDIRECT),
            None => CommandOutput::ok(""),
        }
    });
    let runner = offline_runner(cli.clone(), CannedProber::new(""));

    let report = runner.run(&scenario(suites::EGRESS_TLS_ORIGINATION_FILE_MOUNT)).await;

    let mtls = &report.cases[1];
    assert!(mtls.passed, "{:?}", mtls.failures);

    let patch = &cli.matching(&["patch", "deploy/istio-egressgateway"])[0];
    assert!(patch.has_arg("--type=json") && patch.has_arg("istio-system"));

    let listing = &cli.matching(&["exec", "istio-egressgateway-5f7b9"])[0];
    assert_eq!(
        listing.args.last().map(String::as_str),
        Some("ls -al /etc/istio/nginx-client-certs /etc/istio/nginx-ca-certs")
    );

    let mesh_rule_apply = cli
        .matching(&["apply", "istio-system"])
        .into_iter()
        .filter_map(|inv| inv.stdin)
        .collect::<Vec<_>>();
    assert_eq!(mesh_rule_apply, contents(&[NGINX_MESH_RULE]));
}
