//! TLS and mutual TLS origination at the egress gateway using certificates
//! mounted from secrets.

use crate::apps::{App, CA_CERT, CLIENT_CERT, CLIENT_KEY};
use crate::manifests::egress::{
    egress_gateway_cert_patch, CA_CERTS_MOUNT, CA_CERTS_SECRET, CLIENT_CERTS_MOUNT,
    CLIENT_CERTS_SECRET, CNN_GATEWAY_TLS_FILE, CNN_SERVICE_ENTRY, NGINX_GATEWAY_TLS, NGINX_HOST,
    NGINX_MESH_RULE,
};
use crate::probe::{Expectation, Probe};
use crate::scenario::{Action, Namespace, Scenario, Step};

use super::egress_gateways::{cnn_politics, served_directly, MOVED};

/// Scenario name
pub const NAME: &str = "egress-tls-origination-file-mount";

const EGRESS_GATEWAY: &str = "istio-egressgateway";
const EGRESS_GATEWAY_SELECTOR: &str = "istio=egressgateway";

fn rollout_history() -> Step {
    Step::Action(Action::RolloutHistory {
        namespace: Namespace::ControlPlane,
        deployment: EGRESS_GATEWAY,
    })
}

/// Build the scenario
pub fn scenario() -> Scenario {
    Scenario::new(NAME, "TLS and mTLS origination with certificates mounted in the egress gateway")
        .setup(vec![Step::Install(App::sleep()), Step::Install(App::nginx())])
        .case(
            "tls-origination",
            vec![
                Step::log("Perform TLS origination with an egress gateway"),
                Step::apply(CNN_SERVICE_ENTRY),
                Step::settle(10),
                Step::check(
                    cnn_politics("http"),
                    Expectation::contains(MOVED),
                    "HTTP through the service entry",
                ),
                Step::apply(CNN_GATEWAY_TLS_FILE),
                Step::settle(20),
                Step::check(
                    cnn_politics("http"),
                    served_directly(),
                    "TLS originated at the egress gateway",
                ),
                Step::delete(CNN_GATEWAY_TLS_FILE),
                Step::delete(CNN_SERVICE_ENTRY),
                Step::settle(20),
            ],
        )
        .case(
            "mtls-origination",
            vec![
                Step::log("Redeploy the egress gateway with the client certificates"),
                Step::Action(Action::CreateTlsSecret {
                    namespace: Namespace::ControlPlane,
                    name: CLIENT_CERTS_SECRET,
                    key: CLIENT_KEY,
                    cert: CLIENT_CERT,
                }),
                Step::Action(Action::CreateGenericSecret {
                    namespace: Namespace::ControlPlane,
                    name: CA_CERTS_SECRET,
                    file: CA_CERT,
                }),
                rollout_history(),
                Step::Action(Action::PatchDeploymentJson {
                    namespace: Namespace::ControlPlane,
                    deployment: EGRESS_GATEWAY,
                    patch: egress_gateway_cert_patch(),
                }),
                Step::settle(20),
                Step::Action(Action::WaitMemberRoll),
                Step::Action(Action::ListPodFiles {
                    namespace: Namespace::ControlPlane,
                    selector: EGRESS_GATEWAY_SELECTOR,
                    paths: vec![CLIENT_CERTS_MOUNT, CA_CERTS_MOUNT],
                }),
                rollout_history(),
                Step::log("Configure mTLS origination for egress traffic"),
                Step::apply(NGINX_GATEWAY_TLS),
                Step::settle(20),
                Step::Apply {
                    namespace: Namespace::ControlPlane,
                    artifact: NGINX_MESH_RULE,
                },
                Step::settle(10),
                Step::check(
                    Probe::from_sleep(format!("curl -sS http://{}", NGINX_HOST)),
                    Expectation::contains("Welcome to nginx"),
                    "nginx reached over mTLS",
                ),
            ],
        )
        .cleanup(vec![
            Step::Delete {
                namespace: Namespace::ControlPlane,
                artifact: NGINX_MESH_RULE,
            },
            Step::delete(NGINX_GATEWAY_TLS),
            Step::Action(Action::RolloutUndo {
                namespace: Namespace::ControlPlane,
                deployment: EGRESS_GATEWAY,
            }),
            Step::settle(20),
            Step::Action(Action::WaitMemberRoll),
            rollout_history(),
            Step::Action(Action::DeleteSecret {
                namespace: Namespace::ControlPlane,
                name: CLIENT_CERTS_SECRET,
            }),
            Step::Action(Action::DeleteSecret {
                namespace: Namespace::ControlPlane,
                name: CA_CERTS_SECRET,
            }),
            Step::delete(CNN_GATEWAY_TLS_FILE),
            Step::delete(CNN_SERVICE_ENTRY),
            Step::Uninstall(App::nginx()),
            Step::Uninstall(App::sleep()),
            Step::settle(20),
        ])
}
