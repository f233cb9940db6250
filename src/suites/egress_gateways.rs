//! Route external HTTP and HTTPS traffic through the egress gateway.

use crate::apps::App;
use crate::manifests::egress::{
    CNN_GATEWAY, CNN_GATEWAY_HTTPS, CNN_HOST, CNN_SERVICE_ENTRY, CNN_SERVICE_ENTRY_TLS,
};
use crate::probe::{Expectation, Probe};
use crate::scenario::{Scenario, Step};

/// Scenario name
pub const NAME: &str = "egress-gateways";

pub(super) const MOVED: &str = "301 Moved Permanently";

/// Headers of `http://edition.cnn.com/politics` fetched from sleep
pub(super) fn cnn_politics(scheme: &str) -> Probe {
    Probe::headers_from_sleep(&format!("{}://{}/politics", scheme, CNN_HOST))
}

/// A direct 200 with no redirect on the way
pub(super) fn served_directly() -> Expectation {
    Expectation::All(vec![Expectation::contains("200"), Expectation::absent(MOVED)])
}

/// Build the scenario
pub fn scenario() -> Scenario {
    Scenario::new(NAME, "Egress gateway for HTTP and HTTPS traffic to edition.cnn.com")
        .setup(vec![Step::Install(App::sleep())])
        .case(
            "egress-gateway-http",
            vec![
                Step::log("Create a ServiceEntry for edition.cnn.com"),
                Step::apply(CNN_SERVICE_ENTRY),
                Step::settle(10),
                Step::check(
                    cnn_politics("http"),
                    Expectation::contains(MOVED),
                    "HTTP through the service entry",
                ),
                Step::log("Route edition.cnn.com through the egress gateway"),
                Step::apply(CNN_GATEWAY),
                Step::settle(20),
                Step::check(
                    cnn_politics("http"),
                    Expectation::contains(MOVED),
                    "HTTP through the egress gateway",
                ),
                Step::delete(CNN_GATEWAY),
                Step::delete(CNN_SERVICE_ENTRY),
                Step::settle(20),
            ],
        )
        .case(
            "egress-gateway-https",
            vec![
                Step::log("Create a TLS ServiceEntry for edition.cnn.com"),
                Step::apply(CNN_SERVICE_ENTRY_TLS),
                Step::settle(10),
                Step::check(
                    cnn_politics("https"),
                    served_directly(),
                    "HTTPS through the service entry",
                ),
                Step::log("Route HTTPS to edition.cnn.com through the egress gateway"),
                Step::apply(CNN_GATEWAY_HTTPS),
                Step::settle(20),
                Step::check(
                    cnn_politics("https"),
                    served_directly(),
                    "HTTPS through the egress gateway",
                ),
            ],
        )
        .cleanup(vec![
            Step::delete(CNN_GATEWAY_HTTPS),
            Step::delete(CNN_GATEWAY),
            Step::delete(CNN_SERVICE_ENTRY_TLS),
            Step::delete(CNN_SERVICE_ENTRY),
            Step::Uninstall(App::sleep()),
            Step::settle(20),
        ])
}
