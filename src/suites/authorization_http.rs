//! RBAC over HTTP: deny everything, then open GET service by service.

use crate::apps::App;
use crate::manifests::authorization::{
    DENY_ALL, DETAILS_GET, PRODUCTPAGE_GET, RATINGS_GET, REVIEWS_GET,
};
use crate::probe::{Expectation, Probe};
use crate::scenario::{Action, Scenario, Step};

/// Scenario name
pub const NAME: &str = "authorization-http";

const PRODUCTPAGE: &str = "/productpage";
const DETAILS_ERROR: &str = "Error fetching product details";
const REVIEWS_ERROR: &str = "Error fetching product reviews";
const RATINGS_ERROR: &str = "Ratings service currently unavailable";

/// Build the scenario
pub fn scenario() -> Scenario {
    let productpage = || Probe::ingress(PRODUCTPAGE);

    Scenario::new(NAME, "Authorization policies for HTTP traffic on bookinfo")
        .setup(vec![
            Step::log("Enable control plane mTLS"),
            Step::Action(Action::SetControlPlaneMtls(true)),
            Step::Install(App::bookinfo(true)),
        ])
        .case(
            "rbac-deny-all-http",
            vec![
                Step::log("Deny all requests to bookinfo"),
                Step::apply(DENY_ALL),
                Step::settle(10),
                Step::check(
                    productpage(),
                    Expectation::contains("RBAC: access denied"),
                    "deny-all policy",
                ),
            ],
        )
        .case(
            "rbac-allow-get-http",
            vec![
                Step::log("Allow GET to productpage"),
                Step::apply(PRODUCTPAGE_GET),
                Step::settle(10),
                Step::Warmup(productpage()),
                Step::check(
                    productpage(),
                    Expectation::contains_all([DETAILS_ERROR, REVIEWS_ERROR]),
                    "productpage GET policy",
                ),
                Step::log("Allow GET to details, reviews and ratings"),
                Step::apply(DETAILS_GET),
                Step::apply(REVIEWS_GET),
                Step::apply(RATINGS_GET),
                Step::settle(50),
                Step::Warmup(productpage()),
                Step::check(
                    productpage(),
                    Expectation::absent_all([DETAILS_ERROR, REVIEWS_ERROR, RATINGS_ERROR]),
                    "GET policies for every service",
                ),
            ],
        )
        .cleanup(vec![
            Step::delete(DETAILS_GET),
            Step::delete(REVIEWS_GET),
            Step::delete(RATINGS_GET),
            Step::delete(PRODUCTPAGE_GET),
            Step::delete(DENY_ALL),
            Step::settle(20),
            Step::Uninstall(App::bookinfo(true)),
            Step::Action(Action::SetControlPlaneMtls(false)),
            Step::settle(20),
        ])
}
