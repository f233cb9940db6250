//! The conformance scenarios, in the order `run` executes them.

mod authorization_http;
mod egress_gateways;
mod tls_origination;

use crate::scenario::Scenario;
use crate::{Error, Result};

pub use authorization_http::NAME as AUTHORIZATION_HTTP;
pub use egress_gateways::NAME as EGRESS_GATEWAYS;
pub use tls_origination::NAME as EGRESS_TLS_ORIGINATION_FILE_MOUNT;

/// Every scenario, in run order
pub fn all() -> Vec<Scenario> {
    vec![
        authorization_http::scenario(),
        egress_gateways::scenario(),
        tls_origination::scenario(),
    ]
}

/// Scenarios named in `names`, in run order; all of them when `names` is
/// empty. Unknown names are rejected before anything runs.
pub fn select(names: &[String]) -> Result<Vec<Scenario>> {
    let scenarios = all();
    if names.is_empty() {
        return Ok(scenarios);
    }
    let unknown: Vec<&str> = names
        .iter()
        .map(String::as_str)
        .filter(|name| !scenarios.iter().any(|s| s.name == *name))
        .collect();
    if !unknown.is_empty() {
        let known: Vec<&str> = scenarios.iter().map(|s| s.name).collect();
        return Err(Error::config(format!(
            "unknown scenario(s): {} (known: {})",
            unknown.join(", "),
            known.join(", ")
        )));
    }
    Ok(scenarios
        .into_iter()
        .filter(|s| names.iter().any(|n| n == s.name))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::Step;
    use std::collections::HashSet;

    fn names(scenarios: &[Scenario]) -> Vec<&'static str> {
        scenarios.iter().map(|s| s.name).collect()
    }

    #[test]
    fn all_runs_in_a_fixed_order() {
        assert_eq!(
            names(&all()),
            vec![
                AUTHORIZATION_HTTP,
                EGRESS_GATEWAYS,
                EGRESS_TLS_ORIGINATION_FILE_MOUNT
            ]
        );
    }

    #[test]
    fn select_keeps_run_order_regardless_of_argument_order() {
        let picked = select(&[
            EGRESS_TLS_ORIGINATION_FILE_MOUNT.to_string(),
            AUTHORIZATION_HTTP.to_string(),
        ])
        .unwrap();
        assert_eq!(
            names(&picked),
            vec![AUTHORIZATION_HTTP, EGRESS_TLS_ORIGINATION_FILE_MOUNT]
        );
        assert_eq!(select(&[]).unwrap().len(), 3);
    }

    #[test]
    fn select_rejects_unknown_names() {
        let err = select(&["egress-gateway".to_string()]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("egress-gateway"));
        assert!(err.to_string().contains(EGRESS_GATEWAYS));
    }

    #[test]
    fn every_applied_artifact_is_deleted_in_cleanup() {
        for scenario in all() {
            let cleaned: HashSet<&str> =
                scenario.cleaned_artifacts().iter().map(|a| a.name).collect();
            for artifact in scenario.applied_artifacts() {
                assert!(
                    cleaned.contains(artifact.name),
                    "{} leaves {} behind",
                    scenario.name,
                    artifact.name
                );
            }
        }
    }

    #[test]
    fn every_installed_app_is_uninstalled() {
        for scenario in all() {
            let installs = scenario
                .setup
                .iter()
                .filter(|s| matches!(s, Step::Install(_)))
                .count();
            let uninstalls = scenario
                .cleanup
                .iter()
                .filter(|s| matches!(s, Step::Uninstall(_)))
                .count();
            assert_eq!(installs, uninstalls, "{}", scenario.name);
        }
    }

    #[test]
    fn case_names_are_unique() {
        let scenarios = all();
        let cases: Vec<&str> = scenarios
            .iter()
            .flat_map(|s| s.cases.iter().map(|c| c.name))
            .collect();
        let unique: HashSet<&str> = cases.iter().copied().collect();
        assert_eq!(cases.len(), unique.len());
    }
}
