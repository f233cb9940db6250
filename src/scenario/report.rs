//! Pass/fail results for cases, scenarios and whole runs.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::Result;

/// Longest error line printed in the summary table
const SUMMARY_ERROR_LIMIT: usize = 200;

/// Outcome of one case
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CaseReport {
    /// Case name
    pub name: String,
    /// No failure was recorded
    pub passed: bool,
    /// Wall-clock time spent in the case
    pub duration_secs: f64,
    /// Failed checks, the aborting error or the panic, in order
    pub failures: Vec<String>,
}

impl CaseReport {
    pub(crate) fn new(name: &str, duration: Duration, failures: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: failures.is_empty(),
            duration_secs: duration.as_secs_f64(),
            failures,
        }
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScenarioReport {
    /// Scenario name
    pub name: String,
    /// Set when setup failed and the cases did not run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_error: Option<String>,
    /// One entry per case, in scenario order
    pub cases: Vec<CaseReport>,
    /// Cleanup steps that failed; informational only
    pub cleanup_errors: Vec<String>,
    /// Wall-clock time including setup and cleanup
    pub duration_secs: f64,
}

impl ScenarioReport {
    /// Setup succeeded and every case passed
    pub fn passed(&self) -> bool {
        self.setup_error.is_none() && self.cases.iter().all(|c| c.passed)
    }

    /// Names of failed cases
    pub fn failed_cases(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().filter(|c| !c.passed).map(|c| c.name.as_str())
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SuiteReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// One entry per scenario, in run order
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    /// Empty report stamped with the current time
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            scenarios: Vec::new(),
        }
    }

    /// Every case of every scenario passed
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(ScenarioReport::passed)
    }

    /// `(passed, failed)` case counts
    pub fn counts(&self) -> (usize, usize) {
        let cases = self.scenarios.iter().flat_map(|s| s.cases.iter());
        cases.fold((0, 0), |(p, f), c| if c.passed { (p + 1, f) } else { (p, f + 1) })
    }

    /// Log a PASS/FAIL table
    pub fn log_summary(&self) {
        let total: f64 = self.scenarios.iter().map(|s| s.duration_secs).sum();
        let (passed, failed) = self.counts();

        info!("========================================");
        info!("  MESH CONFORMANCE");
        info!("========================================");
        for scenario in &self.scenarios {
            info!("  {}", scenario.name);
            if let Some(err) = &scenario.setup_error {
                info!("    setup: {}", truncate(err));
            }
            for case in &scenario.cases {
                let tag = if case.passed { "PASS" } else { "FAIL" };
                info!("    {tag}  {:38} {:.1}s", case.name, case.duration_secs);
                for failure in &case.failures {
                    info!("          -> {}", truncate(failure));
                }
            }
            for err in &scenario.cleanup_errors {
                info!("    cleanup: {}", truncate(err));
            }
        }
        info!("----------------------------------------");
        info!("  {} passed, {} failed ({:.1}s total)", passed, failed, total);
        info!("========================================");
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(path, body)?;
        info!(path = %path.display(), "Wrote report");
        Ok(())
    }

    /// `Ok` when everything passed, otherwise an error naming the failed
    /// cases as `scenario/case`. A failed setup with no cases to mark shows
    /// up as `scenario/setup`.
    pub fn into_result(self) -> std::result::Result<Self, String> {
        if self.passed() {
            return Ok(self);
        }
        let names: Vec<String> = self
            .scenarios
            .iter()
            .flat_map(|s| {
                let setup = (s.setup_error.is_some() && s.cases.is_empty())
                    .then(|| format!("{}/setup", s.name));
                setup
                    .into_iter()
                    .chain(s.failed_cases().map(move |c| format!("{}/{}", s.name, c)))
            })
            .collect();
        Err(format!("{} case(s) failed: {}", names.len(), names.join(", ")))
    }
}

impl Default for SuiteReport {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate(message: &str) -> &str {
    crate::probe::excerpt(message, SUMMARY_ERROR_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str, cases: Vec<CaseReport>) -> ScenarioReport {
        ScenarioReport {
            name: name.to_string(),
            setup_error: None,
            cases,
            cleanup_errors: Vec::new(),
            duration_secs: 1.0,
        }
    }

    fn pass(name: &str) -> CaseReport {
        CaseReport::new(name, Duration::from_millis(1500), Vec::new())
    }

    fn fail(name: &str, why: &str) -> CaseReport {
        CaseReport::new(name, Duration::from_secs(2), vec![why.to_string()])
    }

    #[test]
    fn case_passes_only_without_failures() {
        assert!(pass("a").passed);
        assert!(!fail("a", "boom").passed);
        assert_eq!(pass("a").duration_secs, 1.5);
    }

    #[test]
    fn cleanup_errors_do_not_fail_a_scenario() {
        let mut report = scenario("egress-gateways", vec![pass("egress-gateway-http")]);
        report.cleanup_errors.push("kubectl exited with code Some(1)".to_string());
        assert!(report.passed());
    }

    #[test]
    fn setup_error_fails_a_scenario_without_cases() {
        let mut report = scenario("authorization-http", Vec::new());
        report.setup_error = Some("kubectl exited with code Some(1): forbidden".to_string());
        assert!(!report.passed());

        let mut suite = SuiteReport::new();
        suite.scenarios.push(report);
        assert!(!suite.passed());
        assert_eq!(
            suite.into_result().unwrap_err(),
            "1 case(s) failed: authorization-http/setup"
        );
    }

    #[test]
    fn into_result_names_failed_cases() {
        let mut suite = SuiteReport::new();
        suite.scenarios.push(scenario(
            "authorization-http",
            vec![pass("rbac-deny-all-http"), fail("rbac-allow-get-http", "no")],
        ));
        suite
            .scenarios
            .push(scenario("egress-gateways", vec![fail("egress-gateway-https", "no")]));

        assert_eq!(suite.counts(), (1, 2));
        let err = suite.into_result().unwrap_err();
        assert_eq!(
            err,
            "2 case(s) failed: authorization-http/rbac-allow-get-http, egress-gateways/egress-gateway-https"
        );
    }

    #[test]
    fn empty_run_passes() {
        let suite = SuiteReport::default();
        assert!(suite.passed());
        assert!(suite.into_result().is_ok());
    }

    #[test]
    fn json_report_omits_missing_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut suite = SuiteReport::new();
        suite.scenarios.push(scenario("egress-gateways", vec![pass("egress-gateway-http")]));
        suite.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let scenario = &value["scenarios"][0];
        assert!(scenario.get("setup_error").is_none());
        assert_eq!(scenario["cases"][0]["name"], "egress-gateway-http");
        assert_eq!(scenario["cases"][0]["passed"], true);
        assert!(value["started_at"].is_string());
    }

    #[test]
    fn summary_truncates_long_errors() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), SUMMARY_ERROR_LIMIT);
    }
}
