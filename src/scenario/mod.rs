//! Scenario model: setup steps, named cases, and a cleanup list that always
//! runs.
//!
//! ```text
//! setup ──► case 1 ──► case 2 ──► … ──► cleanup
//!   │ (error: cases marked failed, not run)   ▲
//!   └─────────────────────────────────────────┘
//! ```
//!
//! Inside a case, a failed [`Step::Check`] is recorded and the case keeps
//! going, as is an exec probe whose command exits non-zero. Any other step
//! error aborts the case.

mod report;
mod runner;

use std::time::Duration;

use serde_json::Value;

pub use report::{CaseReport, ScenarioReport, SuiteReport};
pub use runner::Runner;

use crate::apps::App;
use crate::manifests::PolicyArtifact;
use crate::probe::{Expectation, Probe};

/// Namespace a step targets, resolved against the config at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    /// Namespace holding the example workloads
    App,
    /// Mesh control plane namespace (`controlPlane.namespace`)
    ControlPlane,
}

/// Cluster operations that are not plain artifact apply/delete
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Patch data/control plane mTLS on the SMCP and wait for Ready
    SetControlPlaneMtls(bool),
    /// Wait for the member roll to be Ready
    WaitMemberRoll,
    /// Create a TLS secret from files in the certificate directory
    CreateTlsSecret {
        /// Target namespace
        namespace: Namespace,
        /// Secret name
        name: &'static str,
        /// Key file name under `certsDir`
        key: &'static str,
        /// Certificate file name under `certsDir`
        cert: &'static str,
    },
    /// Create a generic secret from one file in the certificate directory
    CreateGenericSecret {
        /// Target namespace
        namespace: Namespace,
        /// Secret name
        name: &'static str,
        /// File name under `certsDir`
        file: &'static str,
    },
    /// Delete a secret if present
    DeleteSecret {
        /// Target namespace
        namespace: Namespace,
        /// Secret name
        name: &'static str,
    },
    /// Apply a JSON patch to a deployment
    PatchDeploymentJson {
        /// Target namespace
        namespace: Namespace,
        /// Deployment name
        deployment: &'static str,
        /// JSON patch document
        patch: Value,
    },
    /// Roll a deployment back one revision
    RolloutUndo {
        /// Target namespace
        namespace: Namespace,
        /// Deployment name
        deployment: &'static str,
    },
    /// Log a deployment's rollout history
    RolloutHistory {
        /// Target namespace
        namespace: Namespace,
        /// Deployment name
        deployment: &'static str,
    },
    /// Log `ls -al` of paths inside the first pod matching `selector`
    ListPodFiles {
        /// Target namespace
        namespace: Namespace,
        /// Pod label selector
        selector: &'static str,
        /// Paths to list
        paths: Vec<&'static str>,
    },
}

/// One instruction in a scenario
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Progress message
    Log(String),
    /// Deploy an example workload
    Install(App),
    /// Remove an example workload
    Uninstall(App),
    /// Apply a policy artifact
    Apply {
        /// Target namespace
        namespace: Namespace,
        /// Artifact to apply
        artifact: PolicyArtifact,
    },
    /// Delete a policy artifact
    Delete {
        /// Target namespace
        namespace: Namespace,
        /// Artifact to delete
        artifact: PolicyArtifact,
    },
    /// Any other cluster operation
    Action(Action),
    /// Fixed convergence wait, scaled by `settleScale`
    Settle(Duration),
    /// Issue a probe and discard its output and errors
    Warmup(Probe),
    /// Issue a probe and check its output
    Check {
        /// Probe to issue
        probe: Probe,
        /// What the output must satisfy
        expect: Expectation,
        /// What the check verifies, used in failure messages
        context: String,
    },
}

impl Step {
    /// Progress message
    pub fn log(message: impl Into<String>) -> Self {
        Step::Log(message.into())
    }

    /// Apply an artifact in the application namespace
    pub fn apply(artifact: PolicyArtifact) -> Self {
        Step::Apply {
            namespace: Namespace::App,
            artifact,
        }
    }

    /// Delete an artifact from the application namespace
    pub fn delete(artifact: PolicyArtifact) -> Self {
        Step::Delete {
            namespace: Namespace::App,
            artifact,
        }
    }

    /// Fixed wait of `secs` seconds
    pub fn settle(secs: u64) -> Self {
        Step::Settle(Duration::from_secs(secs))
    }

    /// Probe and check
    pub fn check(probe: Probe, expect: Expectation, context: impl Into<String>) -> Self {
        Step::Check {
            probe,
            expect,
            context: context.into(),
        }
    }
}

/// A named sequence of steps reported as one pass/fail result
#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Case name
    pub name: &'static str,
    /// Steps in order
    pub steps: Vec<Step>,
}

/// Setup, cases and unconditional cleanup
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    /// Scenario name, used for selection on the command line
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Steps run before any case
    pub setup: Vec<Step>,
    /// Cases in order
    pub cases: Vec<Case>,
    /// Steps run last, whatever happened before
    pub cleanup: Vec<Step>,
}

impl Scenario {
    /// Empty scenario
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            setup: Vec::new(),
            cases: Vec::new(),
            cleanup: Vec::new(),
        }
    }

    /// Set the setup steps
    pub fn setup(mut self, steps: Vec<Step>) -> Self {
        self.setup = steps;
        self
    }

    /// Append a case
    pub fn case(mut self, name: &'static str, steps: Vec<Step>) -> Self {
        self.cases.push(Case { name, steps });
        self
    }

    /// Set the cleanup steps
    pub fn cleanup(mut self, steps: Vec<Step>) -> Self {
        self.cleanup = steps;
        self
    }

    /// Artifacts applied anywhere in the scenario
    pub fn applied_artifacts(&self) -> Vec<PolicyArtifact> {
        self.setup
            .iter()
            .chain(self.cases.iter().flat_map(|c| c.steps.iter()))
            .filter_map(|step| match step {
                Step::Apply { artifact, .. } => Some(*artifact),
                _ => None,
            })
            .collect()
    }

    /// Artifacts deleted by the cleanup list
    pub fn cleaned_artifacts(&self) -> Vec<PolicyArtifact> {
        self.cleanup
            .iter()
            .filter_map(|step| match step {
                Step::Delete { artifact, .. } => Some(*artifact),
                _ => None,
            })
            .collect()
    }
}
