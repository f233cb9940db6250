//! Executes scenarios step by step against the cluster.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::report::{CaseReport, ScenarioReport, SuiteReport};
use super::{Action, Case, Namespace, Scenario, Step};
use crate::config::RunnerConfig;
use crate::kubectl::Kubectl;
use crate::manifests::control_plane_mtls_patch;
use crate::probe::{excerpt, HttpProber, HttpTarget, Probe};
use crate::{Error, Result};

/// Probe output kept in a failure message
const OUTPUT_EXCERPT: usize = 400;

const INGRESS_GATEWAY: &str = "istio-ingressgateway";

/// What a probe saw: its output, and for exec probes that exited non-zero,
/// why the command failed.
struct Observed {
    output: String,
    failure: Option<String>,
}

/// Runs scenarios and produces reports.
///
/// One runner resolves the ingress host at most once, on the first ingress
/// probe, and reuses it for every later scenario.
pub struct Runner {
    kubectl: Kubectl,
    prober: Arc<dyn HttpProber>,
    config: RunnerConfig,
    ingress_host: OnceCell<String>,
}

impl Runner {
    /// Create a runner
    pub fn new(kubectl: Kubectl, prober: Arc<dyn HttpProber>, config: RunnerConfig) -> Self {
        Self {
            kubectl,
            prober,
            config,
            ingress_host: OnceCell::new(),
        }
    }

    /// Run every scenario in order
    pub async fn run_all(&self, scenarios: &[Scenario]) -> SuiteReport {
        let mut report = SuiteReport::new();
        for scenario in scenarios {
            report.scenarios.push(self.run(scenario).await);
        }
        report
    }

    /// Run setup, every case, then cleanup
    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let start = Instant::now();
        info!(scenario = scenario.name, "Starting scenario");

        let setup = guarded(self.run_steps(&scenario.setup)).await;
        let (setup_error, cases) = match setup {
            Ok(()) => {
                let mut cases = Vec::with_capacity(scenario.cases.len());
                for case in &scenario.cases {
                    cases.push(self.run_case(scenario.name, case).await);
                }
                (None, cases)
            }
            Err(err) => {
                error!(scenario = scenario.name, error = %err, "Setup failed, skipping cases");
                let failure = format!("setup failed: {}", err);
                let cases = scenario
                    .cases
                    .iter()
                    .map(|case| CaseReport::new(case.name, Duration::ZERO, vec![failure.clone()]))
                    .collect::<Vec<_>>();
                (Some(err), cases)
            }
        };

        let cleanup_errors = self.run_cleanup(scenario).await;

        let report = ScenarioReport {
            name: scenario.name.to_string(),
            setup_error,
            cases,
            cleanup_errors,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        info!(
            scenario = scenario.name,
            passed = report.passed(),
            duration_secs = report.duration_secs,
            "Finished scenario"
        );
        report
    }

    async fn run_case(&self, scenario: &str, case: &Case) -> CaseReport {
        let start = Instant::now();
        info!(scenario, case = case.name, "Running case");

        let failures = Mutex::new(Vec::new());
        let outcome = guarded(async {
            for step in &case.steps {
                self.run_case_step(step, &failures).await?;
            }
            Ok::<(), String>(())
        })
        .await;

        let mut failures = failures.into_inner().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = outcome {
            error!(scenario, case = case.name, error = %err, "Case aborted");
            failures.push(err);
        }
        let report = CaseReport::new(case.name, start.elapsed(), failures);
        if report.passed {
            info!(scenario, case = case.name, "Case passed");
        } else {
            error!(scenario, case = case.name, failures = report.failures.len(), "Case failed");
        }
        report
    }

    /// Check failures are recorded and the case continues; anything else
    /// aborts it.
    async fn run_case_step(
        &self,
        step: &Step,
        failures: &Mutex<Vec<String>>,
    ) -> std::result::Result<(), String> {
        match step {
            Step::Check {
                probe,
                expect,
                context,
            } => {
                let Observed { output, failure } = self.probe(probe).await.map_err(|e| {
                    format!("{}: probe {} failed: {}", context, probe, e)
                })?;
                if let Some(why) = failure {
                    error!(%probe, error = %why, "Probe command failed");
                    if let Ok(mut failures) = failures.lock() {
                        failures.push(format!("{}: {} exited unsuccessfully: {}", context, probe, why));
                    }
                }
                if expect.matches(&output) {
                    info!(%probe, expect = %expect.describe(), "Check passed");
                } else {
                    let failure = format!(
                        "{}: expected output of {} to be {}, got: {}",
                        context,
                        probe,
                        expect.describe(),
                        excerpt(&output, OUTPUT_EXCERPT)
                    );
                    error!(%probe, expect = %expect.describe(), "Check failed");
                    if let Ok(mut failures) = failures.lock() {
                        failures.push(failure);
                    }
                }
                Ok(())
            }
            other => self.execute(other).await.map_err(|e| e.to_string()),
        }
    }

    async fn run_steps(&self, steps: &[Step]) -> std::result::Result<(), String> {
        for step in steps {
            self.execute(step).await.map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    /// Attempt every cleanup step, collecting failures
    async fn run_cleanup(&self, scenario: &Scenario) -> Vec<String> {
        info!(scenario = scenario.name, steps = scenario.cleanup.len(), "Cleaning up");
        let mut errors = Vec::new();
        for step in &scenario.cleanup {
            let result =
                guarded(async { self.execute(step).await.map_err(|e| e.to_string()) }).await;
            if let Err(err) = result {
                warn!(scenario = scenario.name, error = %err, "Cleanup step failed, continuing");
                errors.push(err);
            }
        }
        errors
    }

    /// Execute one step. Outside a case a failed [`Step::Check`] is an error.
    async fn execute(&self, step: &Step) -> Result<()> {
        match step {
            Step::Log(message) => {
                info!("{}", message);
                Ok(())
            }
            Step::Install(app) => app.install(&self.kubectl, &self.config).await,
            Step::Uninstall(app) => app.uninstall(&self.kubectl, &self.config).await,
            Step::Apply {
                namespace,
                artifact,
            } => {
                let namespace = self.namespace(*namespace);
                info!(artifact = artifact.name, namespace, "Applying");
                self.kubectl.apply_contents(namespace, artifact.contents).await
            }
            Step::Delete {
                namespace,
                artifact,
            } => {
                let namespace = self.namespace(*namespace);
                info!(artifact = artifact.name, namespace, "Deleting");
                self.kubectl.delete_contents(namespace, artifact.contents).await
            }
            Step::Action(action) => self.perform(action).await,
            Step::Settle(wait) => {
                let wait = self.config.settle(*wait);
                debug!(wait_secs = wait.as_secs_f64(), "Settling");
                tokio::time::sleep(wait).await;
                Ok(())
            }
            Step::Warmup(probe) => {
                match self.probe(probe).await {
                    Ok(observed) => debug!(%probe, bytes = observed.output.len(), "Warmup done"),
                    Err(e) => debug!(%probe, error = %e, "Warmup failed, ignoring"),
                }
                Ok(())
            }
            Step::Check { probe, expect, .. } => {
                let Observed { output, failure } = self.probe(probe).await?;
                if let Some(why) = failure {
                    Err(Error::CheckFailed(format!("{} exited unsuccessfully: {}", probe, why)))
                } else if expect.matches(&output) {
                    Ok(())
                } else {
                    Err(Error::CheckFailed(format!(
                        "{} was not {}",
                        probe,
                        expect.describe()
                    )))
                }
            }
        }
    }

    async fn perform(&self, action: &Action) -> Result<()> {
        let cp = &self.config.control_plane;
        let ready_timeout = Duration::from_secs(cp.ready_timeout_secs);
        match action {
            Action::SetControlPlaneMtls(enabled) => {
                let smcp = format!("smcp/{}", cp.name);
                info!(enabled, control_plane = %smcp, "Setting control plane mTLS");
                self.kubectl
                    .patch_merge(&cp.namespace, &smcp, &control_plane_mtls_patch(*enabled))
                    .await?;
                self.kubectl
                    .wait_for(&cp.namespace, &smcp, "Ready", ready_timeout)
                    .await
            }
            Action::WaitMemberRoll => {
                let smmr = format!("smmr/{}", cp.member_roll);
                self.kubectl
                    .wait_for(&cp.namespace, &smmr, "Ready", ready_timeout)
                    .await
            }
            Action::CreateTlsSecret {
                namespace,
                name,
                key,
                cert,
            } => {
                self.kubectl
                    .create_tls_secret(
                        self.namespace(*namespace),
                        name,
                        &self.config.cert(key),
                        &self.config.cert(cert),
                    )
                    .await
            }
            Action::CreateGenericSecret {
                namespace,
                name,
                file,
            } => {
                self.kubectl
                    .create_generic_secret(self.namespace(*namespace), name, &self.config.cert(file))
                    .await
            }
            Action::DeleteSecret { namespace, name } => {
                self.kubectl.delete_secret(self.namespace(*namespace), name).await
            }
            Action::PatchDeploymentJson {
                namespace,
                deployment,
                patch,
            } => {
                info!(deployment, "Patching deployment");
                let resource = format!("deploy/{}", deployment);
                self.kubectl
                    .patch_json(self.namespace(*namespace), &resource, patch)
                    .await
            }
            Action::RolloutUndo {
                namespace,
                deployment,
            } => {
                info!(deployment, "Rolling back deployment");
                self.kubectl
                    .rollout_undo(self.namespace(*namespace), deployment)
                    .await
            }
            Action::RolloutHistory {
                namespace,
                deployment,
            } => {
                let history = self
                    .kubectl
                    .rollout_history(self.namespace(*namespace), deployment)
                    .await?;
                info!(deployment, "Rollout history:\n{}", history.trim_end());
                Ok(())
            }
            Action::ListPodFiles {
                namespace,
                selector,
                paths,
            } => {
                let namespace = self.namespace(*namespace);
                let pod = self.kubectl.pod_name(namespace, selector).await?;
                let command = format!("ls -al {}", paths.join(" "));
                let listing = self.kubectl.exec(namespace, &pod, None, &command).await?;
                info!(pod = %pod, "{}:\n{}", command, listing.trim_end());
                Ok(())
            }
        }
    }

    /// Issue a probe. A non-zero exec exit is reported in
    /// [`Observed::failure`] with the stdout kept; no pod, HTTP and spawn
    /// errors are `Err`.
    async fn probe(&self, probe: &Probe) -> Result<Observed> {
        match probe {
            Probe::Http { target } => {
                let url = match target {
                    HttpTarget::Url(url) => url.clone(),
                    HttpTarget::Ingress(path) => ingress_url(self.ingress_host().await?, path),
                };
                debug!(url = %url, "HTTP probe");
                let output = self.prober.get(&url).await?;
                Ok(Observed {
                    output,
                    failure: None,
                })
            }
            Probe::Exec {
                namespace,
                selector,
                container,
                command,
            } => {
                let pod = self.kubectl.pod_name(namespace, selector).await?;
                debug!(pod = %pod, command = %command, "Exec probe");
                let result = self
                    .kubectl
                    .exec_output(namespace, &pod, *container, command)
                    .await?;
                let failure = (!result.success()).then(|| {
                    format!("exit code {:?}: {}", result.code, result.stderr.trim())
                });
                Ok(Observed {
                    output: result.stdout,
                    failure,
                })
            }
        }
    }

    /// Ingress host: config override, else the OpenShift route, else the
    /// ingress service's load balancer address.
    pub async fn ingress_host(&self) -> Result<&str> {
        self.ingress_host
            .get_or_try_init(|| self.discover_ingress_host())
            .await
            .map(String::as_str)
    }

    async fn discover_ingress_host(&self) -> Result<String> {
        if let Some(host) = &self.config.ingress_host {
            info!(host = %host, "Using configured ingress host");
            return Ok(host.clone());
        }
        let namespace = &self.config.control_plane.namespace;
        let route = format!("route/{}", INGRESS_GATEWAY);
        match self.kubectl.jsonpath(namespace, &route, "{.spec.host}").await {
            Ok(host) if !host.is_empty() => {
                info!(host = %host, "Discovered ingress host from route");
                return Ok(host);
            }
            Ok(_) => debug!("Ingress route has no host"),
            Err(e) => debug!(error = %e, "No ingress route"),
        }
        let service = format!("svc/{}", INGRESS_GATEWAY);
        let host = self
            .kubectl
            .jsonpath(
                namespace,
                &service,
                "{.status.loadBalancer.ingress[0]['ip','hostname']}",
            )
            .await?;
        if host.is_empty() {
            return Err(Error::not_found(format!(
                "ingress host: neither {} nor {} in {} has an address",
                route, service, namespace
            )));
        }
        info!(host = %host, "Discovered ingress host from load balancer");
        Ok(host)
    }

    fn namespace(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::App => crate::APP_NAMESPACE,
            Namespace::ControlPlane => &self.config.control_plane.namespace,
        }
    }
}

fn ingress_url(host: &str, path: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}{}", host, path)
    } else {
        format!("http://{}{}", host, path)
    }
}

/// Run a fallible future, turning a panic into an error message
async fn guarded<F>(future: F) -> std::result::Result<(), String>
where
    F: std::future::Future<Output = std::result::Result<(), String>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let msg = if let Some(s) = panic.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(format!("PANIC: {}", msg))
        }
    }
}
