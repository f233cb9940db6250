//! Thin wrapper over the cluster CLI (`kubectl` or `oc`).
//!
//! Every call goes through [`Kubectl::execute`], which prepends
//! `--kubeconfig`, turns non-zero exits into [`Error::CommandFailed`] and
//! retries API-server hiccups. "AlreadyExists" is treated as success since
//! the desired state is already there.

mod runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

#[cfg(test)]
pub use runner::MockCommandRunner;
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};

use crate::config::RunnerConfig;
use crate::retry::{retry_transient, RetryPolicy};
use crate::{Error, Result};

/// Extra room given to the process deadline on top of a `kubectl wait` timeout
const WAIT_GRACE: Duration = Duration::from_secs(30);

/// Cluster CLI handle shared by apps, actions and probes.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    program: String,
    kubeconfig: Option<PathBuf>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl std::fmt::Debug for Kubectl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kubectl")
            .field("program", &self.program)
            .field("kubeconfig", &self.kubeconfig)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn is_already_exists(stderr: &str) -> bool {
    stderr.contains("AlreadyExists") || stderr.contains("already exists")
}

impl Kubectl {
    /// Create a handle using the config's binary, kubeconfig and timeout
    pub fn new(runner: Arc<dyn CommandRunner>, config: &RunnerConfig) -> Self {
        Self {
            runner,
            program: config.kubectl.clone(),
            kubeconfig: config.kubeconfig.clone(),
            timeout: config.command_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for transient failures
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn invocation(&self, args: &[&str], stdin: Option<&str>, timeout: Duration) -> Invocation {
        let mut all = Vec::with_capacity(args.len() + 2);
        if let Some(kubeconfig) = &self.kubeconfig {
            all.push("--kubeconfig".to_string());
            all.push(path_arg(kubeconfig));
        }
        all.extend(args.iter().map(|a| a.to_string()));
        Invocation {
            program: self.program.clone(),
            args: all,
            stdin: stdin.map(str::to_string),
            timeout,
        }
    }

    async fn execute(&self, invocation: Invocation, retry: &RetryPolicy) -> Result<String> {
        let operation = invocation
            .args
            .iter()
            .find(|a| !a.starts_with('-') && Some(a.as_str()) != self.kubeconfig_arg())
            .cloned()
            .unwrap_or_else(|| self.program.clone());
        let tolerate_existing = matches!(operation.as_str(), "create" | "apply");

        retry_transient(retry, &operation, || {
            let runner = self.runner.clone();
            let invocation = invocation.clone();
            async move {
                let output = runner.run(&invocation).await?;
                if output.success() {
                    return Ok(output.stdout);
                }
                if tolerate_existing && is_already_exists(&output.stderr) {
                    debug!(command = %invocation, "Resource already exists");
                    return Ok(output.stdout);
                }
                Err(Error::CommandFailed {
                    program: invocation.program.clone(),
                    code: output.code,
                    stderr: output.stderr.trim().to_string(),
                })
            }
        })
        .await
    }

    fn kubeconfig_arg(&self) -> Option<&str> {
        self.kubeconfig.as_deref().and_then(Path::to_str)
    }

    /// Run arbitrary CLI arguments and return stdout
    pub async fn run(&self, args: &[&str]) -> Result<String> {
        let invocation = self.invocation(args, None, self.timeout);
        self.execute(invocation, &self.retry).await
    }

    /// Run CLI arguments with `stdin` piped in
    pub async fn run_with_stdin(&self, args: &[&str], stdin: &str) -> Result<String> {
        let invocation = self.invocation(args, Some(stdin), self.timeout);
        self.execute(invocation, &self.retry).await
    }

    /// `kubectl apply -f -` of a manifest text
    pub async fn apply_contents(&self, namespace: &str, contents: &str) -> Result<()> {
        self.run_with_stdin(&["apply", "-n", namespace, "-f", "-"], contents)
            .await
            .map(drop)
    }

    /// `kubectl delete -f -` of a manifest text; missing objects are ignored
    pub async fn delete_contents(&self, namespace: &str, contents: &str) -> Result<()> {
        self.run_with_stdin(
            &["delete", "-n", namespace, "--ignore-not-found", "-f", "-"],
            contents,
        )
        .await
        .map(drop)
    }

    /// Apply a manifest file
    pub async fn apply_file(&self, namespace: &str, path: &Path) -> Result<()> {
        let file = path_arg(path);
        self.run(&["apply", "-n", namespace, "-f", &file])
            .await
            .map(drop)
    }

    /// Delete everything in a manifest file; missing objects are ignored
    pub async fn delete_file(&self, namespace: &str, path: &Path) -> Result<()> {
        let file = path_arg(path);
        self.run(&["delete", "-n", namespace, "--ignore-not-found", "-f", &file])
            .await
            .map(drop)
    }

    /// Merge-patch a resource (`kind/name`)
    pub async fn patch_merge(
        &self,
        namespace: &str,
        resource: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        let body = serde_json::to_string(patch)?;
        self.run(&["patch", "-n", namespace, resource, "--type", "merge", "-p", &body])
            .await
            .map(drop)
    }

    /// JSON-patch a resource (`kind/name`)
    pub async fn patch_json(
        &self,
        namespace: &str,
        resource: &str,
        patch: &serde_json::Value,
    ) -> Result<()> {
        let body = serde_json::to_string(patch)?;
        self.run(&["patch", "-n", namespace, resource, "--type=json", "-p", &body])
            .await
            .map(drop)
    }

    /// `kubectl wait --for condition=<condition>` on a single resource
    pub async fn wait_for(
        &self,
        namespace: &str,
        resource: &str,
        condition: &str,
        timeout: Duration,
    ) -> Result<()> {
        info!(namespace, resource, condition, "Waiting for condition");
        let for_arg = format!("condition={}", condition);
        let timeout_arg = format!("{}s", timeout.as_secs());
        let args = [
            "wait",
            "-n",
            namespace,
            "--for",
            &for_arg,
            resource,
            "--timeout",
            &timeout_arg,
        ];
        let invocation = self.invocation(&args, None, self.timeout.max(timeout + WAIT_GRACE));
        self.execute(invocation, &self.retry).await.map(drop)
    }

    /// Wait for pods to be Ready: those matching `selector`, or all pods in
    /// the namespace when `selector` is `None`.
    pub async fn wait_pods_ready(
        &self,
        namespace: &str,
        selector: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let timeout_arg = format!("{}s", timeout.as_secs());
        let mut args = vec!["wait", "-n", namespace, "--for=condition=Ready", "pod"];
        match selector {
            Some(selector) => {
                args.push("-l");
                args.push(selector);
            }
            None => args.push("--all"),
        }
        args.push("--timeout");
        args.push(&timeout_arg);
        let invocation = self.invocation(&args, None, self.timeout.max(timeout + WAIT_GRACE));
        self.execute(invocation, &self.retry).await.map(drop)
    }

    /// Roll a deployment back to its previous revision
    pub async fn rollout_undo(&self, namespace: &str, deployment: &str) -> Result<()> {
        let resource = format!("deploy/{}", deployment);
        self.run(&["rollout", "undo", "-n", namespace, &resource])
            .await
            .map(drop)
    }

    /// Revision history of a deployment
    pub async fn rollout_history(&self, namespace: &str, deployment: &str) -> Result<String> {
        let resource = format!("deploy/{}", deployment);
        self.run(&["rollout", "history", "-n", namespace, &resource])
            .await
    }

    /// Create a `kubernetes.io/tls` secret from a key/cert pair
    pub async fn create_tls_secret(
        &self,
        namespace: &str,
        name: &str,
        key: &Path,
        cert: &Path,
    ) -> Result<()> {
        let (key, cert) = (path_arg(key), path_arg(cert));
        self.run(&[
            "create", "-n", namespace, "secret", "tls", name, "--key", &key, "--cert", &cert,
        ])
        .await
        .map(drop)
    }

    /// Create an opaque secret holding a single file
    pub async fn create_generic_secret(
        &self,
        namespace: &str,
        name: &str,
        from_file: &Path,
    ) -> Result<()> {
        let from = format!("--from-file={}", path_arg(from_file));
        self.run(&["create", "-n", namespace, "secret", "generic", name, &from])
            .await
            .map(drop)
    }

    /// Delete a secret; a missing secret is not an error
    pub async fn delete_secret(&self, namespace: &str, name: &str) -> Result<()> {
        self.run(&["delete", "-n", namespace, "secret", name, "--ignore-not-found"])
            .await
            .map(drop)
    }

    /// Create a ConfigMap with one entry `key` read from `path`
    pub async fn create_configmap_from_file(
        &self,
        namespace: &str,
        name: &str,
        key: &str,
        path: &Path,
    ) -> Result<()> {
        let from = format!("--from-file={}={}", key, path_arg(path));
        self.run(&["create", "-n", namespace, "configmap", name, &from])
            .await
            .map(drop)
    }

    /// Delete a ConfigMap; a missing ConfigMap is not an error
    pub async fn delete_configmap(&self, namespace: &str, name: &str) -> Result<()> {
        self.run(&["delete", "-n", namespace, "configmap", name, "--ignore-not-found"])
            .await
            .map(drop)
    }

    /// Evaluate a jsonpath expression against a resource
    pub async fn jsonpath(&self, namespace: &str, resource: &str, expr: &str) -> Result<String> {
        let output = format!("jsonpath={}", expr);
        self.run(&["get", "-n", namespace, resource, "-o", &output])
            .await
            .map(|s| s.trim().to_string())
    }

    /// Name of the first running pod matching `selector`
    pub async fn pod_name(&self, namespace: &str, selector: &str) -> Result<String> {
        let names = self
            .run(&[
                "get",
                "pods",
                "-n",
                namespace,
                "-l",
                selector,
                "--field-selector=status.phase=Running",
                "-o",
                "jsonpath={.items[*].metadata.name}",
            ])
            .await?;
        names
            .split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| {
                Error::not_found(format!("no running pod matches {} in {}", selector, namespace))
            })
    }

    fn exec_invocation(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        command: &str,
    ) -> Invocation {
        let mut args = vec!["exec", "-n", namespace, pod];
        if let Some(container) = container {
            args.push("-c");
            args.push(container);
        }
        args.extend(["--", "sh", "-c", command]);
        self.invocation(&args, None, self.timeout)
    }

    /// Run a shell command inside a pod and return its stdout.
    ///
    /// Not retried: the command is usually the probe itself.
    pub async fn exec(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        command: &str,
    ) -> Result<String> {
        let invocation = self.exec_invocation(namespace, pod, container, command);
        self.execute(invocation, &RetryPolicy::none()).await
    }

    /// Like [`Kubectl::exec`], but a non-zero exit is not an error: the
    /// captured output comes back with its exit code. Only spawn failures
    /// and timeouts are errors.
    pub async fn exec_output(
        &self,
        namespace: &str,
        pod: &str,
        container: Option<&str>,
        command: &str,
    ) -> Result<CommandOutput> {
        let invocation = self.exec_invocation(namespace, pod, container, command);
        debug!(command = %invocation, "Exec");
        self.runner.run(&invocation).await
    }
}
