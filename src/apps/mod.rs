//! Example workloads the scenarios deploy into the mesh.
//!
//! Bookinfo and sleep come from the mesh's sample directory; nginx is built
//! from [`NGINX_SERVER`] plus certificates and a config file on disk.

use std::time::Duration;

use tracing::{info, warn};

use crate::config::RunnerConfig;
use crate::kubectl::Kubectl;
use crate::manifests::egress::{CA_CERTS_SECRET, NGINX_SERVER};
use crate::{Error, Result};

/// How long `kubectl wait` gives pods to become Ready after install
pub const POD_READY_TIMEOUT: Duration = Duration::from_secs(180);

const BOOKINFO_APP: &str = "bookinfo/platform/kube/bookinfo.yaml";
const BOOKINFO_GATEWAY: &str = "bookinfo/networking/bookinfo-gateway.yaml";
const BOOKINFO_RULES: &str = "bookinfo/networking/destination-rule-all.yaml";
const BOOKINFO_RULES_MTLS: &str = "bookinfo/networking/destination-rule-all-mtls.yaml";
const SLEEP_APP: &str = "sleep/sleep.yaml";

const NGINX_SERVER_SECRET: &str = "nginx-server-certs";
const NGINX_CONFIGMAP: &str = "nginx-configmap";
const NGINX_SERVER_KEY: &str = "nginx.example.com.key";
const NGINX_SERVER_CERT: &str = "nginx.example.com.crt";
/// CA that signed both the nginx server and client certificates
pub const CA_CERT: &str = "example.com.crt";
/// Client key presented by the egress gateway
pub const CLIENT_KEY: &str = "nginx-client.example.com.key";
/// Client certificate presented by the egress gateway
pub const CLIENT_CERT: &str = "nginx-client.example.com.crt";

/// Bookinfo sample application with its ingress gateway and destination rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bookinfo {
    /// Target namespace
    pub namespace: &'static str,
    /// Use the ISTIO_MUTUAL destination rules
    pub mtls: bool,
}

impl Bookinfo {
    fn files(&self) -> [&'static str; 3] {
        let rules = if self.mtls {
            BOOKINFO_RULES_MTLS
        } else {
            BOOKINFO_RULES
        };
        [BOOKINFO_APP, BOOKINFO_GATEWAY, rules]
    }

    /// Apply the manifests and wait for every pod in the namespace
    pub async fn install(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, mtls = self.mtls, "Deploying bookinfo");
        for file in self.files() {
            kubectl.apply_file(self.namespace, &config.sample(file)).await?;
        }
        kubectl
            .wait_pods_ready(self.namespace, None, POD_READY_TIMEOUT)
            .await
    }

    /// Delete the manifests in reverse order
    pub async fn uninstall(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, "Removing bookinfo");
        let mut errors = Vec::new();
        for file in self.files().iter().rev() {
            if let Err(e) = kubectl.delete_file(self.namespace, &config.sample(file)).await {
                errors.push(e);
            }
        }
        all_removed(errors)
    }
}

/// The sleep client pod used to issue in-mesh curl probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleep {
    /// Target namespace
    pub namespace: &'static str,
}

impl Sleep {
    /// Label selector of the sleep pod
    pub const SELECTOR: &'static str = "app=sleep";
    /// Container that carries curl
    pub const CONTAINER: &'static str = "sleep";

    /// Apply the sample and wait for the pod
    pub async fn install(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, "Deploying sleep");
        kubectl
            .apply_file(self.namespace, &config.sample(SLEEP_APP))
            .await?;
        kubectl
            .wait_pods_ready(self.namespace, Some(Self::SELECTOR), POD_READY_TIMEOUT)
            .await
    }

    /// Delete the sample
    pub async fn uninstall(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, "Removing sleep");
        kubectl
            .delete_file(self.namespace, &config.sample(SLEEP_APP))
            .await
    }
}

/// TLS nginx server that requires client certificates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nginx {
    /// Target namespace
    pub namespace: &'static str,
}

impl Nginx {
    /// Label selector of the nginx pod
    pub const SELECTOR: &'static str = "run=my-nginx";

    /// Create certificates and config, deploy the server, wait for the pod
    pub async fn install(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, conf = %config.nginx_conf.display(), "Deploying nginx");
        kubectl
            .create_tls_secret(
                self.namespace,
                NGINX_SERVER_SECRET,
                &config.cert(NGINX_SERVER_KEY),
                &config.cert(NGINX_SERVER_CERT),
            )
            .await?;
        kubectl
            .create_generic_secret(self.namespace, CA_CERTS_SECRET, &config.cert(CA_CERT))
            .await?;
        kubectl
            .create_configmap_from_file(
                self.namespace,
                NGINX_CONFIGMAP,
                "nginx.conf",
                &config.nginx_conf,
            )
            .await?;
        kubectl
            .apply_contents(self.namespace, NGINX_SERVER.contents)
            .await?;
        kubectl
            .wait_pods_ready(self.namespace, Some(Self::SELECTOR), POD_READY_TIMEOUT)
            .await
    }

    /// Remove the server, its config and its secrets
    pub async fn uninstall(&self, kubectl: &Kubectl, _config: &RunnerConfig) -> Result<()> {
        info!(namespace = self.namespace, "Removing nginx");
        let results = [
            kubectl
                .delete_contents(self.namespace, NGINX_SERVER.contents)
                .await,
            kubectl
                .delete_configmap(self.namespace, NGINX_CONFIGMAP)
                .await,
            kubectl
                .delete_secret(self.namespace, NGINX_SERVER_SECRET)
                .await,
            kubectl.delete_secret(self.namespace, CA_CERTS_SECRET).await,
        ];
        all_removed(results.into_iter().filter_map(Result::err).collect())
    }
}

/// `Ok` when every removal succeeded, else one error naming all failures
fn all_removed(errors: Vec<Error>) -> Result<()> {
    if errors.is_empty() {
        return Ok(());
    }
    for e in &errors {
        warn!(error = %e, "Removal failed");
    }
    let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
    Err(Error::Cleanup(messages.join("; ")))
}

/// Workload referenced by scenario steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum App {
    /// Bookinfo sample
    Bookinfo(Bookinfo),
    /// sleep client
    Sleep(Sleep),
    /// nginx TLS server
    Nginx(Nginx),
}

impl App {
    /// Bookinfo in the default application namespace
    pub fn bookinfo(mtls: bool) -> Self {
        App::Bookinfo(Bookinfo {
            namespace: crate::APP_NAMESPACE,
            mtls,
        })
    }

    /// sleep in the default application namespace
    pub fn sleep() -> Self {
        App::Sleep(Sleep {
            namespace: crate::APP_NAMESPACE,
        })
    }

    /// nginx in the default application namespace
    pub fn nginx() -> Self {
        App::Nginx(Nginx {
            namespace: crate::APP_NAMESPACE,
        })
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            App::Bookinfo(_) => "bookinfo",
            App::Sleep(_) => "sleep",
            App::Nginx(_) => "nginx",
        }
    }

    /// Install the workload
    pub async fn install(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        match self {
            App::Bookinfo(app) => app.install(kubectl, config).await,
            App::Sleep(app) => app.install(kubectl, config).await,
            App::Nginx(app) => app.install(kubectl, config).await,
        }
    }

    /// Remove the workload
    pub async fn uninstall(&self, kubectl: &Kubectl, config: &RunnerConfig) -> Result<()> {
        match self {
            App::Bookinfo(app) => app.uninstall(kubectl, config).await,
            App::Sleep(app) => app.uninstall(kubectl, config).await,
            App::Nginx(app) => app.uninstall(kubectl, config).await,
        }
    }
}
