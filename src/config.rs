//! Runner configuration.
//!
//! Resolution order (highest priority last wins):
//! 1. Built-in defaults
//! 2. YAML file passed with `--config`
//! 3. `MESH_*` environment variables
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment overrides, applied after the config file.
pub const ENV_KUBECONFIG: &str = "MESH_KUBECONFIG";
/// Ingress gateway host override
pub const ENV_INGRESS_HOST: &str = "MESH_INGRESS_HOST";
/// Convergence wait multiplier override
pub const ENV_SETTLE_SCALE: &str = "MESH_SETTLE_SCALE";
/// Sample manifest directory override
pub const ENV_SAMPLES_DIR: &str = "MESH_SAMPLES_DIR";
/// Certificate directory override
pub const ENV_CERTS_DIR: &str = "MESH_CERTS_DIR";
/// JSON report destination override
pub const ENV_REPORT_PATH: &str = "MESH_REPORT_PATH";

/// Where the mesh control plane lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ControlPlaneConfig {
    /// Control plane namespace
    pub namespace: String,
    /// ServiceMeshControlPlane name
    pub name: String,
    /// ServiceMeshMemberRoll name
    pub member_roll: String,
    /// Timeout handed to `kubectl wait`
    pub ready_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            namespace: crate::MESH_NAMESPACE.to_string(),
            name: "basic".to_string(),
            member_roll: "default".to_string(),
            ready_timeout_secs: 180,
        }
    }
}

/// Complete runner configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Cluster CLI binary (`kubectl` or `oc`)
    pub kubectl: String,
    /// Explicit kubeconfig; the CLI's own resolution is used when unset
    pub kubeconfig: Option<PathBuf>,
    /// Mesh control plane location
    pub control_plane: ControlPlaneConfig,
    /// Ingress gateway host; discovered from the cluster when unset
    pub ingress_host: Option<String>,
    /// Root of the mesh sample manifests (bookinfo, sleep)
    pub samples_dir: PathBuf,
    /// Directory holding the nginx server, client and CA certificates
    pub certs_dir: PathBuf,
    /// nginx server configuration mounted into the my-nginx pod
    pub nginx_conf: PathBuf,
    /// Multiplier applied to every fixed convergence wait
    pub settle_scale: f64,
    /// Deadline for a single CLI invocation
    pub command_timeout_secs: u64,
    /// Deadline for a single HTTP probe
    pub http_timeout_secs: u64,
    /// Where to write the JSON report
    pub report_path: Option<PathBuf>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            kubeconfig: None,
            control_plane: ControlPlaneConfig::default(),
            ingress_host: None,
            samples_dir: PathBuf::from("samples"),
            certs_dir: PathBuf::from("sampleCerts/nginx.example.com"),
            nginx_conf: PathBuf::from("testdata/nginx/nginx_ssl.conf"),
            settle_scale: 1.0,
            command_timeout_secs: 300,
            http_timeout_secs: 30,
            report_path: None,
        }
    }
}

impl RunnerConfig {
    /// Load from an optional YAML file, then apply `MESH_*` environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file without overrides or validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data)
            .map_err(|e| Error::config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Apply overrides from a key lookup (the process environment in
    /// [`RunnerConfig::load`]). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(ENV_KUBECONFIG) {
            self.kubeconfig = Some(PathBuf::from(v));
        }
        if let Some(v) = get(ENV_INGRESS_HOST) {
            self.ingress_host = Some(v);
        }
        if let Some(v) = get(ENV_SETTLE_SCALE) {
            self.settle_scale = v.trim().parse().map_err(|_| {
                Error::config(format!("{} must be a number, got '{}'", ENV_SETTLE_SCALE, v))
            })?;
        }
        if let Some(v) = get(ENV_SAMPLES_DIR) {
            self.samples_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_CERTS_DIR) {
            self.certs_dir = PathBuf::from(v);
        }
        if let Some(v) = get(ENV_REPORT_PATH) {
            self.report_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Reject values that would make the runner misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.kubectl.trim().is_empty() {
            return Err(Error::config("kubectl binary must not be empty"));
        }
        if !self.settle_scale.is_finite() || self.settle_scale < 0.0 {
            return Err(Error::config(format!(
                "settleScale must be a non-negative number, got {}",
                self.settle_scale
            )));
        }
        if self.command_timeout_secs == 0 {
            return Err(Error::config("commandTimeoutSecs must be greater than 0"));
        }
        if self.http_timeout_secs == 0 {
            return Err(Error::config("httpTimeoutSecs must be greater than 0"));
        }
        if self.control_plane.ready_timeout_secs == 0 {
            return Err(Error::config(
                "controlPlane.readyTimeoutSecs must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Scale a fixed convergence wait.
    pub fn settle(&self, wait: Duration) -> Duration {
        wait.mul_f64(self.settle_scale)
    }

    /// Deadline for one CLI invocation
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Deadline for one HTTP probe
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Resolve a path under the samples directory
    pub fn sample(&self, relative: &str) -> PathBuf {
        self.samples_dir.join(relative)
    }

    /// Resolve a path under the certificate directory
    pub fn cert(&self, file: &str) -> PathBuf {
        self.certs_dir.join(file)
    }
}
