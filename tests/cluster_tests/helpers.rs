//! Shared fakes and setup for the integration tests

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use mesh_conformance::config::RunnerConfig;
use mesh_conformance::kubectl::{CommandOutput, CommandRunner, Invocation, Kubectl};
use mesh_conformance::probe::HttpProber;
use mesh_conformance::retry::RetryPolicy;
use mesh_conformance::scenario::Runner;
use mesh_conformance::Result;

/// Initialise tracing once per test binary
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

type Respond = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

/// CLI fake that records every invocation and answers from a closure
pub struct ScriptedRunner {
    calls: Mutex<Vec<Invocation>>,
    respond: Respond,
}

impl ScriptedRunner {
    pub fn new<F>(respond: F) -> Arc<Self>
    where
        F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Manifest text of every `kubectl delete` fed through stdin, in order
    pub fn deleted_contents(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|inv| inv.has_arg("delete"))
            .filter_map(|inv| inv.stdin)
            .collect()
    }

    /// Invocations whose arguments include every one of `args`
    pub fn matching(&self, args: &[&str]) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|inv| args.iter().all(|a| inv.has_arg(a)))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        Ok((self.respond)(invocation))
    }
}

/// Shell command of a `kubectl exec ... -- sh -c <command>` invocation
pub fn exec_command(invocation: &Invocation) -> Option<&str> {
    if invocation.has_arg("exec") {
        invocation.args.last().map(String::as_str)
    } else {
        None
    }
}

/// HTTP fake returning the same body for every URL
pub struct CannedProber {
    body: String,
    urls: Mutex<Vec<String>>,
}

impl CannedProber {
    pub fn new(body: &str) -> Arc<Self> {
        Arc::new(Self {
            body: body.to_string(),
            urls: Mutex::new(Vec::new()),
        })
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpProber for CannedProber {
    async fn get(&self, url: &str) -> Result<String> {
        self.urls.lock().unwrap().push(url.to_string());
        Ok(self.body.clone())
    }
}

/// Config with zero settle time and a fixed ingress host
pub fn offline_config() -> RunnerConfig {
    RunnerConfig {
        settle_scale: 0.0,
        ingress_host: Some("ingress.example.com".to_string()),
        ..Default::default()
    }
}

pub fn offline_runner(cli: Arc<ScriptedRunner>, prober: Arc<CannedProber>) -> Runner {
    let config = offline_config();
    let kubectl = Kubectl::new(cli, &config).with_retry(RetryPolicy::none());
    Runner::new(kubectl, prober, config)
}
