//! mesh-conformance - run service mesh conformance scenarios against a cluster

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mesh_conformance::config::RunnerConfig;
use mesh_conformance::kubectl::{Kubectl, ProcessRunner};
use mesh_conformance::manifests;
use mesh_conformance::probe::ReqwestProber;
use mesh_conformance::scenario::Runner;
use mesh_conformance::suites;

/// Service mesh conformance runner
#[derive(Parser, Debug)]
#[command(name = "mesh-conformance", version, about, long_about = None)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true, env = "MESH_LOG_FORMAT")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios against the current cluster
    ///
    /// Every selected scenario runs setup, its cases, then cleanup. Exits
    /// non-zero when any case fails.
    Run(RunArgs),

    /// List scenarios and their cases
    List,

    /// Print a policy artifact's manifest
    Show {
        /// Artifact name, e.g. `deny-all`
        artifact: String,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Scenario to run; repeat to run several (default: all)
    #[arg(long = "scenario", short = 's')]
    scenarios: Vec<String>,

    /// YAML configuration file
    #[arg(long, short = 'c', env = "MESH_CONFIG")]
    config: Option<PathBuf>,

    /// Write a JSON report here (overrides `reportPath`)
    #[arg(long)]
    report: Option<PathBuf>,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::List => {
            for scenario in suites::all() {
                println!("{:36} {}", scenario.name, scenario.description);
                for case in &scenario.cases {
                    println!("  - {}", case.name);
                }
            }
            Ok(())
        }
        Commands::Show { artifact } => {
            let Some(found) = manifests::lookup(&artifact) else {
                let known: Vec<&str> = manifests::all().map(|a| a.name).collect();
                bail!("unknown artifact '{}' (known: {})", artifact, known.join(", "));
            };
            print!("{}", found.contents);
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config =
        RunnerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    if args.report.is_some() {
        config.report_path = args.report;
    }
    let scenarios = suites::select(&args.scenarios)?;
    info!(
        scenarios = scenarios.len(),
        kubectl = %config.kubectl,
        settle_scale = config.settle_scale,
        "Starting conformance run"
    );

    let kubectl = Kubectl::new(Arc::new(ProcessRunner), &config);
    let prober = ReqwestProber::new(config.http_timeout()).context("failed to build HTTP client")?;
    let report_path = config.report_path.clone();
    let runner = Runner::new(kubectl, Arc::new(prober), config);

    let report = runner.run_all(&scenarios).await;
    report.log_summary();
    if let Some(path) = report_path {
        report
            .write_json(&path)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
    }
    report.into_result().map(drop).map_err(anyhow::Error::msg)
}
