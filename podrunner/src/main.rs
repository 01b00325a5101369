//! Scripted multi-node integration test driver.
//!
//! Reads a YAML test definition, makes sure enough nodes are running, fans
//! each step's command out to its node range and exits 0 only when the
//! observed success/failure/timeout counters equal the expected ones.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{debug, warn};

use podrunner::console;
use podrunner::error::{ConfigError, exit_code_for};
use podrunner::exit_codes;
use podrunner::io::config::{
    DEFAULT_CONFIG_FILE, RunnerConfig, Transport, load_config, load_config_file,
};
use podrunner::io::dashboard::dashboard_link;
use podrunner::io::definition::load_definition;
use podrunner::io::pool::{KubectlPool, StaticPool};
use podrunner::io::remote::{KubectlExec, LocalExec};
use podrunner::logging;
use podrunner::run::{RunOutcome, run_test};
use podrunner::step::StepOptions;

#[derive(Parser)]
#[command(
    name = "podrunner",
    version,
    about = "Scripted multi-node integration test driver"
)]
struct Cli {
    /// Enable debug diagnostics on stderr (overridden by `RUST_LOG`).
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a test definition and exit non-zero unless expectations are met.
    Run {
        /// Path to the YAML test definition.
        file: PathBuf,
        /// Runner configuration (default: `podrunner.toml` if present).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Run each node's command as a local shell process.
        #[arg(long)]
        local: bool,
        /// Deployment to scale when too few pods are running.
        #[arg(long)]
        deployment: Option<String>,
    },
    /// Load and validate a test definition, then print its step plan.
    Validate {
        /// Path to the YAML test definition.
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);
    let code = match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(command: Command) -> Result<i32> {
    match command {
        Command::Run {
            file,
            config,
            local,
            deployment,
        } => cmd_run(&file, config.as_deref(), local, deployment),
        Command::Validate { file } => cmd_validate(&file),
    }
}

fn cmd_run(
    file: &Path,
    config_path: Option<&Path>,
    local: bool,
    deployment: Option<String>,
) -> Result<i32> {
    let (config_path, loaded) = match config_path {
        Some(path) => (path, load_config_file(path)),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            (path, load_config(path))
        }
    };
    let mut cfg = loaded.map_err(|err| ConfigError {
        path: config_path.to_path_buf(),
        message: format!("{err:#}"),
    })?;
    if local {
        cfg.transport = Transport::Local;
    }
    if let Some(deployment) = deployment {
        cfg.kubectl.deployment = deployment;
    }
    debug!(?cfg, "runner config");

    let definition = load_definition(file)?;
    debug!(?definition, "test definition");

    let options = StepOptions {
        max_parallel_nodes: cfg.execution.max_parallel_nodes,
    };
    let limit = cfg.execution.output_limit_bytes;
    let outcome = match cfg.transport {
        Transport::Kubectl => {
            let exec = KubectlExec::new(cfg.kubectl.clone(), limit);
            let pool = KubectlPool::new(cfg.kubectl.clone(), definition.config.selector.as_str());
            run_test(&definition, &exec, &pool, &options, console::render)?
        }
        Transport::Local => {
            let exec = LocalExec::new(cfg.local.clone(), limit);
            let pool = StaticPool::new(definition.config.nodes);
            run_test(&definition, &exec, &pool, &options, console::render)?
        }
    };

    report(&cfg, &outcome);
    Ok(outcome.verdict.exit_code())
}

fn report(cfg: &RunnerConfig, outcome: &RunOutcome) {
    let link = if cfg.dashboard.enabled && cfg.transport == Transport::Kubectl {
        match dashboard_link(&cfg.dashboard, &cfg.kubectl, &outcome.summary) {
            Ok(link) => Some(link),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "dashboard link unavailable");
                None
            }
        }
    } else {
        None
    };
    console::print_summary(&outcome.summary, link.as_deref());
    console::print_verdict(&outcome.verdict);
}

fn cmd_validate(file: &Path) -> Result<i32> {
    let definition = load_definition(file)?;
    console::print_plan(&definition);
    Ok(exit_codes::OK)
}
