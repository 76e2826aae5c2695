use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use bsp_bridge::bsp::config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RETRY_PERIOD};
use bsp_bridge::bsp::prompt::{FixedAnswer, PromptService};
use bsp_bridge::bsp::{BuildServers, UserConfiguration};
use bsp_bridge::daemon::{LocalDistribution, SocketController};
use cli::args::{Cli, Commands};
use cli::output::OutputFormatter;
use cli::prompt::TerminalPrompt;

fn init_tracing(verbose: bool) {
    let default = if verbose { "bsp_bridge=debug" } else { "bsp_bridge=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // stdout carries BSP traffic in `connect`, so logs always go to stderr.
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let result = runtime.block_on(run(cli));
    // A pending blocking stdin read must not keep the process alive.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn run(cli: Cli) -> Result<()> {
    let workspace = match cli.workspace {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let workspace = workspace
        .canonicalize()
        .with_context(|| format!("Workspace {} does not exist", workspace.display()))?;

    let mut user = match &cli.config {
        Some(path) => UserConfiguration::load(path)?,
        None => UserConfiguration::load_default()?,
    };
    if let Some(address) = cli.address {
        user.daemon_address = Some(address);
    }

    let prompt: Arc<dyn PromptService> = if cli.yes {
        Arc::new(FixedAnswer::accept())
    } else if cli.no {
        Arc::new(FixedAnswer::decline())
    } else {
        Arc::new(TerminalPrompt)
    };

    let mut servers = BuildServers::new(
        user.clone(),
        Arc::new(SocketController::default()),
        Arc::new(LocalDistribution::default()),
        prompt,
    );
    if cli.timeout.is_some() || cli.period.is_some() {
        let period = cli.period.map_or(DEFAULT_RETRY_PERIOD, Duration::from_millis);
        let timeout = cli.timeout.map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs);
        servers = servers.with_retry(period, timeout);
    }
    let servers = Arc::new(servers);
    let formatter = OutputFormatter::new(cli.format);

    match cli.command {
        Commands::Connect { health_interval } => {
            commands::handle_connect(&servers, &workspace, &user, health_interval).await?;
        }
        Commands::Status => {
            commands::handle_status(&servers, &user, &formatter).await?;
        }
        Commands::Shutdown => {
            commands::handle_shutdown(&servers).await?;
        }
        Commands::Reconcile { previous } => {
            commands::handle_reconcile(&servers, &previous, &user, &formatter).await?;
        }
        Commands::Config => {
            commands::handle_config(&servers, &user, &formatter)?;
        }
    }

    Ok(())
}
