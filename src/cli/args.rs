use clap::builder::styling::{AnsiColor, Styles};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().bold())
    .literal(AnsiColor::Cyan.on_default().bold())
    .placeholder(AnsiColor::Cyan.on_default())
    .error(AnsiColor::Red.on_default().bold());

const AFTER_HELP: &str = "\x1b[1;32mQuick Reference:\x1b[0m
  \x1b[1;36mConnect an editor\x1b[0m (the build server is started on first use):
    bspb connect                         Proxy BSP traffic between stdin/stdout and the server

  \x1b[1;36mManage the build server:\x1b[0m
    bspb status                          Show whether the server runs, and which version
    bspb shutdown                        Stop the server
    bspb reconcile --previous old.json   Offer a restart after editing the configuration
    bspb config                          Print the effective connection settings";

#[derive(Parser)]
#[command(name = "bspb")]
#[command(about = "Connect build tooling to a long-running build server over BSP")]
#[command(version)]
#[command(styles = STYLES)]
#[command(after_help = AFTER_HELP)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root sent to the build server (default: current directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub workspace: Option<PathBuf>,

    /// Configuration file (default: <config dir>/bsp-bridge/config.json)
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Control address of the build server, `host:port` or `unix:<path>`
    #[arg(long, value_name = "ADDR", global = true)]
    pub address: Option<String>,

    /// Seconds to keep retrying the BSP socket (default: 10)
    #[arg(long, value_name = "SECONDS", global = true)]
    pub timeout: Option<u64>,

    /// Milliseconds between BSP socket attempts (default: 100)
    #[arg(long, value_name = "MILLIS", global = true)]
    pub period: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human, global = true)]
    pub format: OutputFormat,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Accept every prompt with its first option
    #[arg(long, global = true, conflicts_with = "no")]
    pub yes: bool,

    /// Dismiss every prompt
    #[arg(long, global = true)]
    pub no: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Proxy BSP traffic between stdin/stdout and the build server
    #[command(
        long_about = "Start the build server if it is not running, ask it to open a BSP \
        socket for the workspace, and copy bytes between that socket and stdin/stdout until \
        either side closes.\n\n\
        Examples:\n  \
        bspb connect\n  \
        bspb --workspace ~/src/project connect --health-interval 30"
    )]
    Connect {
        /// Probe the build server every N seconds while connected
        #[arg(long, value_name = "SECONDS")]
        health_interval: Option<u64>,
    },

    /// Show whether the build server is running
    Status,

    /// Stop the build server
    Shutdown,

    /// Compare a previous configuration with the current one and offer a restart
    #[command(
        long_about = "Compare a previous configuration file with the current one. If the \
        daemon version or launch options changed in a way that needs a restart, ask before \
        restarting the build server.\n\n\
        Examples:\n  \
        bspb reconcile --previous config.json.bak\n  \
        bspb --yes reconcile --previous config.json.bak"
    )]
    Reconcile {
        /// The configuration file as it was before the change
        #[arg(long, value_name = "FILE")]
        previous: PathBuf,
    },

    /// Print the effective connection settings
    Config,
}

#[derive(Clone, Copy, ValueEnum, PartialEq, Eq, Debug)]
pub enum OutputFormat {
    Human,
    Json,
}
