//! shelf client — entry point.
//!
//! ```text
//! shelf-client list Docs                  Visible entries of Docs
//! shelf-client get report.txt Docs        Print a file
//! shelf-client --control hide a.txt Docs  Administrative commands
//! shelf-client --gen-config               Dump default config and exit
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shelf_client::config::ClientConfig;
use shelf_client::runner::{self, Action};
use shelf_core::Client;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "shelf-client", about = "shelf file-sharing client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "shelf-client.toml")]
    config: PathBuf,

    /// Server address (overrides config).
    #[arg(short, long)]
    address: Option<String>,

    /// Normal endpoint port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect to the control endpoint even for shared commands.
    #[arg(long)]
    control: bool,

    /// Per-message timeout in seconds (overrides config).
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// List the visible entries of a directory.
    List {
        #[arg(default_value = shelf_core::server::DEFAULT_ROOT)]
        dir: String,
    },
    /// Recursive listing of a directory.
    Tree {
        #[arg(default_value = shelf_core::server::DEFAULT_ROOT)]
        dir: String,
    },
    /// Print the content of a file.
    Get {
        file: String,
        #[arg(default_value = shelf_core::server::DEFAULT_ROOT)]
        dir: String,
    },
    /// Resolve a navigation step from a directory.
    Goto {
        target: String,
        #[arg(long, default_value = shelf_core::server::DEFAULT_ROOT)]
        from: String,
    },
    /// Hide a file (control endpoint).
    Hide {
        file: String,
        #[arg(default_value = shelf_core::server::DEFAULT_ROOT)]
        dir: String,
    },
    /// Reveal a hidden file (control endpoint).
    Reveal {
        file: String,
        #[arg(default_value = shelf_core::server::DEFAULT_ROOT)]
        dir: String,
    },
    /// Show the commands the endpoint accepts.
    Help,
    /// Drain and stop the server (control endpoint).
    Terminate,
}

impl From<CliCommand> for Action {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::List { dir } => Action::List { dir },
            CliCommand::Tree { dir } => Action::Tree { dir },
            CliCommand::Get { file, dir } => Action::Get { file, dir },
            CliCommand::Goto { target, from } => Action::Goto { target, from },
            CliCommand::Hide { file, dir } => Action::Hide { file, dir },
            CliCommand::Reveal { file, dir } => Action::Reveal { file, dir },
            CliCommand::Help => Action::Help,
            CliCommand::Terminate => Action::Terminate,
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(address) = cli.address {
        config.network.address = address;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(timeout) = cli.timeout {
        config.network.timeout_secs = timeout;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let action: Action = cli.command.map(Action::from).unwrap_or(Action::Help);
    let endpoint = config.endpoint(cli.control || action.needs_control());
    info!("connecting to {endpoint}");

    let client = Client::connect(endpoint.as_str(), config.channel_settings()).await?;
    for line in runner::execute(client, &action).await? {
        println!("{line}");
    }

    Ok(())
}
