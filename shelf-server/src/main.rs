//! shelf server — entry point.
//!
//! ```text
//! shelf-server                        Serve ./Docs on ports 3333 / 3334
//! shelf-server --config <path>        Load a custom config TOML
//! shelf-server --gen-config           Write default config to stdout
//! shelf-server -d -p 4000 --root Pub  Debug logs, custom port and root
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shelf_core::{LocalStore, Server};
use shelf_server::config::ServerConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "shelf-server", about = "shelf file-sharing server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "shelf-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Force debug-level logging.
    #[arg(short, long)]
    debug: bool,

    /// Port of the normal endpoint.
    #[arg(short, long)]
    port: Option<u16>,

    /// Port of the control endpoint.
    #[arg(long)]
    control_port: Option<u16>,

    /// Root directory name served to clients.
    #[arg(long)]
    root: Option<String>,

    /// Directory that paths are resolved against.
    #[arg(long)]
    base_dir: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = ServerConfig::load(&cli.config);
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if let Some(port) = cli.control_port {
        config.network.control_port = port;
    }
    if let Some(root) = cli.root {
        config.storage.root = root;
    }
    if let Some(base_dir) = cli.base_dir {
        config.storage.base_dir = base_dir;
    }

    // Init tracing.
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("shelf-server v{}", env!("CARGO_PKG_VERSION"));
    info!("normal port: {}", config.network.port);
    info!("control port: {}", config.network.control_port);
    info!(
        "serving {} under {}",
        config.storage.root,
        config.storage.base_dir.display()
    );

    let settings = config.to_settings()?;
    let store = Arc::new(LocalStore::new(config.storage.base_dir.clone()));
    let server = Server::bind(settings, store).await?;
    let coordinator = server.coordinator();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        coordinator.signal_shutdown();
    });

    server.run().await?;
    info!("server exited");

    Ok(())
}
