//! Registry control-plane server.

mod bootstrap;
mod config;
mod recover;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::AppConfig;

/// Registry and control-plane for multi-tenant cryptographic key management.
#[derive(Parser)]
#[command(name = "registry-server")]
#[command(about = "Registry control-plane for multi-tenant key management")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(path) = &cli.config {
        if !path.is_file() {
            anyhow::bail!("config file does not exist: {}", path.display());
        }
    }

    // Layered config: defaults -> YAML (if provided) -> env (KCM__*).
    let config = AppConfig::load(cli.config.as_deref())?;
    config.validate()?;

    if cli.print_config {
        println!("{config:#?}");
        return Ok(());
    }

    match cli.command {
        Some(Commands::Check) => {
            println!("configuration OK");
            Ok(())
        }
        Some(Commands::Run) | None => bootstrap::run(config).await,
    }
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn,registry=info,orbital=info,registry_server=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
