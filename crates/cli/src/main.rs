//! StateHub CLI - Main Entry Point
//!
//! Inspect, upload, compare and lock versioned Terraform state held by a
//! StateHub backend.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use statehub_cli::commands::{lock, state};
use statehub_cli::output::{self, print_error, print_success};
use statehub_cli::{ClientConfig, Credentials, HttpStateTransport, SessionContext};

/// StateHub CLI - Versioned Terraform State
#[derive(Parser)]
#[command(name = "statehub")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Backend address
    #[arg(long, env = "STATEHUB_ENDPOINT", global = true)]
    endpoint: Option<String>,

    /// Bearer token
    #[arg(long, env = "STATEHUB_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// User name for this session
    #[arg(long, env = "STATEHUB_USER", global = true)]
    user: Option<String>,

    /// Configuration file (defaults to ~/.statehub/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read, write and compare state versions
    #[command(subcommand)]
    State(state::StateCommands),

    /// Manage state locks
    #[command(subcommand)]
    Lock(lock::LockCommands),

    /// Check backend status
    Status,

    /// Show version information
    Version,
}

fn default_user() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(statehub_common::default_config_path);
    let config = ClientConfig::load(&config_path)?.with_overrides(cli.endpoint, cli.user, cli.token);
    debug!("using backend {}", config.endpoint);

    let session = Arc::new(SessionContext::new());
    if let Some(token) = &config.token {
        let user = config.user.clone().unwrap_or_else(default_user);
        session.login(Credentials::new(user, token.clone()));
    }

    let transport = Arc::new(HttpStateTransport::from_config(&config, session.clone())?);

    let result = match cli.command {
        Commands::State(cmd) => state::execute(cmd, transport, cli.format).await,
        Commands::Lock(cmd) => lock::execute(cmd, transport, cli.format).await,
        Commands::Status => {
            if transport.health_check().await {
                print_success(&format!("Backend is running at {}", transport.endpoint()));
                Ok(())
            } else {
                Err(anyhow::anyhow!("backend is not responding at {}", transport.endpoint()))
            }
        }
        Commands::Version => {
            println!("StateHub CLI v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    session.logout();
    result
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        let message = match e.downcast_ref::<statehub_common::Error>() {
            Some(err) => err.user_message(),
            None => format!("{:#}", e),
        };
        print_error(&message);
        std::process::exit(1);
    }
}
