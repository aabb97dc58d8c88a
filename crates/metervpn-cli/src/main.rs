//! `MeterVPN` CLI
//!
//! Buy VPN time over Lightning and fetch WireGuard configs from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;

use metervpn_cli::account_cmd::{self, AccountAction};
use metervpn_cli::config::CliConfig;
use metervpn_cli::connection;
use metervpn_cli::tunnel_cmd::TunnelArgs;
use metervpn_cli::{extend_cmd, price_cmd, status_cmd, tunnel_cmd};
use metervpn_core::lease::LeaseTracker;
use metervpn_core::pricing::PricingEngine;
use metervpn_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "metervpn")]
#[command(version, about = "Pay-per-hour VPN client", long_about = None)]
struct Cli {
    /// Server URL (overrides settings and the saved server)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Settings file layered over the global one
    #[arg(long, global = true, env = "METERVPN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Manage the stored account
    #[command(subcommand)]
    Account(AccountAction),
    /// Show current prices
    Price,
    /// Quote a duration in whole hours
    Quote {
        /// Hours to quote
        hours: String,
    },
    /// Show remaining VPN time
    Status {
        /// Keep refreshing until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Buy more VPN time
    Extend {
        /// Hours to buy
        hours: String,
        /// Print the invoice and exit without waiting for payment
        #[arg(long)]
        no_wait: bool,
    },
    /// Generate a WireGuard config for this account
    Tunnel(TunnelArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cli_config = CliConfig::load();
    let config =
        connection::resolve_config(cli.config.as_deref(), cli.server.as_deref(), &cli_config)?;

    init_tracing(
        &format!("metervpn={}", config.server.log_level),
        cli.log_json,
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.base_url,
        "Starting metervpn CLI"
    );

    match cli.command {
        Commands::Account(action) => account_cmd::run(action, &mut cli_config, &config).await,
        Commands::Price => {
            let api = Arc::new(connection::connect(&config, &cli_config)?);
            price_cmd::price(&PricingEngine::new(api, config.pricing.fallback)).await
        }
        Commands::Quote { hours } => {
            let api = Arc::new(connection::connect(&config, &cli_config)?);
            price_cmd::quote(&PricingEngine::new(api, config.pricing.fallback), &hours).await
        }
        Commands::Status { watch } => {
            let api = Arc::new(connection::connect(&config, &cli_config)?);
            let tracker = Arc::new(LeaseTracker::new(api));
            status_cmd::run(tracker, watch, config.lease.refresh_interval()).await
        }
        Commands::Extend { hours, no_wait } => {
            let api = Arc::new(connection::connect(&config, &cli_config)?);
            extend_cmd::run(api, &config, &hours, no_wait).await
        }
        Commands::Tunnel(args) => {
            let api = Arc::new(connection::connect(&config, &cli_config)?);
            tunnel_cmd::run(api, config.tunnel.clone(), args).await
        }
    }
}
