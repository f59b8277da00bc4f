// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZSF Deposit Node
//!
//! Entry point for the `zsf-node` binary. Parses CLI arguments, initializes
//! logging and metrics, builds the consensus pipeline and wallet, and serves
//! the JSON-RPC API.
//!
//! The binary supports three subcommands:
//!
//! - `run`     — start the node
//! - `init`    — create the data directory, config file and wallet key
//! - `version` — print build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;
mod node;
mod wallet;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use zsf_protocol::config::Network;
use zsf_protocol::crypto::keys::Keypair;

use cli::{Commands, ZsfNodeCli};
use config::NodeConfig;
use logging::LogFormat;
use metrics::NodeMetrics;
use node::Node;

const CONFIG_FILE: &str = "zsf.toml";
const WALLET_KEY_FILE: &str = "wallet.key";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ZsfNodeCli::parse();

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the node: RPC server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| args.data_dir.join(CONFIG_FILE));
    let config = NodeConfig::load_or_default(&config_path)?.merge_cli(&args)?;

    logging::init_logging(logging::RUN_DIRECTIVES, config.log_format())?;

    let params = config.chain_params()?;
    let wallet_key = load_wallet_key(config.wallet_key.as_deref(), &args.data_dir)?;

    tracing::info!(
        network = %config.network,
        rpc_port = config.rpc_port,
        metrics_port = config.metrics_port,
        nuparams = ?config.nuparams,
        data_dir = %args.data_dir.display(),
        "starting zsf-node"
    );

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());

    // --- Node ---
    let node = Node::new(
        params,
        config.mempool_config(),
        wallet_key,
        Arc::clone(&node_metrics),
    )
    .context("invalid network upgrade schedule")?;

    let app_state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        node: Arc::new(node),
        metrics: Arc::clone(&node_metrics),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("127.0.0.1:{}", config.rpc_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", api_addr))?;
    tracing::info!("RPC server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", config.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received, draining connections");
        }
    }

    tracing::info!("zsf-node stopped");
    Ok(())
}

/// Wallet key from the config, then `<data_dir>/wallet.key`, else a fresh
/// throwaway key.
fn load_wallet_key(configured: Option<&str>, data_dir: &Path) -> Result<Keypair> {
    if let Some(hex_key) = configured {
        return Keypair::from_hex(hex_key.trim()).context("invalid wallet key");
    }

    let key_path = data_dir.join(WALLET_KEY_FILE);
    if key_path.exists() {
        let text = std::fs::read_to_string(&key_path)
            .with_context(|| format!("failed to read wallet key {}", key_path.display()))?;
        return Keypair::from_hex(text.trim())
            .with_context(|| format!("invalid wallet key in {}", key_path.display()));
    }

    tracing::warn!(
        path = %key_path.display(),
        "no wallet key found, using an ephemeral key"
    );
    Ok(Keypair::generate())
}

/// Initializes a new node data directory with a config file and wallet key.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging(logging::INIT_DIRECTIVES, LogFormat::Pretty)?;

    let data_dir = &args.data_dir;
    let network: Network = args
        .network
        .parse()
        .map_err(anyhow::Error::msg)
        .context("invalid --network")?;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let keypair = Keypair::generate();
    let key_path = data_dir.join(WALLET_KEY_FILE);
    std::fs::write(&key_path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write wallet key to {}", key_path.display()))?;

    // Restrict permissions on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))?;
    }

    let config_path = data_dir.join(CONFIG_FILE);
    if !config_path.exists() {
        let config = NodeConfig {
            network,
            ..NodeConfig::default()
        };
        let text = toml::to_string(&config).context("failed to serialize config")?;
        std::fs::write(&config_path, text)
            .with_context(|| format!("failed to write config to {}", config_path.display()))?;
    }

    let address = zsf_protocol::transaction::Address::from_public_key(&keypair.public_key());

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Network        : {}", args.network);
    println!("  Config         : {}", config_path.display());
    println!("  Wallet key     : {}", key_path.display());
    println!("  Mining address : {}", address.encode(network));

    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("zsf-node {}", env!("CARGO_PKG_VERSION"));
    println!("rustc    {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
