//! # CLI Interface
//!
//! Defines the command-line argument structure for `zsf-node` using `clap`
//! derive. Supports three subcommands: `run`, `init` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ZSF deposit regtest node.
///
/// Runs the consensus core behind a JSON-RPC interface with a single
/// in-process wallet, and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "zsf-node",
    about = "ZSF deposit regtest node",
    version,
    propagate_version = true
)]
pub struct ZsfNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Create the data directory and a fresh wallet key.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
///
/// Every option left unset falls back to the config file, then to the
/// network defaults.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `zsf.toml` in the data directory.
    #[arg(long, short = 'c', env = "ZSF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Node data directory holding the config file and wallet key.
    #[arg(long, short = 'd', env = "ZSF_DATA_DIR", default_value = ".zsf")]
    pub data_dir: PathBuf,

    /// Network: mainnet, testnet or regtest.
    #[arg(long, env = "ZSF_NETWORK")]
    pub network: Option<String>,

    /// Port for the JSON-RPC API.
    #[arg(long, env = "ZSF_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ZSF_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Activation height override, `<hex branch id>:<height>`. Repeatable.
    ///
    /// Example: `--nuparams ffffffff:103` activates ZFuture at height 103.
    #[arg(long = "nuparams", value_name = "BRANCH:HEIGHT")]
    pub nuparams: Vec<String>,

    /// Hex-encoded Ed25519 wallet secret key.
    ///
    /// If not provided, the node reads `wallet.key` from the data directory
    /// or generates a throwaway key.
    #[arg(long, env = "ZSF_WALLET_KEY")]
    pub wallet_key: Option<String>,

    /// Log output format: pretty or json.
    #[arg(long, env = "ZSF_LOG_FORMAT")]
    pub log_format: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "ZSF_DATA_DIR", default_value = ".zsf")]
    pub data_dir: PathBuf,

    /// Network to write into the generated config file.
    #[arg(long, default_value = "regtest")]
    pub network: String,
}
