//! Node configuration file (`zsf.toml`) and its merge with CLI flags.
//!
//! ```toml
//! network = "regtest"
//! rpc_port = 18232
//! metrics_port = 18234
//! nuparams = ["ffffffff:103"]
//! log_format = "pretty"
//!
//! [mempool]
//! max_size = 10000
//! min_fee_zat = 0
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use zsf_protocol::amount::Amount;
use zsf_protocol::config::{ChainParams, Network, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT};
use zsf_protocol::mempool::MempoolConfig;

use crate::cli::RunArgs;
use crate::logging::LogFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub network: Network,
    pub rpc_port: u16,
    pub metrics_port: u16,
    pub nuparams: Vec<String>,
    pub log_format: String,
    pub wallet_key: Option<String>,
    pub mempool: MempoolSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MempoolSection {
    pub max_size: usize,
    pub min_fee_zat: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: Network::Regtest,
            rpc_port: DEFAULT_RPC_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            nuparams: Vec::new(),
            log_format: "pretty".into(),
            wallet_key: None,
            mempool: MempoolSection::default(),
        }
    }
}

impl Default for MempoolSection {
    fn default() -> Self {
        let defaults = MempoolConfig::default();
        Self {
            max_size: defaults.max_size,
            min_fee_zat: defaults.min_fee.zat(),
        }
    }
}

impl NodeConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid node configuration")
    }

    /// Read `path`, or return defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Overlay CLI flags. `--nuparams` entries are applied after those from
    /// the file, so the command line wins for the same upgrade.
    pub fn merge_cli(mut self, args: &RunArgs) -> Result<Self> {
        if let Some(network) = &args.network {
            self.network = network.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(port) = args.rpc_port {
            self.rpc_port = port;
        }
        if let Some(port) = args.metrics_port {
            self.metrics_port = port;
        }
        if let Some(key) = &args.wallet_key {
            self.wallet_key = Some(key.clone());
        }
        if let Some(format) = &args.log_format {
            self.log_format = format.clone();
        }
        self.nuparams.extend(args.nuparams.iter().cloned());
        Ok(self)
    }

    pub fn chain_params(&self) -> Result<ChainParams> {
        ChainParams::for_network(self.network)
            .with_nuparams(&self.nuparams)
            .context("invalid network upgrade schedule")
    }

    pub fn mempool_config(&self) -> MempoolConfig {
        MempoolConfig {
            max_size: self.mempool.max_size,
            min_fee: Amount::from_zat(self.mempool.min_fee_zat),
        }
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.log_format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zsf_protocol::activation::NetworkUpgrade;

    #[test]
    fn parses_file_with_defaults_for_missing_keys() {
        let config = NodeConfig::from_toml(
            r#"
            nuparams = ["ffffffff:103"]

            [mempool]
            max_size = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(config.mempool.max_size, 50);
        assert_eq!(config.mempool.min_fee_zat, 0);

        let registry = config.chain_params().unwrap().activation_registry().unwrap();
        assert_eq!(registry.activation_height(NetworkUpgrade::ZFuture), Some(103));
    }

    #[test]
    fn cli_overrides_file() {
        let file = NodeConfig::from_toml("rpc_port = 1000\nnuparams = [\"ffffffff:200\"]").unwrap();
        let args = RunArgs {
            rpc_port: Some(2000),
            nuparams: vec!["ffffffff:103".into()],
            ..Default::default()
        };
        let merged = file.merge_cli(&args).unwrap();
        assert_eq!(merged.rpc_port, 2000);

        let registry = merged.chain_params().unwrap().activation_registry().unwrap();
        assert_eq!(registry.activation_height(NetworkUpgrade::ZFuture), Some(103));
    }

    #[test]
    fn rejects_bad_schedule_and_network() {
        let config = NodeConfig {
            nuparams: vec!["ffffffff:0".into(), "c2d6d0b4:5".into()],
            ..Default::default()
        };
        assert!(config.chain_params().is_err());

        let args = RunArgs {
            network: Some("moon".into()),
            ..Default::default()
        };
        assert!(NodeConfig::default().merge_cli(&args).is_err());
    }
}
