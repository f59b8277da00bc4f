//! # Consensus Configuration & Constants
//!
//! Every consensus constant lives here, together with [`ChainParams`], the
//! per-network parameter set handed to the validation pipeline at startup.
//! Changing any of these after a network launches is a hard fork.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::activation::{parse_nuparam, ActivationError, ActivationRegistry, NetworkUpgrade};
use crate::amount::Amount;

// ---------------------------------------------------------------------------
// Monetary Units
// ---------------------------------------------------------------------------

/// Zatoshis per coin.
pub const COIN: u64 = 100_000_000;

/// Decimal places of the coin unit.
pub const COIN_DECIMALS: u8 = 8;

/// Upper bound for any single amount or sum of amounts.
pub const MAX_MONEY: u64 = 21_000_000 * COIN;

/// Fee the regtest wallet attaches to every transaction it funds (0.0001).
pub const DEFAULT_FEE_ZAT: u64 = 10_000;

/// Number of blocks a coinbase output must wait before it can be spent.
pub const COINBASE_MATURITY: u64 = 100;

// ---------------------------------------------------------------------------
// Transaction Format
// ---------------------------------------------------------------------------

/// Bit set in the header word of every overwintered transaction.
pub const OVERWINTERED_FLAG: u32 = 1 << 31;

/// v5 transactions: no deposit field.
pub const TX_VERSION_V5: u32 = 5;

/// Version group id paired with [`TX_VERSION_V5`].
pub const V5_VERSION_GROUP_ID: u32 = 0x26A7_270A;

/// ZFuture transactions: carry the ZSF deposit field.
pub const TX_VERSION_ZFUTURE: u32 = 0x0000_FFFF;

/// Version group id paired with [`TX_VERSION_ZFUTURE`].
pub const ZFUTURE_VERSION_GROUP_ID: u32 = 0xFFFF_FFFF;

/// Blocks after the target height at which a freshly built transaction expires.
pub const TX_EXPIRY_DELTA: u32 = 20;

/// Default input sequence number.
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

/// Encoded deposit field never exceeds a u64.
pub const MAX_DEPOSIT_FIELD_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum inputs per transaction.
pub const MAX_TX_INPUTS: usize = 1_000;

/// Maximum outputs per transaction.
pub const MAX_TX_OUTPUTS: usize = 1_000;

/// Maximum script_sig length in bytes.
pub const MAX_SCRIPT_SIG_LEN: usize = 256;

/// Maximum transactions per block.
pub const MAX_BLOCK_TRANSACTIONS: usize = 10_000;

// ---------------------------------------------------------------------------
// Node Defaults
// ---------------------------------------------------------------------------

/// Default JSON-RPC port (regtest).
pub const DEFAULT_RPC_PORT: u16 = 18232;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 18234;

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// The network a node runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    /// Two-byte base58 prefix for transparent key-hash addresses.
    pub fn address_prefix(self) -> [u8; 2] {
        match self {
            Network::Mainnet => [0x1C, 0xB8],
            Network::Testnet | Network::Regtest => [0x1D, 0x25],
        }
    }

    /// Chain name as reported by `getblockchaininfo`.
    pub fn chain_name(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown network: {}", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Subsidy
// ---------------------------------------------------------------------------

/// Block subsidy: `initial >> (height / halving_interval)`, zero at genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidySchedule {
    pub initial: Amount,
    pub halving_interval: u64,
}

impl SubsidySchedule {
    /// Subsidy created by the block at `height`.
    pub fn subsidy(&self, height: u64) -> Amount {
        if height == 0 || self.halving_interval == 0 {
            return Amount::ZERO;
        }
        self.initial.halved(height / self.halving_interval)
    }
}

// ---------------------------------------------------------------------------
// ChainParams
// ---------------------------------------------------------------------------

/// Consensus parameters for one chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub network: Network,
    /// Configured activation heights. Upgrades not listed never activate.
    pub upgrades: Vec<(NetworkUpgrade, u64)>,
    pub subsidy: SubsidySchedule,
    pub coinbase_maturity: u64,
}

impl ChainParams {
    /// Default parameters for `network`.
    ///
    /// Regtest activates everything up to NU5 at height 1 and leaves ZFuture
    /// off; use [`ChainParams::with_nuparams`] to schedule it.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                network,
                upgrades: vec![
                    (NetworkUpgrade::Overwinter, 347_500),
                    (NetworkUpgrade::Sapling, 419_200),
                    (NetworkUpgrade::Blossom, 653_600),
                    (NetworkUpgrade::Heartwood, 903_000),
                    (NetworkUpgrade::Canopy, 1_046_400),
                    (NetworkUpgrade::Nu5, 1_687_104),
                ],
                subsidy: SubsidySchedule {
                    initial: Amount::from_zat(312_500_000),
                    halving_interval: 1_680_000,
                },
                coinbase_maturity: COINBASE_MATURITY,
            },
            Network::Testnet => Self {
                network,
                upgrades: vec![
                    (NetworkUpgrade::Overwinter, 207_500),
                    (NetworkUpgrade::Sapling, 280_000),
                    (NetworkUpgrade::Blossom, 584_000),
                    (NetworkUpgrade::Heartwood, 903_800),
                    (NetworkUpgrade::Canopy, 1_028_500),
                    (NetworkUpgrade::Nu5, 1_842_420),
                ],
                subsidy: SubsidySchedule {
                    initial: Amount::from_zat(312_500_000),
                    halving_interval: 1_680_000,
                },
                coinbase_maturity: COINBASE_MATURITY,
            },
            Network::Regtest => Self {
                network,
                upgrades: vec![
                    (NetworkUpgrade::Overwinter, 1),
                    (NetworkUpgrade::Sapling, 1),
                    (NetworkUpgrade::Blossom, 1),
                    (NetworkUpgrade::Heartwood, 1),
                    (NetworkUpgrade::Canopy, 1),
                    (NetworkUpgrade::Nu5, 1),
                ],
                subsidy: SubsidySchedule {
                    initial: Amount::from_zat(625_000_000),
                    halving_interval: 150,
                },
                coinbase_maturity: COINBASE_MATURITY,
            },
        }
    }

    /// Regtest parameters.
    pub fn regtest() -> Self {
        Self::for_network(Network::Regtest)
    }

    /// Apply `-nuparams=<hex branch id>:<height>` overrides.
    ///
    /// An override replaces the height of an upgrade already listed or adds
    /// the upgrade. The result is validated by building a registry from it.
    pub fn with_nuparams<S: AsRef<str>>(mut self, nuparams: &[S]) -> Result<Self, ActivationError> {
        for raw in nuparams {
            let (upgrade, height) = parse_nuparam(raw.as_ref())?;
            match self.upgrades.iter_mut().find(|(u, _)| *u == upgrade) {
                Some(entry) => entry.1 = height,
                None => self.upgrades.push((upgrade, height)),
            }
        }
        self.upgrades.sort_by_key(|(u, _)| *u);
        self.activation_registry()?;
        Ok(self)
    }

    /// Build the activation registry for these parameters.
    pub fn activation_registry(&self) -> Result<ActivationRegistry, ActivationError> {
        ActivationRegistry::new(self.upgrades.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
