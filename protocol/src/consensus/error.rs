//! Validation errors for transactions and blocks.
//!
//! Each variant maps to one consensus rule. Mempool-specific rejections
//! live with the pool in [`crate::mempool::MempoolError`].

use thiserror::Error;

use super::balance::BalanceError;
use crate::amount::Amount;
use crate::storage::{BlockHash, ChainError};
use crate::transaction::codec::DecodeError;
use crate::transaction::signing::ScriptError;
use crate::transaction::{OutPoint, TxId};

/// Message returned when a deposit appears before the upgrade activates.
pub const FEATURE_NOT_ACTIVE_MESSAGE: &str = "ZSF deposit is not supported at this block height.";

/// A transaction broke a consensus rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs and no zsf deposit")]
    NoOutputs,

    #[error("input {0} is spent twice")]
    DuplicateInput(OutPoint),

    #[error("null prevout outside a coinbase")]
    NullPrevout,

    #[error("value out of range")]
    ValueOutOfRange,

    #[error("{}", FEATURE_NOT_ACTIVE_MESSAGE)]
    FeatureNotActive { height: u64 },

    #[error("transaction version {version} is not active at height {height}")]
    VersionNotActive { version: u32, height: u64 },

    #[error("consensus branch id {found:#010x} does not match {expected:#010x} at height {height}")]
    WrongConsensusBranch { expected: u32, found: u32, height: u64 },

    #[error("transaction expired at height {expiry_height}, target height is {height}")]
    Expired { expiry_height: u32, height: u64 },

    #[error("input {0} is missing or already spent")]
    MissingInput(OutPoint),

    #[error("input {outpoint} spends a coinbase created at {created}, immature at {height}")]
    ImmatureCoinbase {
        outpoint: OutPoint,
        created: u64,
        height: u64,
    },

    #[error("input {0} is not signed")]
    MissingSignature(usize),

    #[error(transparent)]
    InvalidSignature(ScriptError),

    #[error(transparent)]
    Balance(#[from] BalanceError),
}

impl TransactionError {
    /// Failures that may clear up as the chain advances.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransactionError::MissingInput(_) | TransactionError::ImmatureCoinbase { .. }
        )
    }
}

impl From<ScriptError> for TransactionError {
    fn from(e: ScriptError) -> Self {
        match e {
            ScriptError::Missing(index) => TransactionError::MissingSignature(index),
            other => TransactionError::InvalidSignature(other),
        }
    }
}

/// A block failed to connect or disconnect. No chain state changed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("block height {got} does not extend tip; expected {expected}")]
    NonSequentialBlock { expected: u64, got: u64 },

    #[error("block prev hash {found} does not match tip {expected}")]
    PrevHashMismatch { expected: BlockHash, found: BlockHash },

    #[error("merkle root does not match transactions")]
    BadMerkleRoot,

    #[error("bad coinbase: {0}")]
    BadCoinbase(&'static str),

    #[error("coinbase pays {paid}, more than subsidy plus fees {allowed}")]
    CoinbaseOverpays { paid: Amount, allowed: Amount },

    #[error("block fees out of range")]
    ValueOverflow,

    #[error("transaction {index} ({txid}) rejected: {source}")]
    Transaction {
        index: usize,
        txid: TxId,
        #[source]
        source: TransactionError,
    },

    #[error("fork height {fork_height} is above tip {tip}")]
    InvalidForkPoint { fork_height: u64, tip: u64 },

    #[error("chain supply invariant violated: {0}")]
    LedgerInvariantViolation(ChainError),

    #[error("block acceptance halted after a ledger invariant violation")]
    Halted,

    #[error("no block to disconnect")]
    NothingToDisconnect,
}

impl From<ChainError> for BlockError {
    fn from(e: ChainError) -> Self {
        match e {
            ChainError::NothingToDisconnect => BlockError::NothingToDisconnect,
            ChainError::NotNextBlock { tip, got } => BlockError::NonSequentialBlock {
                expected: tip + 1,
                got,
            },
            other => BlockError::LedgerInvariantViolation(other),
        }
    }
}
