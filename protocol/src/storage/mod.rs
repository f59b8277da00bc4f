//! # Storage Module
//!
//! Chain data held in memory: blocks, the UTXO set with undo data, the
//! chain supply ledger and the chain state that ties them together.
//!
//! ## Architecture
//!
//! ```text
//! block.rs   — Block structure, genesis block, block hash and wire codec
//! utxo.rs    — Coins, the UtxoView trait, UtxoSet, staged overlay, undo data
//! supply.rs  — Chain value net of ZSF deposits
//! chain.rs   — Active chain, tx index, commit/pop of validated blocks
//! ```
//!
//! ## Data Flow
//!
//! ```text
//! Block → ChainState::commit_block → UtxoSet::apply_block → ChainSupplyLedger::connect
//!       ← ChainState::pop_block    ← ChainSupplyLedger::disconnect ← UtxoSet::undo_block
//! ```
//!
//! BLAKE3 for block hashes and merkle roots; txids stay double-SHA-256.

pub mod block;
pub mod chain;
pub mod supply;
pub mod utxo;

pub use block::{Block, BlockHash, BlockHeader};
pub use chain::{ChainError, ChainState, TxLocation};
pub use supply::{ChainSupplyLedger, ChainSupplyState, LedgerError};
pub use utxo::{BlockUndo, Coin, StagedUtxos, UtxoError, UtxoSet, UtxoView};
