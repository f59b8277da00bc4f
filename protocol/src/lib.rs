// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ZSF Protocol — Consensus Core
//!
//! Consensus support for ZSF deposits: an optional amount carried by a
//! transaction that leaves circulation once the transaction is mined, while
//! staying visible in the chain supply figures.
//!
//! ## Architecture
//!
//! - **activation** — Network upgrades, branch ids and activation heights.
//! - **amount** — Zatoshi amounts with checked arithmetic and coin formatting.
//! - **config** — Protocol constants and per-network chain parameters.
//! - **crypto** — Hashing and Ed25519 keys.
//! - **transaction** — Transaction types, wire codec, builder, funding,
//!   signing and the inspection view.
//! - **consensus** — Balance arithmetic, validation rules and the pipeline
//!   that owns the chain.
//! - **storage** — Blocks, the UTXO set, the chain supply ledger and the
//!   chain state.
//! - **mempool** — Fee-ordered pool of validated transactions.
//!
//! ## Supply
//!
//! Connecting the block at height `H` moves the chain value by
//! `subsidy(H) − Σ deposits(H)`. Disconnecting it applies the exact inverse.
//! Nothing else touches the ledger.

pub mod activation;
pub mod amount;
pub mod config;
pub mod consensus;
pub mod crypto;
pub mod mempool;
pub mod storage;
pub mod transaction;

pub use activation::{ActivationError, ActivationRegistry, NetworkUpgrade};
pub use amount::{Amount, AmountError};
pub use config::{ChainParams, Network};
pub use consensus::{BlockError, TransactionError, ValidationPipeline};
pub use mempool::{Mempool, MempoolConfig, MempoolError};
pub use storage::{Block, BlockHash, ChainState, ChainSupplyState};
pub use transaction::{Address, OutPoint, Transaction, TransactionBuilder, TxId};
