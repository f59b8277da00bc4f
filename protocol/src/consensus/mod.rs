//! # Consensus Module
//!
//! Decides whether a transaction or block is valid at a given height.
//!
//! ```text
//! balance.rs  — fee = Σ inputs − Σ outputs − zsf_deposit ≥ 0
//! rules.rs    — structure, activation gate, header context, inputs
//! pipeline.rs — mempool acceptance and block connect/disconnect/reorg
//! error.rs    — TransactionError, BlockError
//! ```

pub mod balance;
pub mod error;
pub mod pipeline;
pub mod rules;

pub use balance::{verify_balance, BalanceError};
pub use error::{BlockError, TransactionError, FEATURE_NOT_ACTIVE_MESSAGE};
pub use pipeline::ValidationPipeline;
