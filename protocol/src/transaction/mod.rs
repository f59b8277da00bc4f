//! # Transaction Module
//!
//! Structure, consensus encoding, construction, funding, signing and
//! inspection of transparent transactions carrying an optional ZSF deposit.
//!
//! ## Architecture
//!
//! ```text
//! types.rs    — TxId, OutPoint, TxIn, TxOut, Address
//! builder.rs  — Transaction, TxVersion and the fluent TransactionBuilder
//! codec.rs    — Consensus byte encoding (deposit field, CompactSize)
//! funding.rs  — Largest-first coin selection with change
//! signing.rs  — Per-input Ed25519 sighash signing and verification
//! inspect.rs  — JSON views for decoderawtransaction / getrawtransaction
//! ```
//!
//! ## Transaction Lifecycle
//!
//! 1. **Build** — [`TransactionBuilder`] or [`build_transaction`] for a target height.
//! 2. **Fund** — [`fund_transaction`] adds inputs and change.
//! 3. **Sign** — [`sign_transaction`] fills every input the key controls.
//! 4. **Submit** — the raw bytes go to the validation pipeline.
//!
//! The deposit set at step 1 survives steps 2 and 3 unchanged.

pub mod builder;
pub mod codec;
pub mod funding;
pub mod inspect;
pub mod signing;
pub mod types;

pub use builder::{build_transaction, Transaction, TransactionBuilder, TxVersion};
pub use codec::{decode, decode_hex, encode, DecodeError};
pub use funding::{fund_transaction, FundedTransaction, FundingError};
pub use inspect::TransactionView;
pub use signing::{sign_transaction, verify_input, ScriptError, SigningError, SigningReport};
pub use types::{Address, AddressError, OutPoint, TxId, TxIn, TxOut};
