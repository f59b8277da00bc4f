//! Transaction rules shared by mempool acceptance and block connection.
//!
//! The checks run cheapest first:
//!
//! 1. [`check_structure`] — context-free shape and value ranges.
//! 2. [`check_contextual`] — the ZSF deposit activation gate, then version,
//!    consensus branch and expiry at the target height.
//! 3. [`check_inputs`] — resolve inputs against a UTXO view, coinbase
//!    maturity, signatures, then the balance.
//!
//! The deposit gate always runs before any input or balance work, so a
//! deposit sent too early is reported as such even if it is also
//! unfunded.

use std::collections::HashSet;

use super::balance::verify_balance;
use super::error::TransactionError;
use crate::activation::{ActivationRegistry, NetworkUpgrade};
use crate::amount::Amount;
use crate::storage::UtxoView;
use crate::transaction::signing::verify_input;
use crate::transaction::Transaction;

/// Context-free checks. Coinbase transactions pass through here too; their
/// extra rules are applied by block validation.
pub fn check_structure(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        return Err(TransactionError::NoInputs);
    }
    if tx.outputs.is_empty() && tx.zsf_deposit().is_zero() {
        return Err(TransactionError::NoOutputs);
    }

    if !tx.is_coinbase() {
        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if input.prevout.is_null() {
                return Err(TransactionError::NullPrevout);
            }
            if !seen.insert(input.prevout) {
                return Err(TransactionError::DuplicateInput(input.prevout));
            }
        }
    }

    if !tx.zsf_deposit().is_money_range() || tx.outputs.iter().any(|o| !o.value.is_money_range()) {
        return Err(TransactionError::ValueOutOfRange);
    }
    tx.total_output()
        .and_then(|total| total.checked_add(tx.zsf_deposit()))
        .ok_or(TransactionError::ValueOutOfRange)?;
    Ok(())
}

/// Height-dependent header checks for a transaction to be mined at `height`.
pub fn check_contextual(
    tx: &Transaction,
    registry: &ActivationRegistry,
    height: u64,
) -> Result<(), TransactionError> {
    if !tx.zsf_deposit().is_zero() && !registry.is_active(NetworkUpgrade::ZFuture, height) {
        return Err(TransactionError::FeatureNotActive { height });
    }

    let version = tx.version();
    if !registry.is_active(version.required_upgrade(), height) {
        return Err(TransactionError::VersionNotActive {
            version: version.number(),
            height,
        });
    }

    let expected = registry.branch_id_at(height);
    if tx.consensus_branch_id != expected {
        return Err(TransactionError::WrongConsensusBranch {
            expected,
            found: tx.consensus_branch_id,
            height,
        });
    }

    if tx.expiry_height != 0 && height > u64::from(tx.expiry_height) {
        return Err(TransactionError::Expired {
            expiry_height: tx.expiry_height,
            height,
        });
    }
    Ok(())
}

/// Resolve inputs, check maturity and signatures, and verify the balance.
/// Returns the fee.
pub fn check_inputs(
    tx: &Transaction,
    view: &dyn UtxoView,
    height: u64,
    coinbase_maturity: u64,
) -> Result<Amount, TransactionError> {
    let mut values = Vec::with_capacity(tx.inputs.len());
    let mut spent = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let coin = view
            .coin(&input.prevout)
            .ok_or(TransactionError::MissingInput(input.prevout))?;
        if !coin.is_mature(height, coinbase_maturity) {
            return Err(TransactionError::ImmatureCoinbase {
                outpoint: input.prevout,
                created: coin.height,
                height,
            });
        }
        values.push(coin.output.value);
        spent.push(coin.output);
    }

    for (index, output) in spent.iter().enumerate() {
        verify_input(tx, index, output)?;
    }

    Ok(verify_balance(tx, &values)?)
}

/// All transaction rules in order, for a non-coinbase transaction mined at
/// `height` against `view`. Returns the fee.
pub fn validate_transaction(
    tx: &Transaction,
    registry: &ActivationRegistry,
    height: u64,
    coinbase_maturity: u64,
    view: &dyn UtxoView,
) -> Result<Amount, TransactionError> {
    check_structure(tx)?;
    if tx.is_coinbase() {
        return Err(TransactionError::NullPrevout);
    }
    check_contextual(tx, registry, height)?;
    check_inputs(tx, view, height, coinbase_maturity)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
