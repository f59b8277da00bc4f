//! Input signing with Ed25519 keypairs.
//!
//! Signing is a separate step from building and funding. Each input is
//! signed over its own sighash:
//!
//! ```text
//! double_sha256( encode(tx with every script_sig emptied)
//!             || input index u32 LE
//!             || spent value u64 LE
//!             || spent address hash [20] )
//! ```
//!
//! The encoding includes the header, the branch id and the ZSF deposit, so
//! a signature also commits to the deposit and to the upgrade it was made
//! for. The resulting `script_sig` is `signature || public key`.

use thiserror::Error;

use super::builder::Transaction;
use super::types::{Address, TxOut};
use crate::crypto::hash::double_sha256;
use crate::crypto::keys::{Keypair, PublicKey, Signature, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};

/// Length of a signed spend's script_sig.
pub const SCRIPT_SIG_LENGTH: usize = SIGNATURE_LENGTH + PUBLIC_KEY_LENGTH;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("{spent} spent outputs supplied for {inputs} inputs")]
    InputCountMismatch { inputs: usize, spent: usize },
}

/// Reasons an input's script_sig fails to authorize the spend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("input {0} is not signed")]
    Missing(usize),

    #[error("input {0} script_sig is malformed")]
    Malformed(usize),

    #[error("input {0} public key does not match the spent address")]
    KeyMismatch(usize),

    #[error("input {0} signature is invalid")]
    BadSignature(usize),
}

/// Outcome of [`sign_transaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SigningReport {
    /// Inputs signed by this call.
    pub signed: usize,
    /// Every input is now signed.
    pub complete: bool,
}

/// Digest signed for input `index`, which spends `spent`.
pub fn sighash(tx: &Transaction, index: usize, spent: &TxOut) -> [u8; 32] {
    let mut stripped = tx.clone();
    for input in &mut stripped.inputs {
        input.script_sig.clear();
    }
    let mut data = stripped.encode();
    data.extend_from_slice(&(index as u32).to_le_bytes());
    data.extend_from_slice(&spent.value.zat().to_le_bytes());
    data.extend_from_slice(spent.address.hash());
    double_sha256(&data)
}

/// Sign every input whose spent output pays to `keypair`'s address.
///
/// `spent_outputs[i]` is the output consumed by `tx.inputs[i]`. Inputs the
/// key does not control are left untouched, so several keys can sign the
/// same transaction in turn.
pub fn sign_transaction(
    tx: &mut Transaction,
    keypair: &Keypair,
    spent_outputs: &[TxOut],
) -> Result<SigningReport, SigningError> {
    if spent_outputs.len() != tx.inputs.len() {
        return Err(SigningError::InputCountMismatch {
            inputs: tx.inputs.len(),
            spent: spent_outputs.len(),
        });
    }

    let public_key = keypair.public_key();
    let ours = Address::from_public_key(&public_key);
    let mut signed = 0;
    for (index, spent) in spent_outputs.iter().enumerate() {
        if spent.address != ours || tx.inputs[index].is_coinbase() {
            continue;
        }
        let signature = keypair.sign(&sighash(tx, index, spent));
        let mut script_sig = Vec::with_capacity(SCRIPT_SIG_LENGTH);
        script_sig.extend_from_slice(signature.as_bytes());
        script_sig.extend_from_slice(public_key.as_bytes());
        tx.inputs[index].script_sig = script_sig;
        signed += 1;
    }

    Ok(SigningReport {
        signed,
        complete: tx.is_signed(),
    })
}

/// Check that input `index` is authorized to spend `spent`.
pub fn verify_input(tx: &Transaction, index: usize, spent: &TxOut) -> Result<(), ScriptError> {
    let script_sig = &tx.inputs[index].script_sig;
    if script_sig.is_empty() {
        return Err(ScriptError::Missing(index));
    }
    if script_sig.len() != SCRIPT_SIG_LENGTH {
        return Err(ScriptError::Malformed(index));
    }
    let (sig_bytes, key_bytes) = script_sig.split_at(SIGNATURE_LENGTH);
    let signature = Signature::try_from_slice(sig_bytes).map_err(|_| ScriptError::Malformed(index))?;
    let public_key =
        PublicKey::try_from_slice(key_bytes).map_err(|_| ScriptError::Malformed(index))?;

    if Address::from_public_key(&public_key) != spent.address {
        return Err(ScriptError::KeyMismatch(index));
    }
    if !public_key.verify(&sighash(tx, index, spent), &signature) {
        return Err(ScriptError::BadSignature(index));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
