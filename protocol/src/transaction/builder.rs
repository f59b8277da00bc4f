//! Transaction structure and construction via the builder pattern.
//!
//! The [`TransactionBuilder`] picks the transaction version, consensus
//! branch id and expiry height for a target height, then hands back an
//! unsigned [`Transaction`]. Funding happens in [`super::funding`] and
//! signing in [`super::signing`]; none of the three stages touch the ZSF
//! deposit once it is set.
//!
//! The version and the deposit are private to the crate. A non-zero
//! deposit can only be set through [`Transaction::set_zsf_deposit`], which
//! moves the transaction to the ZFuture version, so every `Transaction`
//! value has a valid encoding.

use crate::activation::{ActivationRegistry, NetworkUpgrade};
use crate::amount::Amount;
use crate::config::{
    TX_EXPIRY_DELTA, TX_VERSION_V5, TX_VERSION_ZFUTURE, V5_VERSION_GROUP_ID,
    ZFUTURE_VERSION_GROUP_ID,
};

use super::codec;
use super::types::{Address, OutPoint, TxId, TxIn, TxOut};
use crate::crypto::hash::double_sha256;

// ---------------------------------------------------------------------------
// TxVersion
// ---------------------------------------------------------------------------

/// Transaction format versions understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxVersion {
    /// Version 5: no deposit field.
    V5,
    /// ZFuture: carries the ZSF deposit field after the header.
    ZFuture,
}

impl TxVersion {
    pub fn number(self) -> u32 {
        match self {
            TxVersion::V5 => TX_VERSION_V5,
            TxVersion::ZFuture => TX_VERSION_ZFUTURE,
        }
    }

    pub fn version_group_id(self) -> u32 {
        match self {
            TxVersion::V5 => V5_VERSION_GROUP_ID,
            TxVersion::ZFuture => ZFUTURE_VERSION_GROUP_ID,
        }
    }

    pub fn from_number(version: u32) -> Option<Self> {
        match version {
            TX_VERSION_V5 => Some(TxVersion::V5),
            TX_VERSION_ZFUTURE => Some(TxVersion::ZFuture),
            _ => None,
        }
    }

    /// The upgrade that must be active for this version to be valid.
    pub fn required_upgrade(self) -> NetworkUpgrade {
        match self {
            TxVersion::V5 => NetworkUpgrade::Nu5,
            TxVersion::ZFuture => NetworkUpgrade::ZFuture,
        }
    }

    pub fn has_deposit_field(self) -> bool {
        matches!(self, TxVersion::ZFuture)
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

/// A transparent transaction with an optional ZSF deposit.
///
/// `fee = Σ resolved inputs − Σ outputs − zsf_deposit`. The deposit is
/// value removed from circulation; it is not paid to anyone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub(crate) version: TxVersion,
    pub consensus_branch_id: u32,
    pub lock_time: u32,
    pub expiry_height: u32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub(crate) zsf_deposit: Amount,
}

impl Transaction {
    /// An empty transaction of the given version.
    pub fn new(version: TxVersion, consensus_branch_id: u32) -> Self {
        Self {
            version,
            consensus_branch_id,
            lock_time: 0,
            expiry_height: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            zsf_deposit: Amount::ZERO,
        }
    }

    /// Coinbase for the block at `height` paying `outputs`.
    pub fn coinbase(height: u64, consensus_branch_id: u32, outputs: Vec<TxOut>) -> Self {
        let mut tx = Self::new(TxVersion::V5, consensus_branch_id);
        tx.inputs.push(TxIn::coinbase(height));
        tx.outputs = outputs;
        tx
    }

    pub fn version(&self) -> TxVersion {
        self.version
    }

    pub fn zsf_deposit(&self) -> Amount {
        self.zsf_deposit
    }

    /// Set the deposit. A non-zero deposit moves a v5 transaction to the
    /// ZFuture version; clearing it leaves the version alone.
    pub fn set_zsf_deposit(&mut self, deposit: Amount) {
        if !deposit.is_zero() {
            self.version = TxVersion::ZFuture;
        }
        self.zsf_deposit = deposit;
    }

    /// Exactly one input, spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Consensus encoding.
    pub fn encode(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// `double_sha256` of the consensus encoding.
    pub fn txid(&self) -> TxId {
        TxId::from_bytes(double_sha256(&self.encode()))
    }

    /// Encoded size, used for fee-rate ordering.
    pub fn size_bytes(&self) -> usize {
        self.encode().len()
    }

    /// Checked sum of all output values.
    pub fn total_output(&self) -> Option<Amount> {
        Amount::sum(self.outputs.iter().map(|o| o.value))
    }

    /// `true` when every non-coinbase input carries a script_sig.
    pub fn is_signed(&self) -> bool {
        self.inputs
            .iter()
            .all(|i| i.is_coinbase() || !i.script_sig.is_empty())
    }

    /// Outpoints spent by this transaction (empty for a coinbase).
    pub fn spent_outpoints(&self) -> impl Iterator<Item = &OutPoint> {
        self.inputs
            .iter()
            .filter(|i| !i.is_coinbase())
            .map(|i| &i.prevout)
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for unsigned [`Transaction`] instances.
///
/// ```rust,no_run
/// use zsf_protocol::amount::Amount;
/// use zsf_protocol::config::ChainParams;
/// use zsf_protocol::transaction::{Address, TransactionBuilder};
///
/// let registry = ChainParams::regtest().activation_registry().unwrap();
/// let tx = TransactionBuilder::new(&registry, 103)
///     .output(Address::from_hash([1u8; 20]), Amount::from_zat(123_000_000))
///     .zsf_deposit(Amount::from_zat(111_000_000))
///     .build();
/// ```
///
/// Defaults: version v5 (ZFuture once a deposit is set), the branch id in
/// effect at the target height, `expiry_height = target + TX_EXPIRY_DELTA`
/// and `lock_time = 0`.
pub struct TransactionBuilder {
    consensus_branch_id: u32,
    expiry_height: u32,
    lock_time: u32,
    inputs: Vec<TxIn>,
    outputs: Vec<TxOut>,
    zsf_deposit: Amount,
}

impl TransactionBuilder {
    /// A builder for a transaction to be mined at `target_height`.
    pub fn new(registry: &ActivationRegistry, target_height: u64) -> Self {
        let expiry = target_height.saturating_add(u64::from(TX_EXPIRY_DELTA));
        Self {
            consensus_branch_id: registry.branch_id_at(target_height),
            expiry_height: u32::try_from(expiry).unwrap_or(u32::MAX),
            lock_time: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            zsf_deposit: Amount::ZERO,
        }
    }

    pub fn input(mut self, prevout: OutPoint) -> Self {
        self.inputs.push(TxIn::new(prevout));
        self
    }

    pub fn inputs<I: IntoIterator<Item = OutPoint>>(mut self, prevouts: I) -> Self {
        self.inputs.extend(prevouts.into_iter().map(TxIn::new));
        self
    }

    pub fn output(mut self, address: Address, value: Amount) -> Self {
        self.outputs.push(TxOut::new(address, value));
        self
    }

    pub fn zsf_deposit(mut self, deposit: Amount) -> Self {
        self.zsf_deposit = deposit;
        self
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    /// Override the expiry height. `0` disables expiry.
    pub fn expiry_height(mut self, expiry_height: u32) -> Self {
        self.expiry_height = expiry_height;
        self
    }

    pub fn build(self) -> Transaction {
        let mut tx = Transaction::new(TxVersion::V5, self.consensus_branch_id);
        tx.lock_time = self.lock_time;
        tx.expiry_height = self.expiry_height;
        tx.inputs = self.inputs;
        tx.outputs = self.outputs;
        tx.set_zsf_deposit(self.zsf_deposit);
        tx
    }
}

/// One-shot construction helper. With no inputs the result is an unfunded
/// shape ready for [`super::funding::fund_transaction`].
pub fn build_transaction(
    registry: &ActivationRegistry,
    target_height: u64,
    inputs: Vec<OutPoint>,
    outputs: Vec<(Address, Amount)>,
    zsf_deposit: Amount,
) -> Transaction {
    outputs
        .into_iter()
        .fold(
            TransactionBuilder::new(registry, target_height).inputs(inputs),
            |builder, (address, value)| builder.output(address, value),
        )
        .zsf_deposit(zsf_deposit)
        .build()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
