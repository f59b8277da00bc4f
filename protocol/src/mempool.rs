//! Priority-ordered transaction pool.
//!
//! Holds transactions that passed validation against the confirmed chain
//! and are waiting for a block. Entries are indexed by txid, by the
//! outpoints they spend (for conflict detection) and by fee-per-byte for
//! block assembly.
//!
//! ## Design
//!
//! - `DashMap` indices give lock-free reads for RPC queries.
//! - `parking_lot::RwLock<BTreeMap>` protects the fee index. Every insert
//!   and removal takes its write lock first, so two conflicting spends can
//!   never both enter the pool.
//! - When the pool is full, the lowest fee-per-byte entry is evicted if the
//!   incoming transaction pays a higher rate.
//!
//! Deposits never touch the chain supply from here; the ledger only moves
//! when a block connects.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::amount::Amount;
use crate::consensus::error::TransactionError;
use crate::transaction::codec::DecodeError;
use crate::transaction::{OutPoint, Transaction, TxId};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunable parameters for mempool behaviour.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions the pool will hold.
    pub max_size: usize,
    /// Minimum absolute fee. Zero on regtest.
    pub min_fee: Amount,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_size: 10_000,
            min_fee: Amount::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// MempoolError
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error(transparent)]
    Rejected(#[from] TransactionError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("coinbase transactions are only valid in blocks")]
    Coinbase,

    #[error("transaction {0} already in mempool")]
    Duplicate(TxId),

    #[error("input {outpoint} already spent by mempool transaction {by}")]
    Conflict { outpoint: OutPoint, by: TxId },

    #[error("fee too low: minimum {min}, got {got}")]
    FeeTooLow { min: Amount, got: Amount },

    #[error("mempool is full ({size} transactions)")]
    Full { size: usize },
}

// ---------------------------------------------------------------------------
// FeeKey / MempoolEntry
// ---------------------------------------------------------------------------

/// Fee index key: highest fee-per-byte first, then oldest, then txid.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FeeKey {
    inverted_fee: u64,
    sequence: u64,
    txid: TxId,
}

/// A pooled transaction with the metadata computed at acceptance.
#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: TxId,
    pub fee: Amount,
    pub size: usize,
    /// Chain tip height when the transaction was accepted.
    pub height: u64,
    /// Unix timestamp (seconds) of acceptance.
    pub added_at: i64,
    sequence: u64,
}

impl MempoolEntry {
    pub fn fee_per_byte(&self) -> u64 {
        if self.size == 0 {
            0
        } else {
            self.fee.zat() / self.size as u64
        }
    }

    fn key(&self) -> FeeKey {
        FeeKey {
            inverted_fee: u64::MAX - self.fee_per_byte(),
            sequence: self.sequence,
            txid: self.txid,
        }
    }
}

// ---------------------------------------------------------------------------
// Mempool
// ---------------------------------------------------------------------------

/// Aggregate figures for `getmempoolinfo`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MempoolStats {
    pub size: usize,
    pub bytes: usize,
    pub total_fee: Amount,
    pub total_deposits: Amount,
}

pub struct Mempool {
    entries: DashMap<TxId, MempoolEntry>,
    spent_by: DashMap<OutPoint, TxId>,
    fee_index: RwLock<BTreeMap<FeeKey, TxId>>,
    sequence: AtomicU64,
    config: MempoolConfig,
}

impl fmt::Debug for Mempool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mempool")
            .field("size", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

impl Mempool {
    pub fn new(config: MempoolConfig) -> Self {
        Self {
            entries: DashMap::new(),
            spent_by: DashMap::new(),
            fee_index: RwLock::new(BTreeMap::new()),
            sequence: AtomicU64::new(0),
            config,
        }
    }

    /// Add a transaction that has already passed consensus validation.
    ///
    /// Checks, in order: coinbase, duplicate, conflicting spend, minimum
    /// fee, capacity (with eviction of the cheapest entry).
    pub fn add(&self, tx: Transaction, fee: Amount, height: u64) -> Result<TxId, MempoolError> {
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        let txid = tx.txid();

        let mut index = self.fee_index.write();
        if self.entries.contains_key(&txid) {
            return Err(MempoolError::Duplicate(txid));
        }
        for outpoint in tx.spent_outpoints() {
            if let Some(by) = self.spent_by.get(outpoint) {
                return Err(MempoolError::Conflict {
                    outpoint: *outpoint,
                    by: *by,
                });
            }
        }
        if fee < self.config.min_fee {
            return Err(MempoolError::FeeTooLow {
                min: self.config.min_fee,
                got: fee,
            });
        }

        let entry = MempoolEntry {
            size: tx.size_bytes(),
            tx,
            txid,
            fee,
            height,
            added_at: Utc::now().timestamp(),
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
        };

        if self.entries.len() >= self.config.max_size {
            let lowest = index.keys().next_back().cloned();
            match lowest {
                Some(key) if u64::MAX - key.inverted_fee < entry.fee_per_byte() => {
                    index.remove(&key);
                    self.unlink(&key.txid);
                    tracing::debug!(evicted = %key.txid, "mempool eviction");
                }
                _ => {
                    return Err(MempoolError::Full {
                        size: self.config.max_size,
                    })
                }
            }
        }

        for outpoint in entry.tx.spent_outpoints() {
            self.spent_by.insert(*outpoint, txid);
        }
        index.insert(entry.key(), txid);
        self.entries.insert(txid, entry);
        Ok(txid)
    }

    /// Remove a transaction and return it.
    pub fn remove(&self, txid: &TxId) -> Option<Transaction> {
        let mut index = self.fee_index.write();
        let entry = self.unlink(txid)?;
        index.remove(&entry.key());
        Some(entry.tx)
    }

    /// Remove every entry for which `keep` returns `false`. Returns the
    /// removed txids.
    pub fn retain<F>(&self, mut keep: F) -> Vec<TxId>
    where
        F: FnMut(&MempoolEntry) -> bool,
    {
        let doomed: Vec<TxId> = self
            .entries
            .iter()
            .filter(|e| !keep(e.value()))
            .map(|e| *e.key())
            .collect();
        for txid in &doomed {
            self.remove(txid);
        }
        doomed
    }

    pub fn get(&self, txid: &TxId) -> Option<Transaction> {
        self.entries.get(txid).map(|e| e.tx.clone())
    }

    pub fn entry(&self, txid: &TxId) -> Option<MempoolEntry> {
        self.entries.get(txid).map(|e| e.clone())
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    /// The mempool transaction spending `outpoint`, if any.
    pub fn spender_of(&self, outpoint: &OutPoint) -> Option<TxId> {
        self.spent_by.get(outpoint).map(|t| *t)
    }

    /// Up to `max_count` entries, highest fee-per-byte first.
    pub fn select_transactions(&self, max_count: usize) -> Vec<MempoolEntry> {
        let index = self.fee_index.read();
        index
            .values()
            .filter_map(|txid| self.entries.get(txid).map(|e| e.clone()))
            .take(max_count)
            .collect()
    }

    pub fn txids(&self) -> Vec<TxId> {
        self.fee_index.read().values().copied().collect()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> MempoolStats {
        self.entries.iter().fold(MempoolStats::default(), |mut s, e| {
            s.size += 1;
            s.bytes += e.size;
            s.total_fee = s.total_fee.checked_add(e.fee).unwrap_or(s.total_fee);
            s.total_deposits = s
                .total_deposits
                .checked_add(e.tx.zsf_deposit())
                .unwrap_or(s.total_deposits);
            s
        })
    }

    pub fn clear(&self) {
        let mut index = self.fee_index.write();
        index.clear();
        self.entries.clear();
        self.spent_by.clear();
    }

    /// Drop an entry from the txid and outpoint maps. Caller holds the fee
    /// index write lock.
    fn unlink(&self, txid: &TxId) -> Option<MempoolEntry> {
        let (_, entry) = self.entries.remove(txid)?;
        for outpoint in entry.tx.spent_outpoints() {
            self.spent_by.remove(outpoint);
        }
        Some(entry)
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new(MempoolConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
