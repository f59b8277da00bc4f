//! # Validation Pipeline
//!
//! The single entry point for chain and mempool mutation. Two paths share
//! the rules in [`super::rules`]:
//!
//! ```text
//! accept_transaction  — height = tip + 1, confirmed UTXOs, then the mempool
//! connect_block       — height = block height, staged UTXOs per block,
//!                       then UTXO set + undo + tx index + supply ledger
//! ```
//!
//! ## Locking
//!
//! The chain lives behind one `parking_lot::RwLock`. Block connect,
//! disconnect and reorganize hold the write lock for the whole operation,
//! then downgrade it to refresh the mempool. Mempool acceptance holds the
//! read lock across validation and insertion, so it never interleaves with
//! a block.
//!
//! ## Halting
//!
//! A supply ledger error means the ledger and the chain disagree. The
//! pipeline logs it, refuses every later block operation with
//! [`BlockError::Halted`] and leaves the state exactly as it was before the
//! failing operation.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

use super::error::{BlockError, TransactionError};
use super::rules;
use crate::activation::ActivationError;
use crate::amount::Amount;
use crate::config::ChainParams;
use crate::mempool::{Mempool, MempoolConfig, MempoolError};
use crate::storage::block::compute_merkle_root;
use crate::storage::{Block, BlockHash, ChainState, ChainSupplyState, StagedUtxos};
use crate::transaction::{codec, Transaction, TxId, TxIn};

pub struct ValidationPipeline {
    chain: RwLock<ChainState>,
    mempool: Mempool,
    halted: AtomicBool,
}

impl ValidationPipeline {
    pub fn new(params: ChainParams, mempool: MempoolConfig) -> Result<Self, ActivationError> {
        Ok(Self {
            chain: RwLock::new(ChainState::new(params)?),
            mempool: Mempool::new(mempool),
            halted: AtomicBool::new(false),
        })
    }

    /// Run `f` against a consistent snapshot of the chain.
    pub fn with_chain<R>(&self, f: impl FnOnce(&ChainState) -> R) -> R {
        f(&self.chain.read())
    }

    pub fn chain_value(&self) -> Amount {
        self.chain.read().chain_value()
    }

    pub fn supply(&self) -> ChainSupplyState {
        self.chain.read().supply()
    }

    pub fn tip_height(&self) -> u64 {
        self.chain.read().tip_height()
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Mempool path
    // -----------------------------------------------------------------------

    pub fn accept_raw_transaction(&self, bytes: &[u8]) -> Result<TxId, MempoolError> {
        let tx = codec::decode(bytes)?;
        self.accept_transaction(tx)
    }

    /// Validate `tx` for inclusion in the next block and add it to the
    /// mempool. Never touches the supply ledger.
    pub fn accept_transaction(&self, tx: Transaction) -> Result<TxId, MempoolError> {
        let chain = self.chain.read();
        self.accept_locked(&chain, tx)
    }

    fn accept_locked(&self, chain: &ChainState, tx: Transaction) -> Result<TxId, MempoolError> {
        if tx.is_coinbase() {
            return Err(MempoolError::Coinbase);
        }
        let height = chain.tip_height() + 1;
        let txid = tx.txid();

        let fee = rules::validate_transaction(
            &tx,
            chain.registry(),
            height,
            chain.params().coinbase_maturity,
            chain.utxos(),
        )
        .map_err(|e| {
            warn!(%txid, height, error = %e, "transaction rejected");
            e
        })?;

        let deposit = tx.zsf_deposit();
        match self.mempool.add(tx, fee, chain.tip_height()) {
            Ok(txid) => {
                debug!(%txid, height, %fee, zsf_deposit = %deposit, "transaction accepted to mempool");
                Ok(txid)
            }
            Err(e) => {
                warn!(%txid, error = %e, "transaction rejected by mempool");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Block path
    // -----------------------------------------------------------------------

    pub fn connect_raw_block(&self, bytes: &[u8]) -> Result<BlockHash, BlockError> {
        let block = Block::decode(bytes)?;
        self.connect_block(block)
    }

    /// Validate `block` against the current tip and connect it. On any
    /// error nothing changes.
    pub fn connect_block(&self, block: Block) -> Result<BlockHash, BlockError> {
        self.ensure_running()?;
        let mut chain = self.chain.write();
        let hash = self.connect_locked(&mut chain, block)?;

        let chain = RwLockWriteGuard::downgrade(chain);
        self.refresh_mempool(&chain);
        Ok(hash)
    }

    /// Disconnect the tip block. Its non-coinbase transactions are offered
    /// back to the mempool.
    pub fn disconnect_tip(&self) -> Result<Block, BlockError> {
        self.ensure_running()?;
        let mut chain = self.chain.write();
        let block = self.disconnect_locked(&mut chain)?;

        let chain = RwLockWriteGuard::downgrade(chain);
        self.refresh_mempool(&chain);
        self.resubmit(&chain, &block.transactions);
        Ok(block)
    }

    /// Replace the chain above `fork_height` with `blocks`.
    ///
    /// Runs as one operation under the write lock. If any new block fails,
    /// the original chain is restored and the error is returned.
    pub fn reorganize(&self, fork_height: u64, blocks: Vec<Block>) -> Result<BlockHash, BlockError> {
        self.ensure_running()?;
        let mut chain = self.chain.write();
        let tip = chain.tip_height();
        if fork_height > tip {
            return Err(BlockError::InvalidForkPoint { fork_height, tip });
        }

        let mut disconnected = Vec::with_capacity((tip - fork_height) as usize);
        while chain.tip_height() > fork_height {
            match self.disconnect_locked(&mut chain) {
                Ok(block) => disconnected.push(block),
                Err(e) => {
                    self.restore(&mut chain, 0, disconnected);
                    return Err(e);
                }
            }
        }

        let new_blocks = blocks.len();
        for (connected, block) in blocks.into_iter().enumerate() {
            if let Err(e) = self.connect_locked(&mut chain, block) {
                warn!(fork_height, connected, error = %e, "reorganization failed, restoring chain");
                self.restore(&mut chain, connected, disconnected);
                return Err(e);
            }
        }

        let hash = chain.tip_hash();
        info!(
            fork_height,
            disconnected = disconnected.len(),
            connected = new_blocks,
            tip = chain.tip_height(),
            %hash,
            "chain reorganized"
        );

        let chain = RwLockWriteGuard::downgrade(chain);
        self.refresh_mempool(&chain);
        for block in disconnected.iter().rev() {
            self.resubmit(&chain, &block.transactions);
        }
        Ok(hash)
    }

    fn ensure_running(&self) -> Result<(), BlockError> {
        if self.is_halted() {
            Err(BlockError::Halted)
        } else {
            Ok(())
        }
    }

    fn connect_locked(&self, chain: &mut ChainState, block: Block) -> Result<BlockHash, BlockError> {
        // A writer that failed before us may have halted the pipeline while
        // this caller waited for the lock.
        self.ensure_running()?;
        let fees = validate_block(chain, &block)?;
        let height = block.height();
        let hash = block.hash();
        let transactions = block.transactions.len();
        let deposits = block.total_deposits().unwrap_or(Amount::ZERO);

        chain.commit_block(block).map_err(|e| self.escalate(e.into()))?;

        info!(
            height,
            %hash,
            transactions,
            %fees,
            zsf_deposits = %deposits,
            chain_value = %chain.chain_value(),
            "block connected"
        );
        Ok(hash)
    }

    fn disconnect_locked(&self, chain: &mut ChainState) -> Result<Block, BlockError> {
        self.ensure_running()?;
        let block = chain.pop_block().map_err(|e| self.escalate(e.into()))?;
        info!(
            height = block.height(),
            hash = %block.hash(),
            chain_value = %chain.chain_value(),
            "block disconnected"
        );
        Ok(block)
    }

    /// Undo a partial reorganization: pop the `connected` new blocks, then
    /// recommit the old ones. These blocks were valid on this chain before,
    /// so any failure here is a ledger fault.
    fn restore(&self, chain: &mut ChainState, connected: usize, mut disconnected: Vec<Block>) {
        for _ in 0..connected {
            if let Err(e) = chain.pop_block() {
                self.escalate(e.into());
                return;
            }
        }
        while let Some(block) = disconnected.pop() {
            if let Err(e) = chain.commit_block(block) {
                self.escalate(e.into());
                return;
            }
        }
    }

    /// Halt on ledger faults. Returns the error for propagation.
    fn escalate(&self, e: BlockError) -> BlockError {
        if let BlockError::LedgerInvariantViolation(ref source) = e {
            error!(error = %source, "chain supply invariant violated, halting block acceptance");
            self.halted.store(true, Ordering::Release);
        }
        e
    }

    /// Drop mempool entries that no longer validate for the next block:
    /// included, conflicting, expired or bound to a stale branch.
    fn refresh_mempool(&self, chain: &ChainState) {
        let height = chain.tip_height() + 1;
        let maturity = chain.params().coinbase_maturity;
        let removed = self.mempool.retain(|entry| {
            rules::validate_transaction(&entry.tx, chain.registry(), height, maturity, chain.utxos())
                .is_ok()
        });
        if !removed.is_empty() {
            debug!(removed = removed.len(), height, "mempool refreshed");
        }
    }

    fn resubmit(&self, chain: &ChainState, transactions: &[Transaction]) {
        for tx in transactions.iter().filter(|tx| !tx.is_coinbase()) {
            if let Err(e) = self.accept_locked(chain, tx.clone()) {
                debug!(txid = %tx.txid(), error = %e, "disconnected transaction dropped");
            }
        }
    }
}

/// Every rule a block must pass before it may touch the chain. Returns the
/// total fees of its transactions.
fn validate_block(chain: &ChainState, block: &Block) -> Result<Amount, BlockError> {
    let height = block.height();
    let expected = chain.tip_height() + 1;
    if height != expected {
        return Err(BlockError::NonSequentialBlock {
            expected,
            got: height,
        });
    }
    let tip_hash = chain.tip_hash();
    if block.header.prev_hash != tip_hash {
        return Err(BlockError::PrevHashMismatch {
            expected: tip_hash,
            found: block.header.prev_hash,
        });
    }
    if block.header.merkle_root != compute_merkle_root(&block.transactions) {
        return Err(BlockError::BadMerkleRoot);
    }

    let coinbase = check_coinbase(chain, block)?;
    let tx_error = |index: usize, tx: &Transaction, source: TransactionError| BlockError::Transaction {
        index,
        txid: tx.txid(),
        source,
    };

    let registry = chain.registry();
    let maturity = chain.params().coinbase_maturity;
    let mut staged = StagedUtxos::new(chain.utxos());
    staged.apply_transaction(coinbase, height);

    let mut fees = Amount::ZERO;
    for (index, tx) in block.transactions.iter().enumerate().skip(1) {
        let fee = rules::validate_transaction(tx, registry, height, maturity, &staged)
            .map_err(|e| tx_error(index, tx, e))?;
        fees = fees.checked_add(fee).ok_or(BlockError::ValueOverflow)?;
        staged.apply_transaction(tx, height);
    }

    let paid = coinbase.total_output().ok_or(BlockError::ValueOverflow)?;
    let allowed = chain
        .subsidy(height)
        .checked_add(fees)
        .ok_or(BlockError::ValueOverflow)?;
    if paid > allowed {
        return Err(BlockError::CoinbaseOverpays { paid, allowed });
    }
    Ok(fees)
}

fn check_coinbase<'b>(chain: &ChainState, block: &'b Block) -> Result<&'b Transaction, BlockError> {
    let height = block.height();
    let coinbase = block
        .coinbase()
        .filter(|tx| tx.is_coinbase())
        .ok_or(BlockError::BadCoinbase("first transaction is not a coinbase"))?;
    if block.transactions.iter().skip(1).any(Transaction::is_coinbase) {
        return Err(BlockError::BadCoinbase("more than one coinbase"));
    }
    if coinbase.inputs[0].script_sig != TxIn::coinbase(height).script_sig {
        return Err(BlockError::BadCoinbase("coinbase does not commit to the block height"));
    }
    if !coinbase.zsf_deposit().is_zero() {
        return Err(BlockError::BadCoinbase("coinbase carries a zsf deposit"));
    }

    rules::check_structure(coinbase)
        .and_then(|()| rules::check_contextual(coinbase, chain.registry(), height))
        .map_err(|source| BlockError::Transaction {
            index: 0,
            txid: coinbase.txid(),
            source,
        })?;
    Ok(coinbase)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
