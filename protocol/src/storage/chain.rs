//! In-memory chain state: the active chain, its UTXO set, undo data, a
//! transaction index and the supply ledger.
//!
//! Blocks reach [`ChainState`] only through the validation pipeline, which
//! owns it behind a lock. Read accessors are public; mutation is crate
//! private.

use std::collections::HashMap;
use thiserror::Error;

use super::block::{Block, BlockHash};
use super::supply::{ChainSupplyLedger, ChainSupplyState, LedgerError};
use super::utxo::{BlockUndo, UtxoError, UtxoSet};
use crate::activation::{ActivationError, ActivationRegistry};
use crate::amount::Amount;
use crate::config::ChainParams;
use crate::transaction::{Transaction, TxId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Utxo(#[from] UtxoError),

    #[error("block {got} does not extend tip {tip}")]
    NotNextBlock { tip: u64, got: u64 },

    #[error("cannot disconnect the genesis block")]
    NothingToDisconnect,
}

/// A confirmed transaction and where it lives.
#[derive(Debug, Clone, Copy)]
pub struct TxLocation<'a> {
    pub tx: &'a Transaction,
    pub height: u64,
    pub block_hash: BlockHash,
}

#[derive(Debug)]
pub struct ChainState {
    params: ChainParams,
    registry: ActivationRegistry,
    /// Active chain, indexed by height. Always holds at least genesis.
    blocks: Vec<Block>,
    /// `undo[h - 1]` reverses the block at height `h`.
    undo: Vec<BlockUndo>,
    by_hash: HashMap<BlockHash, u64>,
    tx_index: HashMap<TxId, (u64, usize)>,
    utxos: UtxoSet,
    supply: ChainSupplyLedger,
}

impl ChainState {
    /// A chain holding only the genesis block.
    pub fn new(params: ChainParams) -> Result<Self, ActivationError> {
        let registry = params.activation_registry()?;
        let genesis = Block::genesis();
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis.hash(), 0);
        Ok(Self {
            params,
            registry,
            blocks: vec![genesis],
            undo: Vec::new(),
            by_hash,
            tx_index: HashMap::new(),
            utxos: UtxoSet::new(),
            supply: ChainSupplyLedger::new(),
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn registry(&self) -> &ActivationRegistry {
        &self.registry
    }

    pub fn tip_height(&self) -> u64 {
        (self.blocks.len() - 1) as u64
    }

    pub fn tip(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> BlockHash {
        self.tip().hash()
    }

    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.blocks.get(usize::try_from(height).ok()?)
    }

    pub fn block_by_hash(&self, hash: &BlockHash) -> Option<&Block> {
        self.by_hash.get(hash).and_then(|h| self.block_at(*h))
    }

    pub fn find_transaction(&self, txid: &TxId) -> Option<TxLocation<'_>> {
        let (height, position) = *self.tx_index.get(txid)?;
        let block = self.block_at(height)?;
        Some(TxLocation {
            tx: block.transactions.get(position)?,
            height,
            block_hash: block.hash(),
        })
    }

    /// Confirmations of a block at `height` on the active chain.
    pub fn confirmations(&self, height: u64) -> u64 {
        (self.tip_height() + 1).saturating_sub(height)
    }

    pub fn utxos(&self) -> &UtxoSet {
        &self.utxos
    }

    pub fn supply(&self) -> ChainSupplyState {
        self.supply.state()
    }

    pub fn chain_value(&self) -> Amount {
        self.supply.chain_value()
    }

    pub fn subsidy(&self, height: u64) -> Amount {
        self.params.subsidy.subsidy(height)
    }

    /// Append a block that has already been validated against this state.
    ///
    /// UTXOs first, then the ledger. If the ledger refuses, the UTXO change
    /// is reverted and nothing is appended.
    pub(crate) fn commit_block(&mut self, block: Block) -> Result<(), ChainError> {
        let height = block.height();
        if height != self.tip_height() + 1 {
            return Err(ChainError::NotNextBlock {
                tip: self.tip_height(),
                got: height,
            });
        }
        let subsidy = self.subsidy(height);
        let undo = self.utxos.apply_block(&block)?;
        if let Err(e) = self.supply.connect(&block, subsidy) {
            self.utxos.undo_block(&block, undo)?;
            return Err(e.into());
        }

        for (position, tx) in block.transactions.iter().enumerate() {
            self.tx_index.insert(tx.txid(), (height, position));
        }
        self.by_hash.insert(block.hash(), height);
        self.undo.push(undo);
        self.blocks.push(block);
        Ok(())
    }

    /// Remove the tip block, reversing [`ChainState::commit_block`] in
    /// inverse order: ledger first, then UTXOs.
    pub(crate) fn pop_block(&mut self) -> Result<Block, ChainError> {
        let height = self.tip_height();
        if height == 0 {
            return Err(ChainError::NothingToDisconnect);
        }
        let subsidy = self.subsidy(height);
        let tip = self.blocks.last().ok_or(ChainError::NothingToDisconnect)?;
        self.supply.disconnect(tip, subsidy)?;

        let (Some(block), Some(undo)) = (self.blocks.pop(), self.undo.pop()) else {
            return Err(ChainError::NothingToDisconnect);
        };
        if let Err(e) = self.utxos.undo_block(&block, undo.clone()) {
            self.supply.connect(&block, subsidy)?;
            self.undo.push(undo);
            self.blocks.push(block);
            return Err(e.into());
        }

        for tx in &block.transactions {
            self.tx_index.remove(&tx.txid());
        }
        self.by_hash.remove(&block.hash());
        Ok(block)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
