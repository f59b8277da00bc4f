//! # UTXO Set
//!
//! The set of unspent outputs, plus the per-block undo data needed to
//! disconnect a block exactly.
//!
//! Validation reads coins through the [`UtxoView`] trait. A block is checked
//! against a [`StagedUtxos`] overlay so later transactions in the block can
//! spend outputs created earlier in the same block without touching the
//! committed set. Only a fully valid block is applied with
//! [`UtxoSet::apply_block`].

use std::collections::{HashMap, HashSet};
use thiserror::Error;

use super::block::Block;
use crate::amount::Amount;
use crate::transaction::{Address, OutPoint, Transaction, TxOut};

/// Inconsistencies between a block and the UTXO set. These only occur if a
/// block reaches the set without having been validated against it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UtxoError {
    #[error("coin {0} is missing or already spent")]
    MissingCoin(OutPoint),

    #[error("coin {0} already exists")]
    DuplicateCoin(OutPoint),

    #[error("undo data does not match block {height}")]
    UndoMismatch { height: u64 },
}

/// A UTXO entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    pub output: TxOut,
    /// Height of the block that created the output.
    pub height: u64,
    pub is_coinbase: bool,
}

impl Coin {
    /// Coinbase outputs can be spent once `maturity` blocks have passed.
    pub fn is_mature(&self, spend_height: u64, maturity: u64) -> bool {
        !self.is_coinbase || spend_height >= self.height.saturating_add(maturity)
    }

    /// Confirmations as seen from a chain whose tip is `tip_height`.
    pub fn depth(&self, tip_height: u64) -> u64 {
        (tip_height + 1).saturating_sub(self.height)
    }
}

/// Read access to coins.
pub trait UtxoView {
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin>;
}

/// Coins spent by one block, grouped per transaction in block order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockUndo {
    pub spent: Vec<Vec<(OutPoint, Coin)>>,
}

// ---------------------------------------------------------------------------
// UtxoSet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UtxoSet {
    coins: HashMap<OutPoint, Coin>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    /// Sum of all unspent values; `None` only if the set is corrupt.
    pub fn total_value(&self) -> Option<Amount> {
        Amount::sum(self.coins.values().map(|c| c.output.value))
    }

    /// Unspent coins paying to `address`.
    pub fn coins_for(&self, address: &Address) -> Vec<(OutPoint, Coin)> {
        let mut coins: Vec<_> = self
            .coins
            .iter()
            .filter(|(_, coin)| coin.output.address == *address)
            .map(|(outpoint, coin)| (*outpoint, coin.clone()))
            .collect();
        coins.sort_by_key(|(outpoint, _)| *outpoint);
        coins
    }

    /// Spend inputs and create outputs for every transaction in `block`.
    ///
    /// On error the set is left unchanged.
    pub fn apply_block(&mut self, block: &Block) -> Result<BlockUndo, UtxoError> {
        let mut undo = BlockUndo::default();
        for tx in &block.transactions {
            match self.apply_transaction(tx, block.height()) {
                Ok(spent) => undo.spent.push(spent),
                Err(e) => {
                    let applied = undo.spent.len();
                    let partial = Block {
                        header: block.header.clone(),
                        transactions: block.transactions[..applied].to_vec(),
                    };
                    self.undo_block(&partial, undo)?;
                    return Err(e);
                }
            }
        }
        Ok(undo)
    }

    fn apply_transaction(&mut self, tx: &Transaction, height: u64) -> Result<Vec<(OutPoint, Coin)>, UtxoError> {
        let txid = tx.txid();
        if (0..tx.outputs.len()).any(|i| self.coins.contains_key(&OutPoint::new(txid, i as u32))) {
            return Err(UtxoError::DuplicateCoin(OutPoint::new(txid, 0)));
        }
        let mut spent = Vec::with_capacity(tx.inputs.len());
        for outpoint in tx.spent_outpoints() {
            match self.coins.remove(outpoint) {
                Some(coin) => spent.push((*outpoint, coin)),
                None => {
                    for (outpoint, coin) in spent.into_iter().rev() {
                        self.coins.insert(outpoint, coin);
                    }
                    return Err(UtxoError::MissingCoin(*outpoint));
                }
            }
        }
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            self.coins.insert(
                OutPoint::new(txid, index as u32),
                Coin {
                    output: output.clone(),
                    height,
                    is_coinbase,
                },
            );
        }
        Ok(spent)
    }

    /// Reverse [`UtxoSet::apply_block`]: remove the block's outputs and
    /// restore the coins it spent, last transaction first.
    pub fn undo_block(&mut self, block: &Block, undo: BlockUndo) -> Result<(), UtxoError> {
        if undo.spent.len() != block.transactions.len() {
            return Err(UtxoError::UndoMismatch {
                height: block.height(),
            });
        }
        for (tx, spent) in block.transactions.iter().zip(undo.spent).rev() {
            let txid = tx.txid();
            for index in 0..tx.outputs.len() {
                self.coins.remove(&OutPoint::new(txid, index as u32));
            }
            for (outpoint, coin) in spent.into_iter().rev() {
                self.coins.insert(outpoint, coin);
            }
        }
        Ok(())
    }
}

impl UtxoView for UtxoSet {
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.coins.get(outpoint).cloned()
    }
}

// ---------------------------------------------------------------------------
// StagedUtxos
// ---------------------------------------------------------------------------

/// A copy-on-write overlay over another view.
pub struct StagedUtxos<'a> {
    base: &'a dyn UtxoView,
    added: HashMap<OutPoint, Coin>,
    spent: HashSet<OutPoint>,
}

impl<'a> StagedUtxos<'a> {
    pub fn new(base: &'a dyn UtxoView) -> Self {
        Self {
            base,
            added: HashMap::new(),
            spent: HashSet::new(),
        }
    }

    /// Record `tx` as applied at `height`. Inputs must already be resolvable.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u64) {
        for outpoint in tx.spent_outpoints() {
            if self.added.remove(outpoint).is_none() {
                self.spent.insert(*outpoint);
            }
        }
        let txid = tx.txid();
        let is_coinbase = tx.is_coinbase();
        for (index, output) in tx.outputs.iter().enumerate() {
            self.added.insert(
                OutPoint::new(txid, index as u32),
                Coin {
                    output: output.clone(),
                    height,
                    is_coinbase,
                },
            );
        }
    }
}

impl UtxoView for StagedUtxos<'_> {
    fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        if let Some(coin) = self.added.get(outpoint) {
            return Some(coin.clone());
        }
        if self.spent.contains(outpoint) {
            return None;
        }
        self.base.coin(outpoint)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::BlockHash;
    use crate::transaction::{TxIn, TxVersion};

    fn addr(n: u8) -> Address {
        Address::from_hash([n; 20])
    }

    fn coinbase_block(height: u64) -> Block {
        let cb = Transaction::coinbase(height, 0, vec![TxOut::new(addr(1), Amount::from_coins(6))]);
        Block::new(height, BlockHash::ZERO, 0, vec![cb])
    }

    fn spend(from: OutPoint, to: Address, value: Amount) -> Transaction {
        let mut tx = Transaction::new(TxVersion::V5, 0);
        tx.inputs.push(TxIn::new(from));
        tx.outputs.push(TxOut::new(to, value));
        tx
    }

    #[test]
    fn apply_and_undo_restore_the_set() {
        let mut set = UtxoSet::new();
        let b1 = coinbase_block(1);
        set.apply_block(&b1).unwrap();
        let cb_out = OutPoint::new(b1.transactions[0].txid(), 0);
        assert!(set.coin(&cb_out).unwrap().is_coinbase);

        let tx = spend(cb_out, addr(2), Amount::from_coins(5));
        let mut b2 = coinbase_block(2);
        b2.transactions.push(tx.clone());
        let undo = set.apply_block(&b2).unwrap();
        assert!(set.coin(&cb_out).is_none());
        assert_eq!(set.len(), 2);

        set.undo_block(&b2, undo).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.coin(&cb_out).unwrap().height, 1);
    }

    #[test]
    fn failed_apply_leaves_set_unchanged() {
        let mut set = UtxoSet::new();
        set.apply_block(&coinbase_block(1)).unwrap();
        let before = set.len();

        let missing = OutPoint::new(crate::transaction::TxId::from_bytes([9; 32]), 0);
        let mut bad = coinbase_block(2);
        bad.transactions.push(spend(missing, addr(3), Amount::from_coins(1)));
        assert_eq!(set.apply_block(&bad).unwrap_err(), UtxoError::MissingCoin(missing));
        assert_eq!(set.len(), before);
    }

    #[test]
    fn staged_view_sees_same_block_outputs() {
        let mut set = UtxoSet::new();
        let b1 = coinbase_block(1);
        set.apply_block(&b1).unwrap();
        let cb_out = OutPoint::new(b1.transactions[0].txid(), 0);

        let first = spend(cb_out, addr(2), Amount::from_coins(5));
        let first_out = OutPoint::new(first.txid(), 0);
        let mut staged = StagedUtxos::new(&set);
        staged.apply_transaction(&first, 2);

        assert!(staged.coin(&cb_out).is_none());
        assert_eq!(staged.coin(&first_out).unwrap().output.value, Amount::from_coins(5));
        // The committed set is untouched.
        assert!(set.coin(&cb_out).is_some());
    }

    #[test]
    fn maturity_and_depth() {
        let coin = Coin {
            output: TxOut::new(addr(1), Amount::from_coins(1)),
            height: 1,
            is_coinbase: true,
        };
        assert!(!coin.is_mature(100, 100));
        assert!(coin.is_mature(101, 100));
        assert_eq!(coin.depth(101), 101);
    }

    #[test]
    fn coins_for_filters_by_address() {
        let mut set = UtxoSet::new();
        set.apply_block(&coinbase_block(1)).unwrap();
        set.apply_block(&coinbase_block(2)).unwrap();
        assert_eq!(set.coins_for(&addr(1)).len(), 2);
        assert!(set.coins_for(&addr(2)).is_empty());
        assert_eq!(set.total_value(), Some(Amount::from_coins(12)));
    }
}
