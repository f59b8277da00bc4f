//! # Chain Supply Ledger
//!
//! Running total of value in circulation, net of ZSF deposits:
//!
//! ```text
//! connect(H):    chain_value += subsidy(H) − Σ deposits(H)
//! disconnect(H): chain_value −= subsidy(H) − Σ deposits(H)
//! ```
//!
//! Connect and disconnect must alternate like a stack: only the block at
//! the current ledger height can be disconnected, and only the block at
//! height + 1 can be connected. Any error here means the caller broke that
//! contract or the chain is corrupt.

use serde::Serialize;
use thiserror::Error;

use super::block::Block;
use crate::amount::Amount;
use crate::config::MAX_MONEY;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("chain value would exceed the money range at height {height}")]
    Overflow { height: u64 },

    #[error("chain value would go negative at height {height}")]
    Underflow { height: u64 },

    #[error("ledger is at height {ledger_height}; cannot {action} block {block_height}")]
    OutOfOrder {
        action: &'static str,
        ledger_height: u64,
        block_height: u64,
    },
}

/// Snapshot of the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChainSupplyState {
    /// Height of the last connected block (0 at genesis).
    pub height: u64,
    /// Value in circulation after that block.
    pub chain_value: Amount,
    /// Cumulative ZSF deposits up to that block.
    pub total_deposits: Amount,
}

#[derive(Debug, Clone, Default)]
pub struct ChainSupplyLedger {
    state: ChainSupplyState,
}

impl ChainSupplyLedger {
    /// A ledger at genesis: height 0, nothing in circulation.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ChainSupplyState {
        self.state
    }

    pub fn chain_value(&self) -> Amount {
        self.state.chain_value
    }

    /// Apply `block`, which created `subsidy`. Returns the new chain value.
    pub fn connect(&mut self, block: &Block, subsidy: Amount) -> Result<Amount, LedgerError> {
        let height = block.height();
        if height != self.state.height + 1 {
            return Err(LedgerError::OutOfOrder {
                action: "connect",
                ledger_height: self.state.height,
                block_height: height,
            });
        }
        let deposits = block.total_deposits().ok_or(LedgerError::Overflow { height })?;
        let chain_value = shift(self.state.chain_value, subsidy, deposits, height)?;
        let total_deposits = self
            .state
            .total_deposits
            .checked_add(deposits)
            .ok_or(LedgerError::Overflow { height })?;

        self.state = ChainSupplyState {
            height,
            chain_value,
            total_deposits,
        };
        Ok(chain_value)
    }

    /// Exact inverse of [`ChainSupplyLedger::connect`] for the tip block.
    pub fn disconnect(&mut self, block: &Block, subsidy: Amount) -> Result<Amount, LedgerError> {
        let height = block.height();
        if height == 0 || height != self.state.height {
            return Err(LedgerError::OutOfOrder {
                action: "disconnect",
                ledger_height: self.state.height,
                block_height: height,
            });
        }
        let deposits = block.total_deposits().ok_or(LedgerError::Overflow { height })?;
        let chain_value = shift(self.state.chain_value, deposits, subsidy, height)?;
        let total_deposits = self
            .state
            .total_deposits
            .checked_sub(deposits)
            .ok_or(LedgerError::Underflow { height })?;

        self.state = ChainSupplyState {
            height: height - 1,
            chain_value,
            total_deposits,
        };
        Ok(chain_value)
    }
}

/// `value + add − sub`, checked against `0..=MAX_MONEY` on the net result.
fn shift(value: Amount, add: Amount, sub: Amount, height: u64) -> Result<Amount, LedgerError> {
    let net = i128::from(value.zat()) + i128::from(add.zat()) - i128::from(sub.zat());
    if net < 0 {
        return Err(LedgerError::Underflow { height });
    }
    if net > i128::from(MAX_MONEY) {
        return Err(LedgerError::Overflow { height });
    }
    Ok(Amount::from_zat(net as u64))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::block::BlockHash;
    use crate::transaction::{Transaction, TxVersion};

    const SUBSIDY: Amount = Amount::from_zat(625_000_000);

    fn block(height: u64, deposits: &[u64]) -> Block {
        let mut txs = vec![Transaction::coinbase(height, 0, vec![])];
        for d in deposits {
            let mut tx = Transaction::new(TxVersion::ZFuture, 0);
            tx.set_zsf_deposit(Amount::from_zat(*d));
            txs.push(tx);
        }
        Block::new(height, BlockHash::ZERO, 0, txs)
    }

    #[test]
    fn connect_accumulates_subsidy_minus_deposits() {
        let mut ledger = ChainSupplyLedger::new();
        for h in 1..=102 {
            ledger.connect(&block(h, &[]), SUBSIDY).unwrap();
        }
        let value = ledger.connect(&block(103, &[111_000_000]), SUBSIDY).unwrap();
        assert_eq!(value.zat(), 625_000_000 * 103 - 111_000_000);
        assert_eq!(ledger.state().total_deposits.zat(), 111_000_000);
        assert_eq!(ledger.state().height, 103);
    }

    #[test]
    fn disconnect_is_exact_inverse() {
        let mut ledger = ChainSupplyLedger::new();
        ledger.connect(&block(1, &[]), SUBSIDY).unwrap();
        let before = ledger.state();
        let b2 = block(2, &[1, 2, 3]);
        ledger.connect(&b2, SUBSIDY).unwrap();
        ledger.disconnect(&b2, SUBSIDY).unwrap();
        assert_eq!(ledger.state(), before);
    }

    #[test]
    fn rejects_out_of_order_blocks() {
        let mut ledger = ChainSupplyLedger::new();
        assert!(matches!(
            ledger.connect(&block(2, &[]), SUBSIDY),
            Err(LedgerError::OutOfOrder { action: "connect", .. })
        ));
        assert!(matches!(
            ledger.disconnect(&block(0, &[]), SUBSIDY),
            Err(LedgerError::OutOfOrder { action: "disconnect", .. })
        ));
        ledger.connect(&block(1, &[]), SUBSIDY).unwrap();
        assert!(ledger.disconnect(&block(2, &[]), SUBSIDY).is_err());
    }

    #[test]
    fn deposits_beyond_supply_underflow() {
        let mut ledger = ChainSupplyLedger::new();
        let err = ledger
            .connect(&block(1, &[SUBSIDY.zat() + 1]), SUBSIDY)
            .unwrap_err();
        assert_eq!(err, LedgerError::Underflow { height: 1 });
        assert_eq!(ledger.state(), ChainSupplyState::default());
    }

    #[test]
    fn same_block_deposit_can_spend_same_block_subsidy() {
        let mut ledger = ChainSupplyLedger::new();
        let value = ledger.connect(&block(1, &[SUBSIDY.zat()]), SUBSIDY).unwrap();
        assert_eq!(value, Amount::ZERO);
    }
}
