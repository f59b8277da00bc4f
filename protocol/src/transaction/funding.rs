//! Coin selection for unfunded transactions.
//!
//! [`fund_transaction`] adds inputs until `Σ inputs ≥ Σ outputs + deposit +
//! fee`, picking the largest available coins first, and appends a change
//! output for any excess. The outputs and the ZSF deposit already on the
//! transaction are never altered.

use thiserror::Error;

use super::builder::Transaction;
use super::types::{Address, OutPoint, TxIn, TxOut};
use crate::amount::Amount;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("input {0} is not a spendable coin")]
    UnknownInput(OutPoint),

    #[error("transaction value out of range")]
    ValueOverflow,
}

/// A funded transaction plus what the caller needs to sign and report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundedTransaction {
    pub tx: Transaction,
    pub fee: Amount,
    /// Index of the appended change output, if any.
    pub change_position: Option<usize>,
    /// Outputs spent by `tx.inputs`, in input order.
    pub spent: Vec<TxOut>,
}

/// Fund `tx` from `available` coins.
///
/// Inputs already present must appear in `available`; they count toward the
/// target and are kept. Further coins are selected largest-first.
pub fn fund_transaction(
    mut tx: Transaction,
    available: &[(OutPoint, TxOut)],
    change_address: Address,
    fee: Amount,
) -> Result<FundedTransaction, FundingError> {
    let needed = tx
        .total_output()
        .and_then(|v| v.checked_add(tx.zsf_deposit()))
        .and_then(|v| v.checked_add(fee))
        .ok_or(FundingError::ValueOverflow)?;

    let mut spent = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let (_, output) = available
            .iter()
            .find(|(outpoint, _)| *outpoint == input.prevout)
            .ok_or(FundingError::UnknownInput(input.prevout))?;
        spent.push(output.clone());
    }
    let mut total = Amount::sum(spent.iter().map(|o| o.value)).ok_or(FundingError::ValueOverflow)?;

    let mut candidates: Vec<&(OutPoint, TxOut)> = available
        .iter()
        .filter(|(outpoint, _)| !tx.inputs.iter().any(|i| i.prevout == *outpoint))
        .collect();
    candidates.sort_by(|a, b| b.1.value.cmp(&a.1.value).then(a.0.cmp(&b.0)));

    for (outpoint, output) in candidates {
        if total >= needed {
            break;
        }
        tx.inputs.push(TxIn::new(*outpoint));
        spent.push(output.clone());
        total = total
            .checked_add(output.value)
            .ok_or(FundingError::ValueOverflow)?;
    }

    let change = total
        .checked_sub(needed)
        .ok_or(FundingError::InsufficientFunds {
            needed,
            available: total,
        })?;

    let change_position = if change.is_zero() {
        None
    } else {
        tx.outputs.push(TxOut::new(change_address, change));
        Some(tx.outputs.len() - 1)
    };

    tracing::debug!(
        inputs = tx.inputs.len(),
        %fee,
        %change,
        deposit = %tx.zsf_deposit(),
        "transaction funded"
    );

    Ok(FundedTransaction {
        tx,
        fee,
        change_position,
        spent,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::builder::TxVersion;
    use crate::transaction::types::TxId;

    fn coin(n: u8, coins: u64) -> (OutPoint, TxOut) {
        (
            OutPoint::new(TxId::from_bytes([n; 32]), 0),
            TxOut::new(Address::from_hash([0xAA; 20]), Amount::from_coins(coins)),
        )
    }

    fn unfunded(pay_zat: u64, deposit_zat: u64) -> Transaction {
        let mut tx = Transaction::new(TxVersion::V5, 0);
        tx.outputs
            .push(TxOut::new(Address::from_hash([1u8; 20]), Amount::from_zat(pay_zat)));
        tx.set_zsf_deposit(Amount::from_zat(deposit_zat));
        tx
    }

    const CHANGE: Address = Address::from_hash([0xCC; 20]);

    #[test]
    fn selects_largest_first_and_adds_change() {
        let coins = vec![coin(1, 1), coin(2, 5), coin(3, 2)];
        let funded = fund_transaction(
            unfunded(123_000_000, 111_000_000),
            &coins,
            CHANGE,
            Amount::from_zat(10_000),
        )
        .unwrap();

        assert_eq!(funded.tx.inputs.len(), 1);
        assert_eq!(funded.tx.inputs[0].prevout, coins[1].0);
        assert_eq!(funded.change_position, Some(1));
        assert_eq!(
            funded.tx.outputs[1].value.zat(),
            500_000_000 - 123_000_000 - 111_000_000 - 10_000
        );
        assert_eq!(funded.tx.zsf_deposit().zat(), 111_000_000);
        assert_eq!(funded.spent, vec![coins[1].1.clone()]);
    }

    #[test]
    fn exact_amount_needs_no_change() {
        let coins = vec![coin(1, 1)];
        let funded = fund_transaction(
            unfunded(100_000_000 - 10_000, 0),
            &coins,
            CHANGE,
            Amount::from_zat(10_000),
        )
        .unwrap();
        assert_eq!(funded.change_position, None);
        assert_eq!(funded.tx.outputs.len(), 1);
    }

    #[test]
    fn deposit_counts_toward_target() {
        let coins = vec![coin(1, 1)];
        let err = fund_transaction(
            unfunded(50_000_000, 60_000_000),
            &coins,
            CHANGE,
            Amount::ZERO,
        )
        .unwrap_err();
        assert_eq!(
            err,
            FundingError::InsufficientFunds {
                needed: Amount::from_zat(110_000_000),
                available: Amount::from_coins(1),
            }
        );
    }

    #[test]
    fn keeps_preselected_inputs() {
        let coins = vec![coin(1, 1), coin(2, 5)];
        let mut tx = unfunded(150_000_000, 0);
        tx.inputs.push(TxIn::new(coins[0].0));
        let funded = fund_transaction(tx, &coins, CHANGE, Amount::ZERO).unwrap();
        assert_eq!(funded.tx.inputs.len(), 2);
        assert_eq!(funded.tx.inputs[0].prevout, coins[0].0);
        assert_eq!(funded.spent.len(), 2);
    }

    #[test]
    fn unknown_preselected_input() {
        let mut tx = unfunded(1, 0);
        let missing = OutPoint::new(TxId::from_bytes([9u8; 32]), 3);
        tx.inputs.push(TxIn::new(missing));
        assert_eq!(
            fund_transaction(tx, &[], CHANGE, Amount::ZERO).unwrap_err(),
            FundingError::UnknownInput(missing)
        );
    }
}
