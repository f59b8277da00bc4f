//! Balance verification: `fee = Σ inputs − Σ outputs − zsf_deposit ≥ 0`.
//!
//! Pure arithmetic over amounts already resolved by the caller. Activation
//! of the deposit field is checked elsewhere, before this runs.

use thiserror::Error;

use crate::amount::Amount;
use crate::transaction::Transaction;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("inputs {inputs} do not cover outputs {outputs} plus zsf deposit {deposit}")]
    NegativeFee {
        inputs: Amount,
        outputs: Amount,
        deposit: Amount,
    },

    #[error("transaction value out of range")]
    ValueOverflow,

    #[error("{resolved} input values supplied for {inputs} inputs")]
    InputCountMismatch { inputs: usize, resolved: usize },
}

/// Check the balance of `tx` given the values of the coins its inputs spend,
/// in input order. Returns the implicit fee.
pub fn verify_balance(tx: &Transaction, input_values: &[Amount]) -> Result<Amount, BalanceError> {
    if input_values.len() != tx.inputs.len() {
        return Err(BalanceError::InputCountMismatch {
            inputs: tx.inputs.len(),
            resolved: input_values.len(),
        });
    }

    let inputs = Amount::sum(input_values.iter().copied()).ok_or(BalanceError::ValueOverflow)?;
    let outputs = tx.total_output().ok_or(BalanceError::ValueOverflow)?;
    let deposit = tx.zsf_deposit();
    let spent = outputs
        .checked_add(deposit)
        .ok_or(BalanceError::ValueOverflow)?;

    inputs.checked_sub(spent).ok_or(BalanceError::NegativeFee {
        inputs,
        outputs,
        deposit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAX_MONEY;
    use crate::transaction::{Address, OutPoint, TxId, TxIn, TxOut, TxVersion};

    fn tx(outputs: &[u64], deposit: u64) -> Transaction {
        let mut tx = Transaction::new(TxVersion::V5, 0);
        tx.inputs.push(TxIn::new(OutPoint::new(TxId::from_bytes([1; 32]), 0)));
        for v in outputs {
            tx.outputs.push(TxOut::new(Address::from_hash([2; 20]), Amount::from_zat(*v)));
        }
        tx.set_zsf_deposit(Amount::from_zat(deposit));
        tx
    }

    #[test]
    fn fee_is_inputs_minus_outputs_minus_deposit() {
        let fee = verify_balance(
            &tx(&[123_000_000], 111_000_000),
            &[Amount::from_zat(625_000_000)],
        )
        .unwrap();
        assert_eq!(fee.zat(), 625_000_000 - 123_000_000 - 111_000_000);
    }

    #[test]
    fn zero_fee_is_allowed() {
        let fee = verify_balance(&tx(&[60], 40), &[Amount::from_zat(100)]).unwrap();
        assert_eq!(fee, Amount::ZERO);
    }

    #[test]
    fn deposit_can_cause_negative_fee() {
        let err = verify_balance(&tx(&[60], 41), &[Amount::from_zat(100)]).unwrap_err();
        assert!(matches!(err, BalanceError::NegativeFee { .. }));
    }

    #[test]
    fn overflowing_sums_are_rejected() {
        let err = verify_balance(&tx(&[MAX_MONEY, 1], 0), &[Amount::from_zat(MAX_MONEY)]).unwrap_err();
        assert_eq!(err, BalanceError::ValueOverflow);
        let err = verify_balance(&tx(&[MAX_MONEY], 1), &[Amount::from_zat(MAX_MONEY)]).unwrap_err();
        assert_eq!(err, BalanceError::ValueOverflow);
    }

    #[test]
    fn input_count_must_match() {
        let err = verify_balance(&tx(&[1], 0), &[]).unwrap_err();
        assert_eq!(err, BalanceError::InputCountMismatch { inputs: 1, resolved: 0 });
    }
}
