//! JSON inspection views of transactions (`decoderawtransaction` shape).
//!
//! `zsfDeposit` appears only when the deposit is non-zero, as a decimal coin
//! number; `zsfDepositZat` always carries the raw zatoshi count.

use serde::Serialize;

use super::builder::Transaction;
use crate::config::Network;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionView {
    pub txid: String,
    pub version: u32,
    pub versiongroupid: String,
    pub consensusbranchid: String,
    pub locktime: u32,
    pub expiryheight: u32,
    pub size: usize,
    pub vin: Vec<InputView>,
    pub vout: Vec<OutputView>,
    #[serde(rename = "zsfDeposit", skip_serializing_if = "Option::is_none")]
    pub zsf_deposit: Option<f64>,
    #[serde(rename = "zsfDepositZat")]
    pub zsf_deposit_zat: u64,
    #[serde(flatten)]
    pub confirmation: Option<ConfirmationView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InputView {
    Coinbase {
        coinbase: String,
        sequence: u32,
    },
    Spend {
        txid: String,
        vout: u32,
        #[serde(rename = "scriptSig")]
        script_sig: ScriptSigView,
        sequence: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptSigView {
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputView {
    pub value: f64,
    #[serde(rename = "valueZat")]
    pub value_zat: u64,
    pub n: usize,
    pub address: String,
}

/// Extra fields for transactions found in a block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationView {
    pub height: u64,
    pub blockhash: String,
    pub confirmations: u64,
}

impl TransactionView {
    pub fn new(tx: &Transaction, network: Network) -> Self {
        let deposit = tx.zsf_deposit();
        Self {
            txid: tx.txid().to_string(),
            version: tx.version().number(),
            versiongroupid: format!("{:08x}", tx.version().version_group_id()),
            consensusbranchid: format!("{:08x}", tx.consensus_branch_id),
            locktime: tx.lock_time,
            expiryheight: tx.expiry_height,
            size: tx.size_bytes(),
            vin: tx
                .inputs
                .iter()
                .map(|input| {
                    if input.is_coinbase() {
                        InputView::Coinbase {
                            coinbase: hex::encode(&input.script_sig),
                            sequence: input.sequence,
                        }
                    } else {
                        InputView::Spend {
                            txid: input.prevout.txid.to_string(),
                            vout: input.prevout.index,
                            script_sig: ScriptSigView {
                                hex: hex::encode(&input.script_sig),
                            },
                            sequence: input.sequence,
                        }
                    }
                })
                .collect(),
            vout: tx
                .outputs
                .iter()
                .enumerate()
                .map(|(n, output)| OutputView {
                    value: output.value.to_coins_f64(),
                    value_zat: output.value.zat(),
                    n,
                    address: output.address.encode(network),
                })
                .collect(),
            zsf_deposit: (!deposit.is_zero()).then(|| deposit.to_coins_f64()),
            zsf_deposit_zat: deposit.zat(),
            confirmation: None,
        }
    }

    pub fn with_confirmation(mut self, height: u64, blockhash: String, confirmations: u64) -> Self {
        self.confirmation = Some(ConfirmationView {
            height,
            blockhash,
            confirmations,
        });
        self
    }
}
