//! # Node
//!
//! Ties the consensus pipeline to the wallet and answers JSON-RPC methods.
//! Every method runs synchronously against the in-memory chain; the HTTP
//! layer in [`crate::api`] only handles the envelope.
//!
//! ## Methods
//!
//! | Method                 | Params                                                            |
//! |------------------------|-------------------------------------------------------------------|
//! | `getblockchaininfo`    |                                                                   |
//! | `getblockcount`        |                                                                   |
//! | `getblock`             | hash or height, verbosity                                         |
//! | `getbalance`           |                                                                   |
//! | `getnewaddress`        |                                                                   |
//! | `sendtoaddress`        | address, amount, comment, comment_to, subtractfee, zsf_deposit    |
//! | `createrawtransaction` | inputs, outputs, locktime, expiryheight, zsf_deposit              |
//! | `fundrawtransaction`   | hex                                                               |
//! | `signrawtransaction`   | hex                                                               |
//! | `sendrawtransaction`   | hex                                                               |
//! | `decoderawtransaction` | hex                                                               |
//! | `getrawtransaction`    | txid, verbose                                                     |
//! | `getmempoolinfo`       |                                                                   |
//! | `getrawmempool`        |                                                                   |
//! | `submitblock`          | hex                                                               |
//! | `generate`             | count (regtest only, at most `MAX_GENERATE_BLOCKS`)               |

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use zsf_protocol::activation::{ActivationError, NetworkUpgrade};
use zsf_protocol::amount::{Amount, AmountError};
use zsf_protocol::config::{ChainParams, Network, DEFAULT_FEE_ZAT, MAX_BLOCK_TRANSACTIONS};
use zsf_protocol::consensus::rules::validate_transaction;
use zsf_protocol::consensus::{BlockError, TransactionError, ValidationPipeline};
use zsf_protocol::crypto::keys::Keypair;
use zsf_protocol::mempool::{MempoolConfig, MempoolError};
use zsf_protocol::storage::{Block, BlockHash, ChainState, StagedUtxos, UtxoView};
use zsf_protocol::transaction::{
    codec, fund_transaction, Address, AddressError, DecodeError, FundingError, OutPoint,
    SigningError, Transaction, TransactionBuilder, TransactionView, TxId, TxOut,
};

use crate::metrics::SharedMetrics;
use crate::wallet::Wallet;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A JSON-RPC error with a bitcoind-compatible code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const TYPE_ERROR: i32 = -3;
    pub const INVALID_ADDRESS_OR_KEY: i32 = -5;
    pub const WALLET_INSUFFICIENT_FUNDS: i32 = -6;
    pub const INVALID_PARAMETER: i32 = -8;
    pub const DESERIALIZATION_ERROR: i32 = -22;
    pub const VERIFY_ERROR: i32 = -25;
    pub const VERIFY_REJECTED: i32 = -26;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(Self::INVALID_PARAMETER, message)
    }
}

impl From<MempoolError> for RpcError {
    fn from(e: MempoolError) -> Self {
        match &e {
            MempoolError::Decode(inner) => {
                RpcError::new(Self::DESERIALIZATION_ERROR, format!("TX decode failed: {inner}"))
            }
            MempoolError::Rejected(inner) if inner.is_transient() => {
                RpcError::new(Self::VERIFY_ERROR, inner.to_string())
            }
            _ => RpcError::new(Self::VERIFY_REJECTED, e.to_string()),
        }
    }
}

impl From<TransactionError> for RpcError {
    fn from(e: TransactionError) -> Self {
        MempoolError::Rejected(e).into()
    }
}

impl From<BlockError> for RpcError {
    fn from(e: BlockError) -> Self {
        match e {
            BlockError::Decode(inner) => {
                RpcError::new(Self::DESERIALIZATION_ERROR, format!("Block decode failed: {inner}"))
            }
            other => RpcError::new(Self::VERIFY_ERROR, other.to_string()),
        }
    }
}

impl From<DecodeError> for RpcError {
    fn from(e: DecodeError) -> Self {
        RpcError::new(Self::DESERIALIZATION_ERROR, format!("TX decode failed: {e}"))
    }
}

impl From<FundingError> for RpcError {
    fn from(e: FundingError) -> Self {
        match &e {
            FundingError::InsufficientFunds { .. } => {
                RpcError::new(Self::WALLET_INSUFFICIENT_FUNDS, format!("Insufficient funds: {e}"))
            }
            _ => RpcError::invalid_parameter(e.to_string()),
        }
    }
}

impl From<AddressError> for RpcError {
    fn from(e: AddressError) -> Self {
        RpcError::new(Self::INVALID_ADDRESS_OR_KEY, format!("Invalid address: {e}"))
    }
}

impl From<AmountError> for RpcError {
    fn from(e: AmountError) -> Self {
        RpcError::new(Self::TYPE_ERROR, format!("Invalid amount: {e}"))
    }
}

impl From<SigningError> for RpcError {
    fn from(e: SigningError) -> Self {
        RpcError::invalid_parameter(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Positional parameters
// ---------------------------------------------------------------------------

struct Params<'a>(&'a [Value]);

impl<'a> Params<'a> {
    /// `null` counts as absent.
    fn opt(&self, index: usize) -> Option<&'a Value> {
        self.0.get(index).filter(|v| !v.is_null())
    }

    fn required(&self, index: usize, name: &str) -> Result<&'a Value, RpcError> {
        self.opt(index)
            .ok_or_else(|| RpcError::invalid_parameter(format!("missing parameter: {name}")))
    }

    fn str(&self, index: usize, name: &str) -> Result<&'a str, RpcError> {
        self.required(index, name)?
            .as_str()
            .ok_or_else(|| RpcError::new(RpcError::TYPE_ERROR, format!("{name} must be a string")))
    }

    fn amount(&self, index: usize, name: &str) -> Result<Amount, RpcError> {
        Ok(Amount::from_json(self.required(index, name)?)?)
    }

    fn opt_amount(&self, index: usize) -> Result<Option<Amount>, RpcError> {
        self.opt(index).map(Amount::from_json).transpose().map_err(Into::into)
    }

    fn opt_u32(&self, index: usize, name: &str) -> Result<Option<u32>, RpcError> {
        self.opt(index)
            .map(|v| {
                v.as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| RpcError::invalid_parameter(format!("{name} out of range")))
            })
            .transpose()
    }

    /// Booleans, or numbers where non-zero means true.
    fn flag(&self, index: usize) -> Result<bool, RpcError> {
        match self.opt(index) {
            None => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) => Ok(n.as_f64().map_or(false, |f| f != 0.0)),
            Some(other) => Err(RpcError::new(
                RpcError::TYPE_ERROR,
                format!("expected a boolean, got {other}"),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// Summary served at `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct NodeStatus {
    pub network: String,
    pub blocks: u64,
    pub best_block_hash: String,
    pub chain_value_zat: u64,
    pub zsf_deposits_zat: u64,
    pub mempool_size: usize,
    pub halted: bool,
}

/// Upper bound on `generate` per call.
pub const MAX_GENERATE_BLOCKS: u64 = 1_000;

pub struct Node {
    pipeline: ValidationPipeline,
    wallet: Wallet,
    /// Held from coin selection until the mempool has the transaction, so
    /// two sends never select the same coin.
    send_lock: Mutex<()>,
    metrics: SharedMetrics,
    network: Network,
}

impl Node {
    pub fn new(
        params: ChainParams,
        mempool: MempoolConfig,
        wallet_key: Keypair,
        metrics: SharedMetrics,
    ) -> Result<Self, ActivationError> {
        let network = params.network;
        let node = Self {
            pipeline: ValidationPipeline::new(params, mempool)?,
            wallet: Wallet::new(wallet_key, network),
            send_lock: Mutex::new(()),
            metrics,
            network,
        };
        node.observe();
        Ok(node)
    }

    pub fn status(&self) -> NodeStatus {
        let (blocks, best_block_hash) = self
            .pipeline
            .with_chain(|chain| (chain.tip_height(), chain.tip_hash().to_string()));
        let supply = self.pipeline.supply();
        NodeStatus {
            network: self.network.to_string(),
            blocks,
            best_block_hash,
            chain_value_zat: supply.chain_value.zat(),
            zsf_deposits_zat: supply.total_deposits.zat(),
            mempool_size: self.pipeline.mempool().size(),
            halted: self.pipeline.is_halted(),
        }
    }

    /// Dispatch one JSON-RPC call with positional `params`.
    pub fn call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let p = Params(params);
        let result = match method {
            "getblockchaininfo" => Ok(self.get_blockchain_info()),
            "getblockcount" => Ok(json!(self.pipeline.tip_height())),
            "getblock" => self.get_block(&p),
            "getbalance" => Ok(json!(self.balance().to_coins_f64())),
            "getnewaddress" => Ok(json!(self.wallet.new_address().encode(self.network))),
            "sendtoaddress" => self.send_to_address(&p),
            "createrawtransaction" => self.create_raw_transaction(&p),
            "fundrawtransaction" => self.fund_raw_transaction(&p),
            "signrawtransaction" => self.sign_raw_transaction(&p),
            "sendrawtransaction" => self.send_raw_transaction(&p),
            "decoderawtransaction" => {
                let tx = codec::decode_hex(p.str(0, "hexstring")?)?;
                Ok(json!(TransactionView::new(&tx, self.network)))
            }
            "getrawtransaction" => self.get_raw_transaction(&p),
            "getmempoolinfo" => Ok(self.get_mempool_info()),
            "getrawmempool" => Ok(json!(self
                .pipeline
                .mempool()
                .txids()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>())),
            "submitblock" => self.submit_block(&p),
            "generate" => self.generate(&p),
            _ => Err(RpcError::new(
                RpcError::METHOD_NOT_FOUND,
                format!("Method not found: {method}"),
            )),
        };
        self.observe();
        result
    }

    fn observe(&self) {
        self.metrics
            .observe(self.pipeline.supply(), self.pipeline.mempool().size());
    }

    // -- chain queries ------------------------------------------------------

    fn get_blockchain_info(&self) -> Value {
        self.pipeline.with_chain(|chain| {
            let tip = chain.tip_height();
            let registry = chain.registry();
            let supply = chain.supply();
            let upgrades: serde_json::Map<String, Value> = registry
                .upgrades()
                .map(|(upgrade, height)| {
                    (
                        format!("{:08x}", upgrade.branch_id()),
                        json!({
                            "name": upgrade.name(),
                            "activationheight": height,
                            "status": registry.status(upgrade, tip),
                        }),
                    )
                })
                .collect();
            json!({
                "chain": self.network.chain_name(),
                "blocks": tip,
                "bestblockhash": chain.tip_hash().to_string(),
                "chainSupply": {
                    "monitored": true,
                    "chainValue": supply.chain_value.to_coins_f64(),
                    "chainValueZat": supply.chain_value.zat(),
                    "zsfDeposits": supply.total_deposits.to_coins_f64(),
                    "zsfDepositsZat": supply.total_deposits.zat(),
                },
                "upgrades": upgrades,
                "consensus": {
                    "chaintip": format!("{:08x}", registry.branch_id_at(tip)),
                    "nextblock": format!("{:08x}", registry.branch_id_at(tip + 1)),
                },
            })
        })
    }

    fn get_block(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let selector = p.required(0, "hash or height")?;
        let verbose = match p.opt(1) {
            None => true,
            Some(v) => v.as_u64().map_or_else(|| v.as_bool().unwrap_or(true), |n| n != 0),
        };
        self.pipeline.with_chain(|chain| -> Result<Value, RpcError> {
            let block = lookup_block(chain, selector)?;
            if !verbose {
                return Ok(json!(hex::encode(block.encode())));
            }
            let height = block.height();
            let deposits = block.total_deposits().unwrap_or(Amount::ZERO);
            let mut view = json!({
                "hash": block.hash().to_string(),
                "confirmations": chain.confirmations(height),
                "size": block.encode().len(),
                "height": height,
                "merkleroot": hex::encode(block.header.merkle_root),
                "time": block.header.time,
                "previousblockhash": block.header.prev_hash.to_string(),
                "tx": block.transactions.iter().map(|tx| tx.txid().to_string()).collect::<Vec<_>>(),
                "zsfDeposits": deposits.to_coins_f64(),
                "zsfDepositsZat": deposits.zat(),
            });
            if let Some(next) = chain.block_at(height + 1) {
                view["nextblockhash"] = json!(next.hash().to_string());
            }
            Ok(view)
        })
    }

    fn get_raw_transaction(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let txid = parse_txid(p.str(0, "txid")?)?;
        let verbose = p.flag(1)?;
        let found = self.pipeline.with_chain(|chain| {
            chain.find_transaction(&txid).map(|loc| {
                (
                    loc.tx.clone(),
                    Some((loc.height, loc.block_hash, chain.confirmations(loc.height))),
                )
            })
        });
        let (tx, confirmation) = match found {
            Some(found) => found,
            None => (
                self.pipeline.mempool().get(&txid).ok_or_else(|| {
                    RpcError::new(
                        RpcError::INVALID_ADDRESS_OR_KEY,
                        "No such mempool or blockchain transaction",
                    )
                })?,
                None,
            ),
        };
        if !verbose {
            return Ok(json!(hex::encode(codec::encode(&tx))));
        }
        let mut view = TransactionView::new(&tx, self.network);
        if let Some((height, hash, confirmations)) = confirmation {
            view = view.with_confirmation(height, hash.to_string(), confirmations);
        }
        let mut value = json!(view);
        value["hex"] = json!(hex::encode(codec::encode(&tx)));
        Ok(value)
    }

    fn get_mempool_info(&self) -> Value {
        let stats = self.pipeline.mempool().stats();
        json!({
            "size": stats.size,
            "bytes": stats.bytes,
            "totalFee": stats.total_fee.to_coins_f64(),
            "zsfDeposits": stats.total_deposits.to_coins_f64(),
            "zsfDepositsZat": stats.total_deposits.zat(),
        })
    }

    // -- wallet -------------------------------------------------------------

    /// Wallet coins not already spent by a mempool transaction.
    fn spendable(&self, chain: &ChainState) -> Vec<(OutPoint, TxOut)> {
        let mempool = self.pipeline.mempool();
        self.wallet
            .spendable_coins(chain)
            .into_iter()
            .filter(|(outpoint, _)| mempool.spender_of(outpoint).is_none())
            .collect()
    }

    fn balance(&self) -> Amount {
        self.pipeline.with_chain(|chain| {
            Amount::sum(self.spendable(chain).iter().map(|(_, out)| out.value)).unwrap_or(Amount::ZERO)
        })
    }

    fn parse_address(&self, s: &str) -> Result<Address, RpcError> {
        Ok(Address::decode(s, self.network)?)
    }

    fn send_to_address(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let to = self.parse_address(p.str(0, "address")?)?;
        let amount = p.amount(1, "amount")?;
        if amount.is_zero() {
            return Err(RpcError::new(RpcError::TYPE_ERROR, "Invalid amount for send"));
        }
        let subtract_fee = p.flag(4)?;
        let deposit = p.opt_amount(5)?.unwrap_or(Amount::ZERO);
        let fee = Amount::from_zat(DEFAULT_FEE_ZAT);

        let _send = self.send_lock.lock();
        let tx = self.pipeline.with_chain(|chain| -> Result<Transaction, RpcError> {
            let height = chain.tip_height() + 1;
            check_deposit_gate(chain, deposit, height)?;
            let value = if subtract_fee {
                amount
                    .checked_sub(fee)
                    .filter(|v| !v.is_zero())
                    .ok_or_else(|| RpcError::invalid_parameter("amount too small to pay the fee"))?
            } else {
                amount
            };
            let unsigned = TransactionBuilder::new(chain.registry(), height)
                .output(to, value)
                .zsf_deposit(deposit)
                .build();
            let funded =
                fund_transaction(unsigned, &self.spendable(chain), self.wallet.mining_address(), fee)?;
            let mut tx = funded.tx;
            self.wallet.sign(&mut tx, &funded.spent)?;
            Ok(tx)
        })?;

        let txid = self.submit_transaction(tx)?;
        tracing::debug!(%txid, %amount, zsf_deposit = %deposit, "wallet send");
        Ok(json!(txid.to_string()))
    }

    fn create_raw_transaction(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let inputs = match p.opt(0) {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(parse_input)
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => return Err(RpcError::invalid_parameter("inputs must be an array")),
        };
        let outputs = match p.required(1, "outputs")? {
            Value::Object(map) => map
                .iter()
                .map(|(address, value)| {
                    Ok((self.parse_address(address)?, Amount::from_json(value)?))
                })
                .collect::<Result<Vec<_>, RpcError>>()?,
            _ => return Err(RpcError::invalid_parameter("outputs must be an object")),
        };
        let lock_time = p.opt_u32(2, "locktime")?;
        let expiry_height = p.opt_u32(3, "expiryheight")?;
        let deposit = p.opt_amount(4)?.unwrap_or(Amount::ZERO);

        let tx = self.pipeline.with_chain(|chain| -> Result<Transaction, RpcError> {
            let height = chain.tip_height() + 1;
            check_deposit_gate(chain, deposit, height)?;
            let mut builder = TransactionBuilder::new(chain.registry(), height)
                .inputs(inputs)
                .zsf_deposit(deposit);
            for (address, value) in outputs {
                builder = builder.output(address, value);
            }
            if let Some(lock_time) = lock_time {
                builder = builder.lock_time(lock_time);
            }
            if let Some(expiry_height) = expiry_height {
                builder = builder.expiry_height(expiry_height);
            }
            Ok(builder.build())
        })?;
        Ok(json!(hex::encode(codec::encode(&tx))))
    }

    fn fund_raw_transaction(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let tx = codec::decode_hex(p.str(0, "hexstring")?)?;
        let funded = self.pipeline.with_chain(|chain| {
            let mut available = self.spendable(chain);
            for input in &tx.inputs {
                if available.iter().any(|(outpoint, _)| *outpoint == input.prevout) {
                    continue;
                }
                let coin = chain.utxos().coin(&input.prevout).ok_or_else(|| {
                    RpcError::invalid_parameter(format!(
                        "Input not found or already spent: {}",
                        input.prevout
                    ))
                })?;
                available.push((input.prevout, coin.output));
            }
            Ok::<_, RpcError>(fund_transaction(
                tx,
                &available,
                self.wallet.mining_address(),
                Amount::from_zat(DEFAULT_FEE_ZAT),
            )?)
        })?;
        Ok(json!({
            "hex": hex::encode(codec::encode(&funded.tx)),
            "fee": funded.fee.to_coins_f64(),
            "changepos": funded.change_position.map_or(-1, |pos| pos as i64),
        }))
    }

    fn sign_raw_transaction(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let mut tx = codec::decode_hex(p.str(0, "hexstring")?)?;
        let spent = self.pipeline.with_chain(|chain| {
            tx.inputs
                .iter()
                .map(|input| {
                    chain
                        .utxos()
                        .coin(&input.prevout)
                        .map(|coin| coin.output)
                        .ok_or_else(|| {
                            RpcError::new(
                                RpcError::VERIFY_ERROR,
                                format!("Input not found or already spent: {}", input.prevout),
                            )
                        })
                })
                .collect::<Result<Vec<_>, _>>()
        })?;
        let report = self.wallet.sign(&mut tx, &spent)?;
        Ok(json!({
            "hex": hex::encode(codec::encode(&tx)),
            "complete": report.complete,
        }))
    }

    fn send_raw_transaction(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let tx = codec::decode_hex(p.str(0, "hexstring")?)?;
        let txid = self.submit_transaction(tx)?;
        Ok(json!(txid.to_string()))
    }

    fn submit_transaction(&self, tx: Transaction) -> Result<TxId, RpcError> {
        match self.pipeline.accept_transaction(tx) {
            Ok(txid) => {
                self.metrics.transactions_accepted_total.inc();
                Ok(txid)
            }
            Err(e) => {
                self.metrics.transactions_rejected_total.inc();
                Err(e.into())
            }
        }
    }

    // -- blocks -------------------------------------------------------------

    fn submit_block(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        let block = Block::decode_hex(p.str(0, "hexdata")?).map_err(BlockError::from)?;
        self.connect(block)?;
        Ok(Value::Null)
    }

    fn connect(&self, block: Block) -> Result<BlockHash, RpcError> {
        let hash = self.pipeline.connect_block(block)?;
        self.metrics.blocks_connected_total.inc();
        Ok(hash)
    }

    fn generate(&self, p: &Params<'_>) -> Result<Value, RpcError> {
        if self.network != Network::Regtest {
            return Err(RpcError::new(
                RpcError::METHOD_NOT_FOUND,
                "This method can only be used on regtest",
            ));
        }
        let count = p
            .required(0, "nblocks")?
            .as_u64()
            .ok_or_else(|| RpcError::invalid_parameter("nblocks must be a non-negative integer"))?;
        if count > MAX_GENERATE_BLOCKS {
            return Err(RpcError::invalid_parameter(format!(
                "nblocks must be at most {MAX_GENERATE_BLOCKS}"
            )));
        }

        let mut hashes = Vec::new();
        for _ in 0..count {
            let block = self.pipeline.with_chain(|chain| self.block_template(chain))?;
            hashes.push(self.connect(block)?.to_string());
        }
        Ok(json!(hashes))
    }

    /// Next block paying subsidy plus fees to the wallet's mining address.
    /// Mempool transactions that no longer validate on top of the ones
    /// already picked are skipped.
    fn block_template(&self, chain: &ChainState) -> Result<Block, RpcError> {
        let height = chain.tip_height() + 1;
        let registry = chain.registry();
        let maturity = chain.params().coinbase_maturity;
        let mut staged = StagedUtxos::new(chain.utxos());
        let mut fees = Amount::ZERO;
        let mut transactions = Vec::new();

        for entry in self
            .pipeline
            .mempool()
            .select_transactions(MAX_BLOCK_TRANSACTIONS - 1)
        {
            match validate_transaction(&entry.tx, registry, height, maturity, &staged) {
                Ok(fee) => {
                    let Some(total) = fees.checked_add(fee) else {
                        continue;
                    };
                    fees = total;
                    staged.apply_transaction(&entry.tx, height);
                    transactions.push(entry.tx);
                }
                Err(e) => {
                    tracing::debug!(txid = %entry.txid, error = %e, "skipping mempool transaction");
                }
            }
        }

        let reward = chain
            .subsidy(height)
            .checked_add(fees)
            .ok_or_else(|| RpcError::new(RpcError::VERIFY_ERROR, "block reward out of range"))?;
        let coinbase = Transaction::coinbase(
            height,
            registry.branch_id_at(height),
            vec![TxOut::new(self.wallet.mining_address(), reward)],
        );
        transactions.insert(0, coinbase);

        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        let time = now.max(chain.tip().header.time + 1);
        Ok(Block::new(height, chain.tip_hash(), time, transactions))
    }
}

fn check_deposit_gate(chain: &ChainState, deposit: Amount, height: u64) -> Result<(), RpcError> {
    if !deposit.is_zero() && !chain.registry().is_active(NetworkUpgrade::ZFuture, height) {
        return Err(TransactionError::FeatureNotActive { height }.into());
    }
    Ok(())
}

fn parse_txid(s: &str) -> Result<TxId, RpcError> {
    s.parse()
        .map_err(|_| RpcError::invalid_parameter(format!("txid must be 64 hex characters: {s}")))
}

fn parse_input(value: &Value) -> Result<OutPoint, RpcError> {
    let txid = value
        .get("txid")
        .and_then(Value::as_str)
        .ok_or_else(|| RpcError::invalid_parameter("input is missing txid"))?;
    let vout = value
        .get("vout")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| RpcError::invalid_parameter("input is missing a valid vout"))?;
    Ok(OutPoint::new(parse_txid(txid)?, vout))
}

fn lookup_block<'c>(chain: &'c ChainState, selector: &Value) -> Result<&'c Block, RpcError> {
    let not_found = || RpcError::new(RpcError::INVALID_ADDRESS_OR_KEY, "Block not found");
    let height = match selector {
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.len() < 64 => s.parse::<u64>().ok(),
        _ => None,
    };
    match (height, selector) {
        (Some(height), _) => chain.block_at(height).ok_or_else(|| {
            RpcError::invalid_parameter(format!("Block height {height} out of range"))
        }),
        (None, Value::String(s)) => {
            let hash: BlockHash = s.parse().map_err(|_| not_found())?;
            chain.block_by_hash(&hash).ok_or_else(not_found)
        }
        _ => Err(not_found()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NodeMetrics;
    use std::sync::Arc;
    use zsf_protocol::consensus::FEATURE_NOT_ACTIVE_MESSAGE;

    fn node(seed: u8) -> Node {
        let params = ChainParams::regtest()
            .with_nuparams(&["c2d6d0b4:1", "ffffffff:103"])
            .unwrap();
        Node::new(
            params,
            MempoolConfig::default(),
            Keypair::from_seed(&[seed; 32]),
            Arc::new(NodeMetrics::new()),
        )
        .unwrap()
    }

    fn pay(address: &Value, amount: f64) -> Value {
        let mut outputs = serde_json::Map::new();
        outputs.insert(address.as_str().unwrap().to_string(), json!(amount));
        Value::Object(outputs)
    }

    fn coins(zat: u64) -> Value {
        json!(Amount::from_zat(zat).to_coins_f64())
    }

    /// Relay every block `to` lacks from `from`.
    fn sync_blocks(from: &Node, to: &Node) {
        let tip = from.call("getblockcount", &[]).unwrap().as_u64().unwrap();
        let start = to.call("getblockcount", &[]).unwrap().as_u64().unwrap() + 1;
        for height in start..=tip {
            let raw = from.call("getblock", &[json!(height), json!(0)]).unwrap();
            to.call("submitblock", &[raw]).unwrap();
        }
    }

    fn sync_mempools(from: &Node, to: &Node) {
        for txid in from.call("getrawmempool", &[]).unwrap().as_array().unwrap() {
            let raw = from.call("getrawtransaction", &[txid.clone()]).unwrap();
            to.call("sendrawtransaction", &[raw]).unwrap();
        }
    }

    #[test]
    fn two_node_deposit_scenario() {
        let alice = node(1);
        let bob = node(2);

        alice.call("generate", &[json!(101)]).unwrap();
        sync_blocks(&alice, &bob);
        assert_eq!(alice.call("getbalance", &[]).unwrap(), coins(625_000_000));
        assert_eq!(bob.call("getbalance", &[]).unwrap(), coins(0));

        let info = alice.call("getblockchaininfo", &[]).unwrap();
        assert_eq!(info["chainSupply"]["chainValueZat"], json!(101 * 625_000_000u64));
        assert_eq!(info["upgrades"]["ffffffff"]["status"], json!("pending"));

        let bob_address = bob.call("getnewaddress", &[]).unwrap();
        let send = |node: &Node| {
            node.call(
                "sendtoaddress",
                &[bob_address.clone(), json!(1.23), json!(""), json!(""), json!(false), json!(1.11)],
            )
        };

        let err = send(&alice).unwrap_err();
        assert_eq!(err.code, RpcError::VERIFY_REJECTED);
        assert_eq!(err.message, FEATURE_NOT_ACTIVE_MESSAGE);

        alice.call("generate", &[json!(1)]).unwrap();
        sync_blocks(&alice, &bob);
        let txid = send(&alice).unwrap();

        sync_mempools(&alice, &bob);
        bob.call("generate", &[json!(1)]).unwrap();
        sync_blocks(&bob, &alice);

        let confirmed = alice.call("getrawtransaction", &[txid, json!(1)]).unwrap();
        assert_eq!(confirmed["zsfDeposit"], json!(1.11));
        assert_eq!(confirmed["height"], json!(103));

        assert_eq!(bob.call("getbalance", &[]).unwrap(), coins(123_000_000));
        assert_eq!(
            alice.call("getbalance", &[]).unwrap(),
            coins(3 * 625_000_000 - 123_000_000 - 111_000_000 - 10_000)
        );
        let info = bob.call("getblockchaininfo", &[]).unwrap();
        assert_eq!(
            info["chainSupply"]["chainValueZat"],
            json!(103 * 625_000_000u64 - 111_000_000)
        );

        // Raw transaction flow carries the deposit through every stage.
        let raw = alice
            .call(
                "createrawtransaction",
                &[json!([]), pay(&bob_address, 1.23), Value::Null, Value::Null, json!(1.11)],
            )
            .unwrap();
        assert_eq!(alice.call("decoderawtransaction", &[raw.clone()]).unwrap()["zsfDeposit"], json!(1.11));

        let funded = alice.call("fundrawtransaction", &[raw]).unwrap();
        assert_eq!(funded["changepos"], json!(1));
        assert_eq!(funded["fee"], coins(10_000));
        assert_eq!(
            alice.call("decoderawtransaction", &[funded["hex"].clone()]).unwrap()["zsfDeposit"],
            json!(1.11)
        );

        let signed = alice.call("signrawtransaction", &[funded["hex"].clone()]).unwrap();
        assert_eq!(signed["complete"], json!(true));
        let txid = alice.call("sendrawtransaction", &[signed["hex"].clone()]).unwrap();

        alice.call("generate", &[json!(1)]).unwrap();
        sync_blocks(&alice, &bob);

        let seen = bob.call("getrawtransaction", &[txid, json!(1)]).unwrap();
        assert_eq!(seen["zsfDeposit"], json!(1.11));
        assert_eq!(seen["confirmations"], json!(1));
        assert_eq!(bob.call("getbalance", &[]).unwrap(), coins(246_000_000));
        assert_eq!(
            alice.call("getbalance", &[]).unwrap(),
            coins(4 * 625_000_000 - 2 * (123_000_000 + 111_000_000 + 10_000))
        );
        assert_eq!(
            alice.call("getblockchaininfo", &[]).unwrap()["chainSupply"]["zsfDepositsZat"],
            json!(222_000_000u64)
        );
    }

    #[test]
    fn error_codes() {
        let alice = node(1);

        let err = alice.call("nosuchmethod", &[]).unwrap_err();
        assert_eq!(err.code, RpcError::METHOD_NOT_FOUND);

        let err = alice
            .call("sendtoaddress", &[json!("not-an-address"), json!(1)])
            .unwrap_err();
        assert_eq!(err.code, RpcError::INVALID_ADDRESS_OR_KEY);

        let address = alice.call("getnewaddress", &[]).unwrap();
        let err = alice.call("sendtoaddress", &[address.clone(), json!(1)]).unwrap_err();
        assert_eq!(err.code, RpcError::WALLET_INSUFFICIENT_FUNDS);

        let err = alice.call("sendtoaddress", &[address, json!(-1)]).unwrap_err();
        assert_eq!(err.code, RpcError::TYPE_ERROR);

        let err = alice.call("sendrawtransaction", &[json!("zz")]).unwrap_err();
        assert_eq!(err.code, RpcError::DESERIALIZATION_ERROR);

        let err = alice.call("submitblock", &[json!("00")]).unwrap_err();
        assert_eq!(err.code, RpcError::DESERIALIZATION_ERROR);

        let err = alice
            .call("getrawtransaction", &[json!(TxId::ZERO.to_string())])
            .unwrap_err();
        assert_eq!(err.code, RpcError::INVALID_ADDRESS_OR_KEY);

        let err = alice.call("getblock", &[json!(5)]).unwrap_err();
        assert_eq!(err.code, RpcError::INVALID_PARAMETER);
    }

    #[test]
    fn create_raw_rejects_deposit_before_activation() {
        let alice = node(1);
        let address = alice.call("getnewaddress", &[]).unwrap();
        let err = alice
            .call(
                "createrawtransaction",
                &[json!([]), pay(&address, 1.0), Value::Null, Value::Null, json!(1.11)],
            )
            .unwrap_err();
        assert_eq!(err.message, FEATURE_NOT_ACTIVE_MESSAGE);

        let plain = alice
            .call("createrawtransaction", &[json!([]), pay(&address, 1.0)])
            .unwrap();
        let view = alice.call("decoderawtransaction", &[plain]).unwrap();
        assert!(view.get("zsfDeposit").is_none());
        assert_eq!(view["version"], json!(5));
    }

    #[test]
    fn concurrent_sends_spend_distinct_coins() {
        let alice = node(1);
        alice.call("generate", &[json!(102)]).unwrap();
        let bob_address = node(2).call("getnewaddress", &[]).unwrap();

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| scope.spawn(|| alice.call("sendtoaddress", &[bob_address.clone(), json!(1)])))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        for result in &results {
            assert!(result.is_ok(), "{result:?}");
        }
        assert_ne!(results[0].as_ref().unwrap(), results[1].as_ref().unwrap());
        assert_eq!(alice.call("getmempoolinfo", &[]).unwrap()["size"], json!(2));

        // Both mature coinbases are now committed to the mempool.
        let err = alice.call("sendtoaddress", &[bob_address, json!(1)]).unwrap_err();
        assert_eq!(err.code, RpcError::WALLET_INSUFFICIENT_FUNDS);
    }

    #[test]
    fn generate_count_is_bounded() {
        let alice = node(1);
        let err = alice
            .call("generate", &[json!(MAX_GENERATE_BLOCKS + 1)])
            .unwrap_err();
        assert_eq!(err.code, RpcError::INVALID_PARAMETER);
        assert_eq!(alice.call("getblockcount", &[]).unwrap(), json!(0));
    }

    #[test]
    fn single_zatoshi_deposit_from_json_number() {
        let alice = node(1);
        alice.call("generate", &[json!(102)]).unwrap();
        let address = alice.call("getnewaddress", &[]).unwrap();
        let raw = alice
            .call(
                "createrawtransaction",
                &[json!([]), pay(&address, 1.0), Value::Null, Value::Null, json!(0.00000001)],
            )
            .unwrap();
        let view = alice.call("decoderawtransaction", &[raw]).unwrap();
        assert_eq!(view["zsfDepositZat"], json!(1));

        let txid = alice
            .call(
                "sendtoaddress",
                &[address, json!(0.000001), json!(""), json!(""), json!(false), json!(0.00000001)],
            )
            .unwrap();
        let view = alice.call("getrawtransaction", &[txid, json!(1)]).unwrap();
        assert_eq!(view["zsfDepositZat"], json!(1));
        assert_eq!(view["vout"][0]["valueZat"], json!(100));
    }

    #[test]
    fn generate_collects_fees_and_is_regtest_only() {
        let alice = node(1);
        alice.call("generate", &[json!(101)]).unwrap();
        let address = alice.call("getnewaddress", &[]).unwrap();
        alice.call("sendtoaddress", &[address, json!(1)]).unwrap();
        assert_eq!(alice.call("getmempoolinfo", &[]).unwrap()["size"], json!(1));

        let hashes = alice.call("generate", &[json!(1)]).unwrap();
        let block = alice.call("getblock", &[hashes[0].clone()]).unwrap();
        assert_eq!(block["tx"].as_array().unwrap().len(), 2);
        assert_eq!(alice.call("getmempoolinfo", &[]).unwrap()["size"], json!(0));

        let coinbase = alice
            .call("getrawtransaction", &[block["tx"][0].clone(), json!(true)])
            .unwrap();
        assert_eq!(coinbase["vout"][0]["valueZat"], json!(625_000_000u64 + 10_000));

        let mainnet = Node::new(
            ChainParams::for_network(Network::Mainnet),
            MempoolConfig::default(),
            Keypair::from_seed(&[9; 32]),
            Arc::new(NodeMetrics::new()),
        )
        .unwrap();
        let err = mainnet.call("generate", &[json!(1)]).unwrap_err();
        assert_eq!(err.code, RpcError::METHOD_NOT_FOUND);
    }
}
