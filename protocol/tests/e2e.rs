//! End-to-end tests for ZSF deposits.
//!
//! Two independent pipelines play the part of two regtest nodes. Blocks and
//! transactions travel between them only as raw bytes, so every scenario
//! also exercises the consensus codec.

use proptest::prelude::*;

use zsf_protocol::amount::Amount;
use zsf_protocol::config::{ChainParams, COIN, DEFAULT_FEE_ZAT, MAX_MONEY};
use zsf_protocol::consensus::{TransactionError, ValidationPipeline};
use zsf_protocol::crypto::keys::Keypair;
use zsf_protocol::mempool::{MempoolConfig, MempoolError};
use zsf_protocol::storage::{Block, BlockHash, ChainSupplyLedger, UtxoView};
use zsf_protocol::transaction::{
    codec, fund_transaction, sign_transaction, Address, OutPoint, Transaction, TransactionBuilder,
    TransactionView, TxId, TxIn, TxOut, TxVersion,
};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

const REWARD: u64 = 625_000_000;
const SEND: u64 = 123_000_000;
const DEPOSIT: u64 = 111_000_000;

fn params() -> ChainParams {
    ChainParams::regtest()
        .with_nuparams(&["ffffffff:103"])
        .expect("valid nuparams")
}

fn node() -> ValidationPipeline {
    ValidationPipeline::new(params(), MempoolConfig::default()).expect("valid params")
}

fn wallet(seed: u8) -> (Keypair, Address) {
    let kp = Keypair::from_seed(&[seed; 32]);
    let address = Address::from_public_key(&kp.public_key());
    (kp, address)
}

/// Mine one block on `node` with everything in its mempool, paying subsidy
/// plus fees to `miner`.
fn mine(node: &ValidationPipeline, miner: Address) -> Block {
    let entries = node.mempool().select_transactions(1_000);
    let fees = Amount::sum(entries.iter().map(|e| e.fee)).expect("fees in range");
    let block = node.with_chain(|chain| {
        let height = chain.tip_height() + 1;
        let reward = chain.subsidy(height).checked_add(fees).expect("reward in range");
        let mut transactions = vec![Transaction::coinbase(
            height,
            chain.registry().branch_id_at(height),
            vec![TxOut::new(miner, reward)],
        )];
        transactions.extend(entries.into_iter().map(|e| e.tx));
        Block::new(height, chain.tip_hash(), height, transactions)
    });
    node.connect_block(block.clone()).expect("mined block connects");
    block
}

/// Mine on `from` and relay the raw block to `to`.
fn mine_and_relay(from: &ValidationPipeline, to: &ValidationPipeline, miner: Address) -> Block {
    let block = mine(from, miner);
    to.connect_raw_block(&block.encode()).expect("peer accepts block");
    block
}

/// The wallet flow behind `sendtoaddress`: build, fund from mature coins,
/// sign, submit.
fn send_with_deposit(
    node: &ValidationPipeline,
    kp: &Keypair,
    to: Address,
    value: u64,
    deposit: u64,
) -> Result<Transaction, MempoolError> {
    let ours = Address::from_public_key(&kp.public_key());
    let (unsigned, coins) = node.with_chain(|chain| {
        let height = chain.tip_height() + 1;
        let maturity = chain.params().coinbase_maturity;
        let coins: Vec<(OutPoint, TxOut)> = chain
            .utxos()
            .coins_for(&ours)
            .into_iter()
            .filter(|(_, coin)| coin.is_mature(height, maturity))
            .map(|(outpoint, coin)| (outpoint, coin.output))
            .collect();
        let tx = TransactionBuilder::new(chain.registry(), height)
            .output(to, Amount::from_zat(value))
            .zsf_deposit(Amount::from_zat(deposit))
            .build();
        (tx, coins)
    });

    let funded = fund_transaction(unsigned, &coins, ours, Amount::from_zat(DEFAULT_FEE_ZAT))
        .expect("wallet has funds");
    let mut tx = funded.tx;
    let report = sign_transaction(&mut tx, kp, &funded.spent).expect("spent outputs line up");
    assert!(report.complete);

    node.accept_transaction(tx.clone())?;
    Ok(tx)
}

fn balance(node: &ValidationPipeline, address: &Address) -> u64 {
    node.with_chain(|chain| {
        chain
            .utxos()
            .coins_for(address)
            .iter()
            .map(|(_, coin)| coin.output.value.zat())
            .sum()
    })
}

// ---------------------------------------------------------------------------
// 1. Deposit Activation Scenario
// ---------------------------------------------------------------------------

#[test]
fn deposit_activation_scenario() {
    let node0 = node();
    let node1 = node();
    let (miner_kp, miner) = wallet(1);
    let (_, recipient) = wallet(2);
    let (_, peer_miner) = wallet(3);

    for _ in 0..101 {
        mine_and_relay(&node0, &node1, miner);
    }
    assert_eq!(node0.tip_height(), 101);
    assert_eq!(node0.chain_value().zat(), REWARD * 101);
    assert_eq!(node1.chain_value().zat(), REWARD * 101);

    // Target height 102 is below ZFuture activation.
    let err = send_with_deposit(&node0, &miner_kp, recipient, SEND, DEPOSIT).unwrap_err();
    assert_eq!(err, MempoolError::Rejected(TransactionError::FeatureNotActive { height: 102 }));
    assert_eq!(err.to_string(), "ZSF deposit is not supported at this block height.");
    assert!(node0.mempool().is_empty());

    mine_and_relay(&node0, &node1, miner);
    assert_eq!(node0.chain_value().zat(), REWARD * 102);

    let tx = send_with_deposit(&node0, &miner_kp, recipient, SEND, DEPOSIT).expect("accepted at 103");
    assert_eq!(tx.version(), TxVersion::ZFuture);
    assert_eq!(node0.chain_value().zat(), REWARD * 102, "mempool leaves supply alone");

    let txid = node1
        .accept_raw_transaction(&codec::encode(&tx))
        .expect("peer accepts relayed transaction");
    assert_eq!(txid, tx.txid());

    // The peer mines it and relays the block back.
    let block = mine_and_relay(&node1, &node0, peer_miner);
    assert_eq!(block.height(), 103);
    assert!(block.transactions.contains(&tx));

    for n in [&node0, &node1] {
        assert_eq!(n.chain_value().zat(), REWARD * 103 - DEPOSIT);
        assert_eq!(n.supply().total_deposits.zat(), DEPOSIT);
        assert!(n.mempool().is_empty());
        assert_eq!(balance(n, &recipient), SEND);
        assert_eq!(balance(n, &peer_miner), REWARD + DEFAULT_FEE_ZAT);
    }
    assert_eq!(balance(&node0, &miner), balance(&node1, &miner));
    assert_eq!(
        balance(&node0, &miner),
        REWARD * 102 - SEND - DEPOSIT - DEFAULT_FEE_ZAT
    );
}

// ---------------------------------------------------------------------------
// 2. Raw Transaction Flow
// ---------------------------------------------------------------------------

#[test]
fn raw_transaction_stages_keep_deposit() {
    let node0 = node();
    let node1 = node();
    let (kp, miner) = wallet(1);
    for _ in 0..102 {
        mine_and_relay(&node0, &node1, miner);
    }

    let network = node0.with_chain(|c| c.params().network);
    let deposit_of = |hex_tx: &str| {
        let tx = codec::decode_hex(hex_tx).expect("decodes");
        let view = serde_json::to_value(TransactionView::new(&tx, network)).expect("serializes");
        (view["zsfDeposit"].as_f64(), view["zsfDepositZat"].as_u64())
    };

    // createrawtransaction
    let raw = node0.with_chain(|c| {
        TransactionBuilder::new(c.registry(), 103)
            .output(Address::from_hash([7; 20]), Amount::from_zat(SEND))
            .zsf_deposit(Amount::from_zat(DEPOSIT))
            .build()
    });
    let raw_hex = hex::encode(codec::encode(&raw));
    assert_eq!(deposit_of(&raw_hex), (Some(1.11), Some(DEPOSIT)));

    // fundrawtransaction
    let coins: Vec<(OutPoint, TxOut)> = node0.with_chain(|c| {
        c.utxos()
            .coins_for(&miner)
            .into_iter()
            .filter(|(_, coin)| coin.is_mature(103, c.params().coinbase_maturity))
            .map(|(o, coin)| (o, coin.output))
            .collect()
    });
    let decoded = codec::decode_hex(&raw_hex).expect("decodes");
    let funded = fund_transaction(decoded, &coins, miner, Amount::from_zat(DEFAULT_FEE_ZAT)).expect("funded");
    let funded_hex = hex::encode(codec::encode(&funded.tx));
    assert_eq!(deposit_of(&funded_hex), (Some(1.11), Some(DEPOSIT)));
    assert_eq!(funded.change_position, Some(1));

    // signrawtransaction
    let mut signed = codec::decode_hex(&funded_hex).expect("decodes");
    sign_transaction(&mut signed, &kp, &funded.spent).expect("signs");
    let signed_hex = hex::encode(codec::encode(&signed));
    assert_eq!(deposit_of(&signed_hex), (Some(1.11), Some(DEPOSIT)));

    // sendrawtransaction, then mined and seen by the peer
    let bytes = hex::decode(&signed_hex).expect("hex");
    let txid = node0.accept_raw_transaction(&bytes).expect("accepted");
    mine_and_relay(&node0, &node1, miner);
    let confirmed = node1.with_chain(|c| {
        let location = c.find_transaction(&txid).expect("indexed on peer");
        assert_eq!(location.height, 103);
        location.tx.clone()
    });
    assert_eq!(confirmed.zsf_deposit().zat(), DEPOSIT);
    assert_eq!(node1.chain_value().zat(), REWARD * 103 - DEPOSIT);
}

// ---------------------------------------------------------------------------
// 3. Activation Boundary Without Deposit
// ---------------------------------------------------------------------------

#[test]
fn plain_sends_work_on_both_sides_of_activation() {
    let node0 = node();
    let (kp, miner) = wallet(1);
    let (_, recipient) = wallet(2);
    for _ in 0..101 {
        mine(&node0, miner);
    }

    let v5 = send_with_deposit(&node0, &kp, recipient, SEND, 0).expect("v5 before activation");
    assert_eq!(v5.version(), TxVersion::V5);
    mine(&node0, miner);

    let after = send_with_deposit(&node0, &kp, recipient, SEND, 0).expect("v5 at activation");
    assert_eq!(after.zsf_deposit(), Amount::ZERO);
    mine(&node0, miner);
    assert_eq!(node0.chain_value().zat(), REWARD * 103);
    assert_eq!(balance(&node0, &recipient), 2 * SEND);
}

#[test]
fn deposit_above_available_value_is_negative_fee() {
    let node0 = node();
    let (kp, miner) = wallet(1);
    for _ in 0..102 {
        mine(&node0, miner);
    }
    let coin = node0.with_chain(|c| {
        let cb = &c.block_at(1).expect("block 1").transactions[0];
        (OutPoint::new(cb.txid(), 0), cb.outputs[0].clone())
    });
    let mut tx = node0.with_chain(|c| {
        TransactionBuilder::new(c.registry(), 103)
            .input(coin.0)
            .output(miner, Amount::from_zat(REWARD - DEPOSIT + 1))
            .zsf_deposit(Amount::from_zat(DEPOSIT))
            .build()
    });
    sign_transaction(&mut tx, &kp, &[coin.1]).expect("signs");
    assert!(matches!(
        node0.accept_transaction(tx),
        Err(MempoolError::Rejected(TransactionError::Balance(_)))
    ));
}

// ---------------------------------------------------------------------------
// 4. Reorganization
// ---------------------------------------------------------------------------

#[test]
fn reorg_returns_deposit_to_supply_and_mempool() {
    let node0 = node();
    let (kp, miner) = wallet(1);
    let (_, other) = wallet(4);
    for _ in 0..102 {
        mine(&node0, miner);
    }
    let fork_hash = node0.with_chain(|c| c.tip_hash());
    let tx = send_with_deposit(&node0, &kp, other, SEND, DEPOSIT).expect("accepted");
    mine(&node0, miner);
    assert_eq!(node0.chain_value().zat(), REWARD * 103 - DEPOSIT);

    let branch_id = node0.with_chain(|c| c.registry().branch_id_at(103));
    let replacement = Block::new(
        103,
        fork_hash,
        9_999,
        vec![Transaction::coinbase(103, branch_id, vec![TxOut::new(other, Amount::from_zat(REWARD))])],
    );
    node0.reorganize(102, vec![replacement]).expect("reorg succeeds");

    assert_eq!(node0.chain_value().zat(), REWARD * 103);
    assert_eq!(node0.supply().total_deposits, Amount::ZERO);
    assert!(node0.mempool().contains(&tx.txid()), "deposit transaction requeued");
    assert!(node0.with_chain(|c| c.find_transaction(&tx.txid()).is_none()));
}

#[test]
fn disconnect_below_activation_drops_deposit_transactions() {
    let node0 = node();
    let (kp, miner) = wallet(1);
    for _ in 0..102 {
        mine(&node0, miner);
    }
    let tx = send_with_deposit(&node0, &kp, miner, SEND, DEPOSIT).expect("accepted");
    mine(&node0, miner);

    node0.disconnect_tip().expect("disconnect 103");
    assert!(node0.mempool().contains(&tx.txid()));

    // Tip 101: the next block is 102, where deposits are not active yet.
    node0.disconnect_tip().expect("disconnect 102");
    assert!(!node0.mempool().contains(&tx.txid()));
    assert_eq!(node0.chain_value().zat(), REWARD * 101);
}

#[test]
fn spent_coins_are_gone_after_block() {
    let node0 = node();
    let (kp, miner) = wallet(1);
    for _ in 0..102 {
        mine(&node0, miner);
    }
    let tx = send_with_deposit(&node0, &kp, miner, SEND, DEPOSIT).expect("accepted");
    mine(&node0, miner);
    node0.with_chain(|c| {
        for input in &tx.inputs {
            assert!(c.utxos().coin(&input.prevout).is_none());
        }
    });
}

// ---------------------------------------------------------------------------
// 5. Properties
// ---------------------------------------------------------------------------

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        any::<bool>(),
        any::<u32>(),
        any::<u32>(),
        0..=MAX_MONEY,
        prop::collection::vec((any::<[u8; 32]>(), any::<u32>(), prop::collection::vec(any::<u8>(), 0..100)), 0..4),
        prop::collection::vec((any::<[u8; 20]>(), 0..=MAX_MONEY), 0..4),
    )
        .prop_map(|(zfuture, branch, expiry, deposit, inputs, outputs)| {
            let version = if zfuture { TxVersion::ZFuture } else { TxVersion::V5 };
            let mut tx = Transaction::new(version, branch);
            tx.expiry_height = expiry;
            for (txid, index, script_sig) in inputs {
                let mut input = TxIn::new(OutPoint::new(TxId::from_bytes(txid), index));
                input.script_sig = script_sig;
                tx.inputs.push(input);
            }
            for (hash, value) in outputs {
                tx.outputs.push(TxOut::new(Address::from_hash(hash), Amount::from_zat(value)));
            }
            if zfuture {
                tx.set_zsf_deposit(Amount::from_zat(deposit));
            }
            tx
        })
}

proptest! {
    #[test]
    fn codec_round_trips(tx in arb_transaction()) {
        let bytes = codec::encode(&tx);
        let decoded = codec::decode(&bytes).expect("round trip");
        prop_assert_eq!(decoded.zsf_deposit(), tx.zsf_deposit());
        prop_assert_eq!(decoded, tx);
    }

    #[test]
    fn ledger_disconnect_inverts_connect(
        steps in prop::collection::vec((0u64..=50 * COIN, 0u64..=100), 1..20)
    ) {
        let mut ledger = ChainSupplyLedger::new();
        let mut history = vec![ledger.state()];
        let mut blocks = Vec::new();
        let mut expected: u64 = 0;

        for (i, (subsidy, percent)) in steps.iter().enumerate() {
            let height = i as u64 + 1;
            let deposit = subsidy * percent / 100;
            let mut tx = Transaction::new(TxVersion::V5, 0);
            tx.set_zsf_deposit(Amount::from_zat(deposit));
            let block = Block::new(height, BlockHash::ZERO, height, vec![tx]);

            ledger.connect(&block, Amount::from_zat(*subsidy)).expect("connect");
            expected = expected + subsidy - deposit;
            prop_assert_eq!(ledger.chain_value().zat(), expected);
            history.push(ledger.state());
            blocks.push((block, *subsidy));
        }

        history.pop();
        while let Some((block, subsidy)) = blocks.pop() {
            ledger.disconnect(&block, Amount::from_zat(subsidy)).expect("disconnect");
            prop_assert_eq!(Some(ledger.state()), history.pop());
        }
        prop_assert_eq!(ledger.chain_value(), Amount::ZERO);
    }
}
