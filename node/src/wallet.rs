//! In-process regtest wallet.
//!
//! Holds Ed25519 keys in memory. The first key receives mining rewards;
//! `getnewaddress` appends fresh keys. Balances and spendable coins are read
//! from the confirmed UTXO set. Coinbase outputs count once they are
//! `coinbase_maturity + 1` blocks deep.

use parking_lot::RwLock;

use zsf_protocol::config::Network;
use zsf_protocol::crypto::keys::Keypair;
use zsf_protocol::storage::{ChainState, Coin};
use zsf_protocol::transaction::{
    sign_transaction, Address, OutPoint, SigningError, SigningReport, Transaction, TxOut,
};

pub struct Wallet {
    network: Network,
    keys: RwLock<Vec<Keypair>>,
}

impl Wallet {
    pub fn new(primary: Keypair, network: Network) -> Self {
        Self {
            network,
            keys: RwLock::new(vec![primary]),
        }
    }

    /// Address receiving coinbase rewards.
    pub fn mining_address(&self) -> Address {
        let keys = self.keys.read();
        Address::from_public_key(&keys[0].public_key())
    }

    pub fn new_address(&self) -> Address {
        let keypair = Keypair::generate();
        let address = Address::from_public_key(&keypair.public_key());
        self.keys.write().push(keypair);
        tracing::debug!(address = %address.encode(self.network), "wallet key generated");
        address
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.keys
            .read()
            .iter()
            .map(|k| Address::from_public_key(&k.public_key()))
            .collect()
    }

    /// Wallet coins in `chain` that are spendable by a transaction mined in
    /// the next block, largest first.
    pub fn spendable_coins(&self, chain: &ChainState) -> Vec<(OutPoint, TxOut)> {
        let tip = chain.tip_height();
        let maturity = chain.params().coinbase_maturity;
        let mut coins: Vec<(OutPoint, Coin)> = self
            .addresses()
            .iter()
            .flat_map(|address| chain.utxos().coins_for(address))
            .filter(|(_, coin)| !coin.is_coinbase || coin.depth(tip) > maturity)
            .collect();
        coins.sort_by(|a, b| b.1.output.value.cmp(&a.1.output.value).then(a.0.cmp(&b.0)));
        coins
            .into_iter()
            .map(|(outpoint, coin)| (outpoint, coin.output))
            .collect()
    }

    /// Sign every input of `tx` that a wallet key controls.
    pub fn sign(&self, tx: &mut Transaction, spent: &[TxOut]) -> Result<SigningReport, SigningError> {
        let keys = self.keys.read();
        let mut signed = 0;
        for keypair in keys.iter() {
            signed += sign_transaction(tx, keypair, spent)?.signed;
        }
        Ok(SigningReport {
            signed,
            complete: tx.is_signed(),
        })
    }
}
