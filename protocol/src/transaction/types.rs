//! Core type definitions for transparent transactions.
//!
//! These types form the vocabulary of every transaction: identifiers,
//! outpoints, inputs, outputs and addresses. They are kept small and
//! `Copy`-friendly where possible.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::amount::Amount;
use crate::config::{Network, SEQUENCE_FINAL};
use crate::crypto::hash::{blake3_hash, double_sha256};
use crate::crypto::keys::PublicKey;

// ---------------------------------------------------------------------------
// TxId
// ---------------------------------------------------------------------------

/// Transaction identifier: `double_sha256` of the consensus encoding.
///
/// Stored in internal byte order; rendered byte-reversed, the way block
/// explorers and RPC clients expect.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TxId([u8; 32]);

impl TxId {
    pub const ZERO: TxId = TxId([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        TxId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self)
    }
}

impl FromStr for TxId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        bytes.reverse();
        Ok(TxId(bytes))
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// OutPoint
// ---------------------------------------------------------------------------

/// Reference to a specific output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TxId,
    pub index: u32,
}

impl OutPoint {
    pub fn new(txid: TxId, index: u32) -> Self {
        Self { txid, index }
    }

    /// The outpoint a coinbase input refers to.
    pub const fn null() -> Self {
        Self {
            txid: TxId::ZERO,
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.index == u32::MAX && self.txid.is_zero()
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.index)
    }
}

// ---------------------------------------------------------------------------
// TxIn / TxOut
// ---------------------------------------------------------------------------

/// A transaction input.
///
/// For a signed spend `script_sig` is `signature (64) || public key (32)`.
/// For a coinbase it holds the block height as 8 little-endian bytes, which
/// keeps coinbase txids unique across heights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub prevout: OutPoint,
    #[serde(with = "hex_bytes")]
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    /// An unsigned input spending `prevout`.
    pub fn new(prevout: OutPoint) -> Self {
        Self {
            prevout,
            script_sig: Vec::new(),
            sequence: SEQUENCE_FINAL,
        }
    }

    /// The single input of a coinbase transaction at `height`.
    pub fn coinbase(height: u64) -> Self {
        Self {
            prevout: OutPoint::null(),
            script_sig: height.to_le_bytes().to_vec(),
            sequence: SEQUENCE_FINAL,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.prevout.is_null()
    }
}

/// A transaction output paying `value` to `address`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub value: Amount,
    pub address: Address,
}

impl TxOut {
    pub fn new(address: Address, value: Amount) -> Self {
        Self { value, address }
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Length of an address key hash.
pub const ADDRESS_HASH_LENGTH: usize = 20;

/// Errors parsing a base58 address string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 encoding")]
    InvalidEncoding,

    #[error("invalid address length: {0} bytes")]
    InvalidLength(usize),

    #[error("address checksum mismatch")]
    BadChecksum,

    #[error("address belongs to a different network")]
    WrongNetwork,
}

/// A transparent key-hash address: the first 20 bytes of the BLAKE3 hash of
/// an Ed25519 public key.
///
/// The wire format carries only the hash. The text form prepends the
/// network's two-byte prefix and appends a four-byte double-SHA-256
/// checksum before base58 encoding.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_HASH_LENGTH]);

impl Address {
    pub const fn from_hash(hash: [u8; ADDRESS_HASH_LENGTH]) -> Self {
        Address(hash)
    }

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = blake3_hash(public_key.as_bytes());
        let mut hash = [0u8; ADDRESS_HASH_LENGTH];
        hash.copy_from_slice(&digest[..ADDRESS_HASH_LENGTH]);
        Address(hash)
    }

    pub fn hash(&self) -> &[u8; ADDRESS_HASH_LENGTH] {
        &self.0
    }

    /// Base58check text form for `network`.
    pub fn encode(&self, network: Network) -> String {
        let mut payload = Vec::with_capacity(2 + ADDRESS_HASH_LENGTH + 4);
        payload.extend_from_slice(&network.address_prefix());
        payload.extend_from_slice(&self.0);
        let checksum = double_sha256(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload).into_string()
    }

    /// Parse a base58check address, requiring the prefix of `network`.
    pub fn decode(s: &str, network: Network) -> Result<Self, AddressError> {
        let raw = bs58::decode(s)
            .into_vec()
            .map_err(|_| AddressError::InvalidEncoding)?;
        if raw.len() != 2 + ADDRESS_HASH_LENGTH + 4 {
            return Err(AddressError::InvalidLength(raw.len()));
        }
        let (payload, checksum) = raw.split_at(2 + ADDRESS_HASH_LENGTH);
        if double_sha256(payload)[..4] != *checksum {
            return Err(AddressError::BadChecksum);
        }
        if payload[..2] != network.address_prefix() {
            return Err(AddressError::WrongNetwork);
        }
        let mut hash = [0u8; ADDRESS_HASH_LENGTH];
        hash.copy_from_slice(&payload[2..]);
        Ok(Address(hash))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", hex::encode(self.0))
    }
}

/// Serde adapter for byte vectors as hex strings.
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::Keypair;

    #[test]
    fn txid_displays_byte_reversed() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xAB;
        let txid = TxId::from_bytes(bytes);
        let shown = txid.to_string();
        assert!(shown.ends_with("ab"));
        assert_eq!(shown.parse::<TxId>().unwrap(), txid);
    }

    #[test]
    fn null_outpoint() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new(TxId::ZERO, 0).is_null());
        assert!(TxIn::coinbase(7).is_coinbase());
    }

    #[test]
    fn address_roundtrip_and_network_check() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        let addr = Address::from_public_key(&kp.public_key());
        let text = addr.encode(Network::Regtest);
        assert!(text.starts_with("tm"));
        assert_eq!(Address::decode(&text, Network::Regtest).unwrap(), addr);
        assert_eq!(
            Address::decode(&text, Network::Mainnet).unwrap_err(),
            AddressError::WrongNetwork
        );
    }

    #[test]
    fn address_rejects_corruption() {
        let addr = Address::from_hash([9u8; 20]);
        let mut text = addr.encode(Network::Testnet);
        let last = text.pop().unwrap();
        text.push(if last == '1' { '2' } else { '1' });
        assert!(Address::decode(&text, Network::Testnet).is_err());
        assert!(matches!(
            Address::decode("0OIl", Network::Testnet),
            Err(AddressError::InvalidEncoding)
        ));
    }

    #[test]
    fn txin_serializes_script_as_hex() {
        let input = TxIn::coinbase(1);
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["script_sig"], "0100000000000000");
    }
}
