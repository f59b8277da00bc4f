//! # Block Structure
//!
//! A block is the unit of chain extension: a header linking to its parent
//! plus an ordered transaction list whose first entry is the coinbase.
//!
//! ## Block Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  BlockHeader                                │
//! │  ├── height: u64                            │
//! │  ├── prev_hash: [u8; 32]                    │
//! │  ├── merkle_root: [u8; 32] (over txids)     │
//! │  └── time: u64                              │
//! ├─────────────────────────────────────────────┤
//! │  transactions: Vec<Transaction>             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The block hash is the BLAKE3 hash of the 80-byte header encoding. The
//! wire form is the header followed by a CompactSize transaction count and
//! the consensus encoding of each transaction.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::amount::Amount;
use crate::config::MAX_BLOCK_TRANSACTIONS;
use crate::crypto::hash::{blake3_hash, merkle_root};
use crate::transaction::codec::{
    read_array, read_compact_size, read_transaction, write_compact_size, write_transaction,
    DecodeError,
};
use crate::transaction::Transaction;

/// Encoded header length.
pub const HEADER_LENGTH: usize = 8 + 32 + 32 + 8;

// ---------------------------------------------------------------------------
// BlockHash
// ---------------------------------------------------------------------------

/// BLAKE3 hash of a block header, rendered as plain hex.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const ZERO: BlockHash = BlockHash([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        BlockHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", self)
    }
}

impl FromStr for BlockHash {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(BlockHash(bytes))
    }
}

impl Serialize for BlockHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// BlockHeader
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height (genesis = 0).
    pub height: u64,
    /// Hash of the parent header. All zeros for genesis.
    pub prev_hash: BlockHash,
    /// Merkle root over the txids of the block's transactions.
    #[serde(with = "hex_array")]
    pub merkle_root: [u8; 32],
    /// Unix timestamp in seconds.
    pub time: u64,
}

impl BlockHeader {
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[..8].copy_from_slice(&self.height.to_le_bytes());
        out[8..40].copy_from_slice(self.prev_hash.as_bytes());
        out[40..72].copy_from_slice(&self.merkle_root);
        out[72..].copy_from_slice(&self.time.to_le_bytes());
        out
    }

    pub fn hash(&self) -> BlockHash {
        BlockHash(blake3_hash(&self.encode()))
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// Header plus ordered transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The genesis block: height 0, no transactions, contributes no value.
    pub fn genesis() -> Self {
        Block {
            header: BlockHeader {
                height: 0,
                prev_hash: BlockHash::ZERO,
                merkle_root: [0u8; 32],
                time: 0,
            },
            transactions: Vec::new(),
        }
    }

    /// A block at `height` on top of `prev_hash`, with the merkle root
    /// computed from `transactions`.
    pub fn new(height: u64, prev_hash: BlockHash, time: u64, transactions: Vec<Transaction>) -> Self {
        let merkle_root = compute_merkle_root(&transactions);
        Block {
            header: BlockHeader {
                height,
                prev_hash,
                merkle_root,
                time,
            },
            transactions,
        }
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Checked sum of all ZSF deposits in the block.
    pub fn total_deposits(&self) -> Option<Amount> {
        Amount::sum(self.transactions.iter().map(Transaction::zsf_deposit))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(HEADER_LENGTH + 256 * self.transactions.len());
        buf.put_slice(&self.header.encode());
        write_compact_size(&mut buf, self.transactions.len() as u64);
        for tx in &self.transactions {
            write_transaction(&mut buf, tx);
        }
        buf.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut buf = bytes;
        let height = u64::from_le_bytes(read_array::<8, _>(&mut buf)?);
        let prev_hash = BlockHash(read_array::<32, _>(&mut buf)?);
        let merkle_root = read_array::<32, _>(&mut buf)?;
        let time = u64::from_le_bytes(read_array::<8, _>(&mut buf)?);

        let count = read_compact_size(&mut buf)?;
        if count > MAX_BLOCK_TRANSACTIONS as u64 {
            return Err(DecodeError::TooMany {
                what: "transaction",
                count,
                limit: MAX_BLOCK_TRANSACTIONS,
            });
        }
        let mut transactions = Vec::with_capacity(count as usize);
        for _ in 0..count {
            transactions.push(read_transaction(&mut buf)?);
        }
        if buf.has_remaining() {
            return Err(DecodeError::TrailingBytes(buf.remaining()));
        }

        Ok(Block {
            header: BlockHeader {
                height,
                prev_hash,
                merkle_root,
                time,
            },
            transactions,
        })
    }

    pub fn decode_hex(s: &str) -> Result<Self, DecodeError> {
        let bytes = hex::decode(s.trim()).map_err(|e| DecodeError::Hex(e.to_string()))?;
        Self::decode(&bytes)
    }
}

/// Merkle root over the txids of `transactions`.
pub fn compute_merkle_root(transactions: &[Transaction]) -> [u8; 32] {
    let leaves: Vec<[u8; 32]> = transactions.iter().map(|tx| *tx.txid().as_bytes()).collect();
    merkle_root(&leaves)
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        let mut out = [0u8; 32];
        hex::decode_to_slice(s, &mut out).map_err(serde::de::Error::custom)?;
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
