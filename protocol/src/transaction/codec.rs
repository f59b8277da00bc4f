//! # Transaction Codec
//!
//! Consensus byte encoding of [`Transaction`]. All integers little-endian.
//!
//! ```text
//! header               u32   version | OVERWINTERED_FLAG
//! version_group_id     u32
//! consensus_branch_id  u32
//! lock_time            u32
//! expiry_height        u32
//! zsf_deposit          ZFuture only: CompactSize len (0..=8) + len bytes
//! vin                  CompactSize count, then per input:
//!                      prev txid [32], prev index u32,
//!                      script_sig CompactSize + bytes, sequence u32
//! vout                 CompactSize count, then per output:
//!                      value u64, address hash [20]
//! ```
//!
//! The deposit is the minimal little-endian encoding of the amount: no
//! zero high byte, and zero is the empty byte string. Any other encoding of
//! the same value is rejected so that every transaction has exactly one
//! byte representation and therefore one txid.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use super::builder::{Transaction, TxVersion};
use super::types::{Address, OutPoint, TxId, TxIn, TxOut, ADDRESS_HASH_LENGTH};
use crate::amount::Amount;
use crate::config::{
    MAX_DEPOSIT_FIELD_LEN, MAX_SCRIPT_SIG_LEN, MAX_TX_INPUTS, MAX_TX_OUTPUTS, OVERWINTERED_FLAG,
};

/// Errors decoding consensus bytes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of data")]
    Truncated,

    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),

    #[error("transaction header lacks the overwintered flag")]
    NotOverwintered,

    #[error("unknown transaction version {0}")]
    UnknownVersion(u32),

    #[error("version group id {found:#010x} does not match version {version}")]
    VersionGroupMismatch { version: u32, found: u32 },

    #[error("non-canonical compact size")]
    NonCanonicalCompactSize,

    #[error("zsf deposit field of {0} bytes exceeds {MAX_DEPOSIT_FIELD_LEN}")]
    DepositTooLong(u64),

    #[error("zsf deposit encoding is not minimal")]
    NonMinimalDeposit,

    #[error("{what} count {count} exceeds limit {limit}")]
    TooMany {
        what: &'static str,
        count: u64,
        limit: usize,
    },

    #[error("invalid hex: {0}")]
    Hex(String),
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Encode a transaction.
pub fn encode(tx: &Transaction) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(128 + tx.inputs.len() * 140 + tx.outputs.len() * 28);
    write_transaction(&mut buf, tx);
    buf.to_vec()
}

/// Decode exactly one transaction; trailing bytes are an error.
pub fn decode(bytes: &[u8]) -> Result<Transaction, DecodeError> {
    let mut buf = bytes;
    let tx = read_transaction(&mut buf)?;
    if buf.has_remaining() {
        return Err(DecodeError::TrailingBytes(buf.remaining()));
    }
    Ok(tx)
}

/// Decode a hex string as produced by RPC clients.
pub fn decode_hex(s: &str) -> Result<Transaction, DecodeError> {
    let bytes = hex::decode(s.trim()).map_err(|e| DecodeError::Hex(e.to_string()))?;
    decode(&bytes)
}

/// Append the encoding of `tx` to `buf`.
pub fn write_transaction(buf: &mut BytesMut, tx: &Transaction) {
    let version = tx.version();
    buf.put_u32_le(version.number() | OVERWINTERED_FLAG);
    buf.put_u32_le(version.version_group_id());
    buf.put_u32_le(tx.consensus_branch_id);
    buf.put_u32_le(tx.lock_time);
    buf.put_u32_le(tx.expiry_height);

    if version.has_deposit_field() {
        let deposit = encode_deposit(tx.zsf_deposit());
        write_compact_size(buf, deposit.len() as u64);
        buf.put_slice(&deposit);
    }

    write_compact_size(buf, tx.inputs.len() as u64);
    for input in &tx.inputs {
        buf.put_slice(input.prevout.txid.as_bytes());
        buf.put_u32_le(input.prevout.index);
        write_compact_size(buf, input.script_sig.len() as u64);
        buf.put_slice(&input.script_sig);
        buf.put_u32_le(input.sequence);
    }

    write_compact_size(buf, tx.outputs.len() as u64);
    for output in &tx.outputs {
        buf.put_u64_le(output.value.zat());
        buf.put_slice(output.address.hash());
    }
}

/// Read one transaction from the front of `buf`.
pub fn read_transaction<B: Buf>(buf: &mut B) -> Result<Transaction, DecodeError> {
    let header = read_u32(buf)?;
    if header & OVERWINTERED_FLAG == 0 {
        return Err(DecodeError::NotOverwintered);
    }
    let number = header & !OVERWINTERED_FLAG;
    let version = TxVersion::from_number(number).ok_or(DecodeError::UnknownVersion(number))?;
    let group = read_u32(buf)?;
    if group != version.version_group_id() {
        return Err(DecodeError::VersionGroupMismatch {
            version: number,
            found: group,
        });
    }

    let mut tx = Transaction::new(version, read_u32(buf)?);
    tx.lock_time = read_u32(buf)?;
    tx.expiry_height = read_u32(buf)?;

    if version.has_deposit_field() {
        tx.zsf_deposit = read_deposit(buf)?;
    }

    let input_count = read_count(buf, "input", MAX_TX_INPUTS)?;
    tx.inputs.reserve(input_count);
    for _ in 0..input_count {
        let txid = TxId::from_bytes(read_array::<32, _>(buf)?);
        let index = read_u32(buf)?;
        let script_len = read_count(buf, "script_sig byte", MAX_SCRIPT_SIG_LEN)?;
        need(buf, script_len)?;
        let mut script_sig = vec![0u8; script_len];
        buf.copy_to_slice(&mut script_sig);
        let sequence = read_u32(buf)?;
        tx.inputs.push(TxIn {
            prevout: OutPoint::new(txid, index),
            script_sig,
            sequence,
        });
    }

    let output_count = read_count(buf, "output", MAX_TX_OUTPUTS)?;
    tx.outputs.reserve(output_count);
    for _ in 0..output_count {
        need(buf, 8)?;
        let value = Amount::from_zat(buf.get_u64_le());
        let address = Address::from_hash(read_array::<ADDRESS_HASH_LENGTH, _>(buf)?);
        tx.outputs.push(TxOut { value, address });
    }

    Ok(tx)
}

// ---------------------------------------------------------------------------
// Deposit field
// ---------------------------------------------------------------------------

/// Minimal little-endian bytes of the deposit; empty for zero.
pub fn encode_deposit(deposit: Amount) -> Vec<u8> {
    let value = deposit.zat();
    let len = (64 - value.leading_zeros() as usize).div_ceil(8);
    value.to_le_bytes()[..len].to_vec()
}

fn read_deposit<B: Buf>(buf: &mut B) -> Result<Amount, DecodeError> {
    let len = read_compact_size(buf)?;
    if len > MAX_DEPOSIT_FIELD_LEN as u64 {
        return Err(DecodeError::DepositTooLong(len));
    }
    let len = len as usize;
    need(buf, len)?;
    let mut bytes = [0u8; 8];
    buf.copy_to_slice(&mut bytes[..len]);
    if len > 0 && bytes[len - 1] == 0 {
        return Err(DecodeError::NonMinimalDeposit);
    }
    Ok(Amount::from_zat(u64::from_le_bytes(bytes)))
}

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Bitcoin-style variable-length integer.
pub fn write_compact_size(buf: &mut BytesMut, n: u64) {
    match n {
        0..=0xFC => buf.put_u8(n as u8),
        0xFD..=0xFFFF => {
            buf.put_u8(0xFD);
            buf.put_u16_le(n as u16);
        }
        0x1_0000..=0xFFFF_FFFF => {
            buf.put_u8(0xFE);
            buf.put_u32_le(n as u32);
        }
        _ => {
            buf.put_u8(0xFF);
            buf.put_u64_le(n);
        }
    }
}

/// Read a CompactSize, rejecting encodings longer than necessary.
pub fn read_compact_size<B: Buf>(buf: &mut B) -> Result<u64, DecodeError> {
    need(buf, 1)?;
    let (value, min) = match buf.get_u8() {
        0xFD => {
            need(buf, 2)?;
            (u64::from(buf.get_u16_le()), 0xFD)
        }
        0xFE => {
            need(buf, 4)?;
            (u64::from(buf.get_u32_le()), 0x1_0000)
        }
        0xFF => {
            need(buf, 8)?;
            (buf.get_u64_le(), 0x1_0000_0000)
        }
        small => return Ok(u64::from(small)),
    };
    if value < min {
        return Err(DecodeError::NonCanonicalCompactSize);
    }
    Ok(value)
}

fn read_count<B: Buf>(buf: &mut B, what: &'static str, limit: usize) -> Result<usize, DecodeError> {
    let count = read_compact_size(buf)?;
    if count > limit as u64 {
        return Err(DecodeError::TooMany { what, count, limit });
    }
    Ok(count as usize)
}

fn need<B: Buf>(buf: &B, n: usize) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        Err(DecodeError::Truncated)
    } else {
        Ok(())
    }
}

fn read_u32<B: Buf>(buf: &mut B) -> Result<u32, DecodeError> {
    need(buf, 4)?;
    Ok(buf.get_u32_le())
}

pub(crate) fn read_array<const N: usize, B: Buf>(buf: &mut B) -> Result<[u8; N], DecodeError> {
    need(buf, N)?;
    let mut out = [0u8; N];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
