//! # Hashing Utilities
//!
//! Two hash functions, two jobs:
//!
//! - **double SHA-256** — transaction IDs, signature hashes and address
//!   checksums. This is what the rest of the UTXO world expects, and txids
//!   have to be reproducible by any external tool that reads raw bytes.
//! - **BLAKE3** — node-internal structures: block hashes, Merkle roots over
//!   txids and public-key hashes for addresses.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data as a fixed-size array.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    output
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// # Example
///
/// ```
/// use zsf_protocol::crypto::double_sha256;
///
/// let txid = double_sha256(b"raw transaction bytes");
/// assert_eq!(txid.len(), 32);
/// ```
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// Compute the BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Interior Merkle node: BLAKE3 over `left || right`.
fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Compute a binary Merkle root over 32-byte leaves with BLAKE3.
///
/// Odd levels duplicate their last element. An empty leaf set yields the
/// all-zero root. Duplicate leaves cannot occur for valid blocks because
/// txids are unique (coinbases commit to their height).
pub fn merkle_root(leaves: &[[u8; 32]]) -> [u8; 32] {
    if leaves.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    if level.len() == 1 {
        return hash_pair(&level[0], &level[0]);
    }

    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for chunk in level.chunks(2) {
            let left = &chunk[0];
            let right = chunk.get(1).unwrap_or(left);
            next.push(hash_pair(left, right));
        }
        level = next;
    }

    level[0]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc")
        let expected =
            hex::decode("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
                .unwrap();
        assert_eq!(sha256(b"abc").to_vec(), expected);
    }

    #[test]
    fn double_sha256_differs_from_single() {
        assert_ne!(double_sha256(b"zsf"), sha256(b"zsf"));
        assert_eq!(double_sha256(b"zsf"), sha256(&sha256(b"zsf")));
    }

    #[test]
    fn pair_hash_matches_concatenation() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        assert_eq!(hash_pair(&a, &b), blake3_hash(&[a, b].concat()));
    }

    #[test]
    fn merkle_root_empty_is_zero() {
        assert_eq!(merkle_root(&[]), [0u8; 32]);
    }

    #[test]
    fn merkle_root_is_order_sensitive() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }

    #[test]
    fn merkle_root_odd_level_duplicates_last() {
        let a = blake3_hash(b"a");
        let b = blake3_hash(b"b");
        let c = blake3_hash(b"c");
        let left = hash_pair(&a, &b);
        let right = hash_pair(&c, &c);
        assert_eq!(merkle_root(&[a, b, c]), hash_pair(&left, &right));
    }
}
