//! # Cryptographic Primitives
//!
//! Thin, typed wrappers around audited implementations: SHA-256 and BLAKE3
//! for hashing, Ed25519 for spend authorization. Nothing here is novel.

pub mod hash;
pub mod keys;

pub use hash::{blake3_hash, double_sha256, merkle_root, sha256};
pub use keys::{KeyError, Keypair, PublicKey, Signature};
