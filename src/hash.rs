//! Hash functions used by script evaluation and block identification

use bitcoin_hashes::{sha1, sha256d, Hash as _};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::serialize::ByteSink;
use crate::types::Hash;

/// SHA256(x)
pub fn sha256(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// SHA256(SHA256(x))
pub fn sha256d(data: &[u8]) -> Hash {
    sha256d::Hash::hash(data).into_inner()
}

/// RIPEMD160(x)
pub fn ripemd160(data: &[u8]) -> [u8; 20] {
    Ripemd160::digest(data).into()
}

/// RIPEMD160(SHA256(x))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    ripemd160(&sha256(data))
}

/// SHA1(x)
pub fn sha1(data: &[u8]) -> [u8; 20] {
    sha1::Hash::hash(data).into_inner()
}

/// Hex of a hash in the conventional reversed (big-endian) display order
pub fn to_hex_reversed(hash: &Hash) -> String {
    hash.iter().rev().map(|b| format!("{:02x}", b)).collect()
}

/// Streaming SHA256 writer.
///
/// Consensus structures serialize straight into the hasher so that large
/// preimages (legacy signature hashes, block headers) are never buffered.
#[derive(Clone, Default)]
pub struct HashWriter {
    engine: Sha256,
}

impl HashWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single SHA256 of everything written so far
    pub fn finalize_single(self) -> Hash {
        self.engine.finalize().into()
    }

    /// Double SHA256 of everything written so far
    pub fn finalize_double(self) -> Hash {
        let first = self.engine.finalize();
        Sha256::digest(first).into()
    }
}

impl ByteSink for HashWriter {
    fn put(&mut self, bytes: &[u8]) {
        self.engine.update(bytes);
    }
}
