//! Core transaction and header types for consensus validation

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::hash::HashWriter;
use crate::serialize::Encodable;

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// OutPoint: 𝒪 = ℍ × ℕ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

impl OutPoint {
    pub fn new(hash: Hash, index: u32) -> Self {
        OutPoint { hash, index }
    }

    /// The outpoint referenced by coinbase inputs
    pub fn null() -> Self {
        OutPoint { hash: [0u8; 32], index: u32::MAX }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }
}

/// Transaction Input: ℐ = 𝒪 × 𝕊 × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
}

/// Non-fungible token capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    None = 0,
    Mutable = 1,
    Minting = 2,
}

impl Capability {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Capability::None),
            1 => Some(Capability::Mutable),
            2 => Some(Capability::Minting),
            _ => None,
        }
    }
}

/// Non-fungible part of a token output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonFungible {
    pub capability: Capability,
    pub commitment: ByteString,
}

/// Token payload carried by an output alongside its locking script.
///
/// At least one of `amount > 0` or `nft.is_some()` holds for data decoded
/// from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenData {
    pub category: Hash,
    pub amount: i64,
    pub nft: Option<NonFungible>,
}

impl TokenData {
    pub fn fungible(category: Hash, amount: i64) -> Self {
        TokenData { category, amount, nft: None }
    }

    pub fn has_nft(&self) -> bool {
        self.nft.is_some()
    }

    pub fn has_amount(&self) -> bool {
        self.amount != 0
    }

    pub fn has_commitment_length(&self) -> bool {
        self.nft.as_ref().map_or(false, |nft| !nft.commitment.is_empty())
    }

    pub fn capability(&self) -> Capability {
        self.nft.as_ref().map_or(Capability::None, |nft| nft.capability)
    }

    pub fn commitment(&self) -> &[u8] {
        self.nft.as_ref().map_or(&[], |nft| nft.commitment.as_slice())
    }

    /// Token bitfield byte: flags in the high nibble, capability in the low
    pub fn bitfield(&self) -> u8 {
        let mut bits = 0u8;
        if self.has_commitment_length() {
            bits |= crate::serialize::TOKEN_HAS_COMMITMENT_LENGTH;
        }
        if self.has_nft() {
            bits |= crate::serialize::TOKEN_HAS_NFT;
        }
        if self.has_amount() {
            bits |= crate::serialize::TOKEN_HAS_AMOUNT;
        }
        bits | self.capability() as u8
    }
}

/// Transaction Output: 𝒯 = ℤ × 𝕊 × Token?
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: Amount,
    pub script_pubkey: ByteString,
    #[serde(default)]
    pub token_data: Option<TokenData>,
}

impl TransactionOutput {
    pub fn new(value: Amount, script_pubkey: ByteString) -> Self {
        TransactionOutput { value, script_pubkey, token_data: None }
    }

    /// Placeholder output used by legacy SIGHASH_SINGLE hashing
    pub fn null() -> Self {
        TransactionOutput::new(Amount::from_sat(-1), Vec::new())
    }
}

/// Transaction: 𝒯𝒳 = ℤ × ℐ* × 𝒯* × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// Transaction id: SHA256d of the consensus serialization
    pub fn txid(&self) -> Hash {
        let mut writer = HashWriter::new();
        self.encode(&mut writer);
        writer.finalize_double()
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prevout.is_null()
    }
}

/// Block Header: ℋ = ℤ × ℍ × ℍ × ℕ × ℕ × ℕ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Block hash: SHA256d of the 80-byte header
    pub fn hash(&self) -> Hash {
        let mut writer = HashWriter::new();
        self.encode(&mut writer);
        writer.finalize_double()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_outpoint() {
        assert!(OutPoint::null().is_null());
        assert!(!OutPoint::new([0u8; 32], 0).is_null());
    }

    #[test]
    fn test_token_bitfield() {
        let ft = TokenData::fungible([7u8; 32], 100);
        assert_eq!(ft.bitfield(), 0x10);

        let nft = TokenData {
            category: [7u8; 32],
            amount: 0,
            nft: Some(NonFungible { capability: Capability::Minting, commitment: vec![1, 2] }),
        };
        assert_eq!(nft.bitfield(), 0x62);
        assert_eq!(nft.commitment(), &[1, 2]);
        assert_eq!(nft.capability(), Capability::Minting);
    }

    #[test]
    fn test_genesis_header_hash() {
        let header = BlockHeader {
            version: 1,
            prev_block_hash: [0u8; 32],
            merkle_root: {
                let mut root = [0u8; 32];
                let be = hex::decode("4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b")
                    .unwrap();
                for (i, b) in be.iter().rev().enumerate() {
                    root[i] = *b;
                }
                root
            },
            timestamp: 1231006505,
            bits: 0x1d00ffff,
            nonce: 2083236893,
        };
        let mut hash = header.hash();
        hash.reverse();
        assert_eq!(
            hex::encode(hash),
            "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f"
        );
    }
}
