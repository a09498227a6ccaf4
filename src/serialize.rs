//! Consensus serialization
//!
//! Little-endian integers, compact-size length prefixes and the token prefix
//! that shares the locking bytecode field of an output.

use crate::amount::Amount;
use crate::constants::MAX_SERIALIZED_SIZE;
use crate::error::{ConsensusError, Result};
use crate::types::*;

/// First byte of an output's script field when it carries token data
pub const SPECIAL_TOKEN_PREFIX: u8 = 0xef;

pub const TOKEN_RESERVED_BIT: u8 = 0x80;
pub const TOKEN_HAS_COMMITMENT_LENGTH: u8 = 0x40;
pub const TOKEN_HAS_NFT: u8 = 0x20;
pub const TOKEN_HAS_AMOUNT: u8 = 0x10;

/// Destination for serialized bytes
pub trait ByteSink {
    fn put(&mut self, bytes: &[u8]);
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Types with a consensus encoding
pub trait Encodable {
    fn encode<S: ByteSink>(&self, sink: &mut S);

    fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Types decodable from their consensus encoding
pub trait Decodable: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;
}

/// Decode a value that must consume `bytes` exactly
pub fn deserialize<T: Decodable>(bytes: &[u8]) -> Result<T> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    if !reader.is_empty() {
        return Err(ConsensusError::Serialization(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }
    Ok(value)
}

/// Cursor over a byte slice
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Number of bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.remaining() < len {
            return Err(ConsensusError::Serialization(format!(
                "unexpected end of data: need {} bytes, have {}",
                len,
                self.remaining()
            )));
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash> {
        self.read_array()
    }

    /// Compact size with canonical-encoding and range checks
    pub fn read_compact_size(&mut self) -> Result<u64> {
        let non_canonical = || ConsensusError::Serialization("non-canonical compact size".to_string());
        let value = match self.read_u8()? {
            0xfd => {
                let v = u64::from(self.read_u16()?);
                if v < 0xfd {
                    return Err(non_canonical());
                }
                v
            }
            0xfe => {
                let v = u64::from(self.read_u32()?);
                if v < 0x1_0000 {
                    return Err(non_canonical());
                }
                v
            }
            0xff => {
                let v = self.read_u64()?;
                if v < 0x1_0000_0000 {
                    return Err(non_canonical());
                }
                v
            }
            small => u64::from(small),
        };
        if value > MAX_SERIALIZED_SIZE {
            return Err(ConsensusError::Serialization("compact size too large".to_string()));
        }
        Ok(value)
    }

    /// Compact-size prefixed byte vector
    pub fn read_var_bytes(&mut self) -> Result<ByteString> {
        let len = self.read_compact_size()? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }
}

pub fn write_compact_size<S: ByteSink>(sink: &mut S, value: u64) {
    if value < 0xfd {
        sink.put(&[value as u8]);
    } else if value <= 0xffff {
        sink.put(&[0xfd]);
        sink.put(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        sink.put(&[0xfe]);
        sink.put(&(value as u32).to_le_bytes());
    } else {
        sink.put(&[0xff]);
        sink.put(&value.to_le_bytes());
    }
}

pub fn compact_size_len(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

pub fn write_var_bytes<S: ByteSink>(sink: &mut S, bytes: &[u8]) {
    write_compact_size(sink, bytes.len() as u64);
    sink.put(bytes);
}

impl Encodable for OutPoint {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.put(&self.hash);
        sink.put(&self.index.to_le_bytes());
    }
}

impl Decodable for OutPoint {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(OutPoint { hash: reader.read_hash()?, index: reader.read_u32()? })
    }
}

impl Encodable for TransactionInput {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        self.prevout.encode(sink);
        write_var_bytes(sink, &self.script_sig);
        sink.put(&self.sequence.to_le_bytes());
    }
}

impl Decodable for TransactionInput {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(TransactionInput {
            prevout: OutPoint::decode(reader)?,
            script_sig: reader.read_var_bytes()?,
            sequence: reader.read_u32()?,
        })
    }
}

impl Encodable for TokenData {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.put(&self.category);
        sink.put(&[self.bitfield()]);
        if self.has_commitment_length() {
            write_var_bytes(sink, self.commitment());
        }
        if self.has_amount() {
            write_compact_size(sink, self.amount as u64);
        }
    }
}

impl TokenData {
    /// Decode the token payload that follows [`SPECIAL_TOKEN_PREFIX`]
    pub fn decode_payload(reader: &mut Reader<'_>) -> Result<Self> {
        let invalid = |what: &str| ConsensusError::Serialization(format!("invalid token data: {}", what));

        let category = reader.read_hash()?;
        let bitfield = reader.read_u8()?;
        if bitfield & TOKEN_RESERVED_BIT != 0 {
            return Err(invalid("reserved bit set"));
        }
        let capability = Capability::from_u8(bitfield & 0x0f).ok_or_else(|| invalid("capability"))?;
        let has_nft = bitfield & TOKEN_HAS_NFT != 0;
        let has_commitment = bitfield & TOKEN_HAS_COMMITMENT_LENGTH != 0;
        let has_amount = bitfield & TOKEN_HAS_AMOUNT != 0;

        if !has_nft && (has_commitment || capability != Capability::None) {
            return Err(invalid("nft fields without nft"));
        }
        if !has_nft && !has_amount {
            return Err(invalid("empty token"));
        }

        let commitment = if has_commitment {
            let commitment = reader.read_var_bytes()?;
            if commitment.is_empty() {
                return Err(invalid("empty commitment"));
            }
            commitment
        } else {
            Vec::new()
        };

        let amount = if has_amount {
            // amounts are not bounded by MAX_SERIALIZED_SIZE, read the raw varint
            let amount = read_token_amount(reader)?;
            if amount == 0 || amount > i64::MAX as u64 {
                return Err(invalid("amount out of range"));
            }
            amount as i64
        } else {
            0
        };

        Ok(TokenData {
            category,
            amount,
            nft: has_nft.then(|| NonFungible { capability, commitment }),
        })
    }
}

fn read_token_amount(reader: &mut Reader<'_>) -> Result<u64> {
    let non_canonical = || ConsensusError::Serialization("non-canonical token amount".to_string());
    match reader.read_u8()? {
        0xfd => {
            let v = u64::from(reader.read_u16()?);
            if v < 0xfd {
                return Err(non_canonical());
            }
            Ok(v)
        }
        0xfe => {
            let v = u64::from(reader.read_u32()?);
            if v < 0x1_0000 {
                return Err(non_canonical());
            }
            Ok(v)
        }
        0xff => {
            let v = reader.read_u64()?;
            if v < 0x1_0000_0000 {
                return Err(non_canonical());
            }
            Ok(v)
        }
        small => Ok(u64::from(small)),
    }
}

impl TransactionOutput {
    /// Token prefix followed by the locking script, as stored in the
    /// output's script field
    pub fn wrapped_script(&self) -> ByteString {
        match &self.token_data {
            Some(token) => {
                let mut out = vec![SPECIAL_TOKEN_PREFIX];
                token.encode(&mut out);
                out.extend_from_slice(&self.script_pubkey);
                out
            }
            None => self.script_pubkey.clone(),
        }
    }

    /// Split a wrapped script field into token data and locking script.
    ///
    /// A field whose token prefix does not parse is kept whole as the
    /// locking script, which then fails evaluation on the prefix opcode.
    pub fn from_wrapped(value: Amount, wrapped: ByteString) -> Self {
        if wrapped.first() == Some(&SPECIAL_TOKEN_PREFIX) {
            let mut reader = Reader::new(&wrapped[1..]);
            if let Ok(token) = TokenData::decode_payload(&mut reader) {
                let script = wrapped[1 + reader.position()..].to_vec();
                return TransactionOutput { value, script_pubkey: script, token_data: Some(token) };
            }
        }
        TransactionOutput { value, script_pubkey: wrapped, token_data: None }
    }
}

impl Encodable for TransactionOutput {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.put(&self.value.to_sat().to_le_bytes());
        match &self.token_data {
            Some(_) => write_var_bytes(sink, &self.wrapped_script()),
            None => write_var_bytes(sink, &self.script_pubkey),
        }
    }
}

impl Decodable for TransactionOutput {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let value = Amount::from_sat(reader.read_i64()?);
        let wrapped = reader.read_var_bytes()?;
        Ok(TransactionOutput::from_wrapped(value, wrapped))
    }
}

impl<T: Encodable> Encodable for Vec<T> {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        write_compact_size(sink, self.len() as u64);
        for item in self {
            item.encode(sink);
        }
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let len = reader.read_compact_size()? as usize;
        // cap the preallocation by what the input can possibly hold
        let mut items = Vec::with_capacity(len.min(reader.remaining()));
        for _ in 0..len {
            items.push(T::decode(reader)?);
        }
        Ok(items)
    }
}

impl Encodable for Transaction {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.put(&self.version.to_le_bytes());
        self.inputs.encode(sink);
        self.outputs.encode(sink);
        sink.put(&self.lock_time.to_le_bytes());
    }
}

impl Decodable for Transaction {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Transaction {
            version: reader.read_i32()?,
            inputs: Vec::decode(reader)?,
            outputs: Vec::decode(reader)?,
            lock_time: reader.read_u32()?,
        })
    }
}

impl Encodable for BlockHeader {
    fn encode<S: ByteSink>(&self, sink: &mut S) {
        sink.put(&self.version.to_le_bytes());
        sink.put(&self.prev_block_hash);
        sink.put(&self.merkle_root);
        sink.put(&self.timestamp.to_le_bytes());
        sink.put(&self.bits.to_le_bytes());
        sink.put(&self.nonce.to_le_bytes());
    }
}

impl Decodable for BlockHeader {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(BlockHeader {
            version: reader.read_i32()?,
            prev_block_hash: reader.read_hash()?,
            merkle_root: reader.read_hash()?,
            timestamp: reader.read_u32()?,
            bits: reader.read_u32()?,
            nonce: reader.read_u32()?,
        })
    }
}
