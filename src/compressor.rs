//! Compact storage encoding for outputs: special script templates, VARINT
//! lengths and compressed amounts

use secp256k1::PublicKey;

use crate::amount::{compress_amount, decompress_amount};
use crate::constants::MAX_SCRIPT_SIZE;
use crate::error::{ConsensusError, Result};
use crate::pubkey::is_fully_valid;
use crate::script::*;
use crate::serialize::{ByteSink, Reader};
use crate::types::TransactionOutput;

/// Number of special script ids (0x00..=0x05)
pub const SPECIAL_SCRIPTS: u64 = 6;

/// CompressScript: 𝕊 → 𝔹* ∪ {⊥}
///
/// | template | output |
/// |---|---|
/// | P2PKH | 0x00 ∥ key hash (20) |
/// | P2SH (20-byte) | 0x01 ∥ script hash (20) |
/// | P2PK compressed | 0x02/0x03 ∥ x (32) |
/// | P2PK uncompressed, valid point | 0x04 ∣ (y & 1) ∥ x (32) |
///
/// Any other script has no special form.
pub fn compress_script(script: &[u8]) -> Option<Vec<u8>> {
    if is_pay_to_pubkey_hash(script) {
        let mut out = Vec::with_capacity(21);
        out.push(0x00);
        out.extend_from_slice(&script[3..23]);
        return Some(out);
    }
    if is_pay_to_script_hash(script, crate::script_flags::ScriptFlags::NONE) {
        let mut out = Vec::with_capacity(21);
        out.push(0x01);
        out.extend_from_slice(&script[2..22]);
        return Some(out);
    }
    if script.len() == 35 && script[0] == 33 && script[34] == OP_CHECKSIG && (script[1] == 0x02 || script[1] == 0x03)
    {
        return Some(script[1..34].to_vec());
    }
    if script.len() == 67 && script[0] == 65 && script[66] == OP_CHECKSIG && script[1] == 0x04 {
        // invalid points cannot be rebuilt from x alone
        if !is_fully_valid(&script[1..66]) {
            return None;
        }
        let mut out = Vec::with_capacity(33);
        out.push(0x04 | (script[65] & 0x01));
        out.extend_from_slice(&script[2..34]);
        return Some(out);
    }
    None
}

/// Payload length following a special script id, 0 for non-special ids
pub fn special_script_size(id: u64) -> usize {
    match id {
        0 | 1 => 20,
        2..=5 => 32,
        _ => 0,
    }
}

/// DecompressScript: inverse of [`compress_script`] given the id and payload.
///
/// Returns `None` for unknown ids, a payload of the wrong size, or an
/// x coordinate that is not on the curve.
pub fn decompress_script(id: u64, payload: &[u8]) -> Option<Vec<u8>> {
    if special_script_size(id) == 0 || payload.len() != special_script_size(id) {
        return None;
    }
    match id {
        0x00 => {
            let mut script = vec![OP_DUP, OP_HASH160, 20];
            script.extend_from_slice(payload);
            script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
            Some(script)
        }
        0x01 => {
            let mut script = vec![OP_HASH160, 20];
            script.extend_from_slice(payload);
            script.push(OP_EQUAL);
            Some(script)
        }
        0x02 | 0x03 => {
            let mut script = vec![33, id as u8];
            script.extend_from_slice(payload);
            script.push(OP_CHECKSIG);
            Some(script)
        }
        _ => {
            let mut compressed = [0u8; 33];
            compressed[0] = id as u8 - 2;
            compressed[1..].copy_from_slice(payload);
            let key = PublicKey::from_slice(&compressed).ok()?;
            let mut script = vec![65];
            script.extend_from_slice(&key.serialize_uncompressed());
            script.push(OP_CHECKSIG);
            Some(script)
        }
    }
}

/// WriteVarInt: MSB base-128 with the "minus one" continuation offset, so
/// every value has exactly one encoding
pub fn write_varint<S: ByteSink>(sink: &mut S, value: u64) {
    let mut tmp = [0u8; 10];
    let mut len = 0;
    let mut n = value;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    for i in (0..=len).rev() {
        sink.put(&[tmp[i]]);
    }
}

pub fn read_varint(reader: &mut Reader<'_>) -> Result<u64> {
    let mut n: u64 = 0;
    loop {
        let byte = reader.read_u8()?;
        if n > (u64::MAX >> 7) {
            return Err(ConsensusError::Serialization("varint size too large".into()));
        }
        n = (n << 7) | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            return Ok(n);
        }
        if n == u64::MAX {
            return Err(ConsensusError::Serialization("varint size too large".into()));
        }
        n += 1;
    }
}

/// Script in compressed storage form: a special template, or
/// VARINT(len + 6) followed by the raw bytes
pub fn encode_compressed_script<S: ByteSink>(sink: &mut S, script: &[u8]) {
    if let Some(compressed) = compress_script(script) {
        sink.put(&compressed);
        return;
    }
    write_varint(sink, script.len() as u64 + SPECIAL_SCRIPTS);
    sink.put(script);
}

/// Oversized scripts are replaced by a lone OP_RETURN so they stay
/// unspendable without being stored
pub fn decode_compressed_script(reader: &mut Reader<'_>) -> Result<Vec<u8>> {
    let size = read_varint(reader)?;
    if size < SPECIAL_SCRIPTS {
        let payload = reader.read_bytes(special_script_size(size))?;
        return decompress_script(size, payload)
            .ok_or_else(|| ConsensusError::Serialization(format!("invalid special script {}", size)));
    }
    let size = usize::try_from(size - SPECIAL_SCRIPTS)
        .map_err(|_| ConsensusError::Serialization("script length overflow".into()))?;
    if size > MAX_SCRIPT_SIZE {
        reader.read_bytes(size)?;
        return Ok(vec![OP_RETURN]);
    }
    Ok(reader.read_bytes(size)?.to_vec())
}

/// Output in compressed storage form: VARINT(CompressAmount(value)) then the
/// compressed locking bytecode (token prefix included)
pub fn encode_compressed_output<S: ByteSink>(sink: &mut S, output: &TransactionOutput) -> Result<()> {
    let value = compress_amount(output.value)
        .ok_or_else(|| ConsensusError::InvalidAmount(format!("negative output value {}", output.value.to_sat())))?;
    write_varint(sink, value);
    encode_compressed_script(sink, &output.wrapped_script());
    Ok(())
}

pub fn decode_compressed_output(reader: &mut Reader<'_>) -> Result<TransactionOutput> {
    let value = decompress_amount(read_varint(reader)?);
    let wrapped = decode_compressed_script(reader)?;
    Ok(TransactionOutput::from_wrapped(value, wrapped))
}
