//! Signature hashing
//!
//! Two digests exist: the legacy one, which serializes a modified copy of
//! the transaction, and the replay-protected (FORKID) one, which commits to
//! precomputed hashes of prevouts, sequences and outputs.

use serde::{Deserialize, Serialize};

use crate::context::ScriptExecutionContext;
use crate::hash::HashWriter;
use crate::script::{instructions, OP_CODESEPARATOR};
use crate::script_flags::ScriptFlags;
use crate::serialize::{write_compact_size, write_var_bytes, ByteSink, Encodable, SPECIAL_TOKEN_PREFIX};
use crate::types::*;

/// Signature hash type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigHashType(u32);

impl SigHashType {
    pub const ALL: u32 = 0x01;
    pub const NONE: u32 = 0x02;
    pub const SINGLE: u32 = 0x03;
    pub const UTXOS: u32 = 0x20;
    pub const FORKID: u32 = 0x40;
    pub const ANYONECANPAY: u32 = 0x80;

    const BASE_MASK: u32 = 0x1f;

    pub const fn from_raw(raw: u32) -> Self {
        SigHashType(raw)
    }

    /// SIGHASH_ALL | SIGHASH_FORKID
    pub const fn all_forkid() -> Self {
        SigHashType(Self::ALL | Self::FORKID)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn base_type(self) -> u32 {
        self.0 & Self::BASE_MASK
    }

    /// Is the base type one of ALL, NONE, SINGLE?
    pub const fn is_defined(self) -> bool {
        let base = self.0 & !(Self::FORKID | Self::ANYONECANPAY | Self::UTXOS);
        base >= Self::ALL && base <= Self::SINGLE
    }

    pub const fn has_fork_id(self) -> bool {
        self.0 & Self::FORKID != 0
    }

    pub const fn has_anyone_can_pay(self) -> bool {
        self.0 & Self::ANYONECANPAY != 0
    }

    pub const fn has_utxos(self) -> bool {
        self.0 & Self::UTXOS != 0
    }

    pub const fn with_fork_id(self, fork_id: bool) -> Self {
        if fork_id {
            SigHashType(self.0 | Self::FORKID)
        } else {
            SigHashType(self.0 & !Self::FORKID)
        }
    }

    pub const fn with_anyone_can_pay(self, anyone_can_pay: bool) -> Self {
        if anyone_can_pay {
            SigHashType(self.0 | Self::ANYONECANPAY)
        } else {
            SigHashType(self.0 & !Self::ANYONECANPAY)
        }
    }

    pub const fn with_base_type(self, base: u32) -> Self {
        SigHashType((self.0 & !Self::BASE_MASK) | (base & Self::BASE_MASK))
    }
}

impl Default for SigHashType {
    fn default() -> Self {
        SigHashType(Self::ALL)
    }
}

/// Hash type carried in the last byte of a transaction signature
pub fn get_hash_type(sig: &[u8]) -> SigHashType {
    SigHashType(sig.last().map_or(0, |&b| u32::from(b)))
}

/// Digest returned for legacy hashing of impossible requests
pub const SIGHASH_ONE: Hash = {
    let mut one = [0u8; 32];
    one[0] = 1;
    one
};

/// Per-transaction hashes shared by every input's FORKID digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecomputedTransactionData {
    pub hash_prevouts: Hash,
    pub hash_sequence: Hash,
    pub hash_outputs: Hash,
    /// Hash of all spent outputs; absent for a limited context
    pub hash_utxos: Option<Hash>,
}

impl PrecomputedTransactionData {
    pub fn new(context: &ScriptExecutionContext<'_>) -> Self {
        let tx = context.tx();
        PrecomputedTransactionData {
            hash_prevouts: prevouts_hash(tx),
            hash_sequence: sequence_hash(tx),
            hash_outputs: outputs_hash(tx),
            hash_utxos: context.all_coins().map(utxos_hash),
        }
    }
}

fn prevouts_hash(tx: &Transaction) -> Hash {
    let mut writer = HashWriter::new();
    for input in &tx.inputs {
        input.prevout.encode(&mut writer);
    }
    writer.finalize_double()
}

fn sequence_hash(tx: &Transaction) -> Hash {
    let mut writer = HashWriter::new();
    for input in &tx.inputs {
        writer.put(&input.sequence.to_le_bytes());
    }
    writer.finalize_double()
}

fn outputs_hash(tx: &Transaction) -> Hash {
    let mut writer = HashWriter::new();
    for output in &tx.outputs {
        output.encode(&mut writer);
    }
    writer.finalize_double()
}

fn utxos_hash(coins: &[TransactionOutput]) -> Hash {
    let mut writer = HashWriter::new();
    for coin in coins {
        coin.encode(&mut writer);
    }
    writer.finalize_double()
}

/// SignatureHash: 𝕊 × 𝒞𝒯𝒳 × 𝒮ℋ × ℱ → ℍ
///
/// 1. If the hash type has FORKID and FORKID is enabled: replay-protected
///    digest over precomputed component hashes
/// 2. Otherwise: legacy digest of a modified transaction copy
///
/// `SIGHASH_UTXOS` commits to every spent output, so it needs a context
/// with sibling information; in a limited context the UTXOS component is
/// unavailable and the caller must reject such signatures beforehand.
pub fn signature_hash(
    script_code: &[u8],
    context: &ScriptExecutionContext<'_>,
    hash_type: SigHashType,
    flags: ScriptFlags,
    cache: Option<&PrecomputedTransactionData>,
) -> Hash {
    if hash_type.has_fork_id() && flags.contains(ScriptFlags::ENABLE_SIGHASH_FORKID) {
        forkid_signature_hash(script_code, context, hash_type, flags, cache)
    } else {
        legacy_signature_hash(script_code, context.tx(), context.input_index(), hash_type)
    }
}

fn forkid_signature_hash(
    script_code: &[u8],
    context: &ScriptExecutionContext<'_>,
    hash_type: SigHashType,
    flags: ScriptFlags,
    cache: Option<&PrecomputedTransactionData>,
) -> Hash {
    let tx = context.tx();
    let index = context.input_index();
    let input = &tx.inputs[index];
    let base = hash_type.base_type();
    let zero = [0u8; 32];

    let hash_prevouts = if hash_type.has_anyone_can_pay() {
        zero
    } else {
        cache.map_or_else(|| prevouts_hash(tx), |c| c.hash_prevouts)
    };

    let hash_utxos = if hash_type.has_utxos() && flags.contains(ScriptFlags::ENABLE_TOKENS) {
        cache
            .and_then(|c| c.hash_utxos)
            .or_else(|| context.all_coins().map(utxos_hash))
    } else {
        None
    };

    let hash_sequence = if !hash_type.has_anyone_can_pay()
        && base != SigHashType::SINGLE
        && base != SigHashType::NONE
    {
        cache.map_or_else(|| sequence_hash(tx), |c| c.hash_sequence)
    } else {
        zero
    };

    let hash_outputs = if base != SigHashType::SINGLE && base != SigHashType::NONE {
        cache.map_or_else(|| outputs_hash(tx), |c| c.hash_outputs)
    } else if base == SigHashType::SINGLE && index < tx.outputs.len() {
        let mut writer = HashWriter::new();
        tx.outputs[index].encode(&mut writer);
        writer.finalize_double()
    } else {
        zero
    };

    let mut writer = HashWriter::new();
    writer.put(&tx.version.to_le_bytes());
    writer.put(&hash_prevouts);
    if let Some(hash_utxos) = hash_utxos {
        writer.put(&hash_utxos);
    }
    writer.put(&hash_sequence);
    input.prevout.encode(&mut writer);
    if flags.contains(ScriptFlags::ENABLE_TOKENS) {
        if let Some(token) = context.coin_token_data() {
            writer.put(&[SPECIAL_TOKEN_PREFIX]);
            token.encode(&mut writer);
        }
    }
    write_var_bytes(&mut writer, script_code);
    writer.put(&context.coin_amount().to_sat().to_le_bytes());
    writer.put(&input.sequence.to_le_bytes());
    writer.put(&hash_outputs);
    writer.put(&tx.lock_time.to_le_bytes());
    writer.put(&hash_type.raw().to_le_bytes());
    writer.finalize_double()
}

/// Legacy digest, streamed without materializing the modified copy.
///
/// 1. Index out of range, or SINGLE without a matching output: ONE
/// 2. ANYONECANPAY keeps only the signed input
/// 3. Other inputs get empty scripts; NONE and SINGLE zero their sequences
/// 4. NONE drops outputs; SINGLE keeps outputs up to the index, nulling
///    the earlier ones
/// 5. The script code has its OP_CODESEPARATORs removed
pub fn legacy_signature_hash(
    script_code: &[u8],
    tx: &Transaction,
    index: usize,
    hash_type: SigHashType,
) -> Hash {
    if index >= tx.inputs.len() {
        return SIGHASH_ONE;
    }
    let base = hash_type.base_type();
    if base == SigHashType::SINGLE && index >= tx.outputs.len() {
        return SIGHASH_ONE;
    }

    let anyone_can_pay = hash_type.has_anyone_can_pay();
    let hash_none = base == SigHashType::NONE;
    let hash_single = base == SigHashType::SINGLE;

    let mut writer = HashWriter::new();
    writer.put(&tx.version.to_le_bytes());

    let input_count = if anyone_can_pay { 1 } else { tx.inputs.len() };
    write_compact_size(&mut writer, input_count as u64);
    for position in 0..input_count {
        let input_index = if anyone_can_pay { index } else { position };
        let input = &tx.inputs[input_index];
        input.prevout.encode(&mut writer);
        if input_index == index {
            serialize_script_code(&mut writer, script_code);
        } else {
            write_compact_size(&mut writer, 0);
        }
        if input_index != index && (hash_single || hash_none) {
            writer.put(&0u32.to_le_bytes());
        } else {
            writer.put(&input.sequence.to_le_bytes());
        }
    }

    let output_count = if hash_none {
        0
    } else if hash_single {
        index + 1
    } else {
        tx.outputs.len()
    };
    write_compact_size(&mut writer, output_count as u64);
    for position in 0..output_count {
        if hash_single && position != index {
            TransactionOutput::null().encode(&mut writer);
        } else {
            tx.outputs[position].encode(&mut writer);
        }
    }

    writer.put(&tx.lock_time.to_le_bytes());
    writer.put(&hash_type.raw().to_le_bytes());
    writer.finalize_double()
}

/// Script code with every OP_CODESEPARATOR removed, length-prefixed
fn serialize_script_code<S: ByteSink>(sink: &mut S, script_code: &[u8]) {
    let mut stripped = Vec::with_capacity(script_code.len());
    let mut start = 0;
    for ins in instructions(script_code) {
        let Ok(ins) = ins else { break };
        if ins.opcode == OP_CODESEPARATOR {
            stripped.extend_from_slice(&script_code[start..ins.end - 1]);
            start = ins.end;
        }
    }
    stripped.extend_from_slice(&script_code[start..]);
    write_var_bytes(sink, &stripped);
}
