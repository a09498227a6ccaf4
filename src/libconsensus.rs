//! Standalone script verification over a serialized transaction, with a
//! fixed C ABI for callers outside Rust

use std::os::raw::{c_int, c_uint};

use tracing::debug;

use crate::amount::Amount;
use crate::checker::TransactionSignatureChecker;
use crate::context::ScriptExecutionContext;
use crate::interpreter;
use crate::script_flags::ScriptFlags;
use crate::serialize::{Decodable, Reader};
use crate::sighash::PrecomputedTransactionData;
use crate::types::{Transaction, TransactionOutput};

pub const API_VERSION: c_uint = 1;

pub const VERIFY_NONE: c_uint = 0;
pub const VERIFY_P2SH: c_uint = 1 << 0;
pub const VERIFY_DERSIG: c_uint = 1 << 2;
pub const VERIFY_CHECKLOCKTIMEVERIFY: c_uint = 1 << 9;
pub const VERIFY_CHECKSEQUENCEVERIFY: c_uint = 1 << 10;
/// Accepted only to be refused with [`ConsensusApiError::AmountRequired`]
pub const VERIFY_WITNESS_DEPRECATED: c_uint = 1 << 11;
pub const ENABLE_SIGHASH_FORKID: c_uint = 1 << 16;
pub const VERIFY_ALL: c_uint = VERIFY_P2SH | VERIFY_DERSIG | VERIFY_CHECKLOCKTIMEVERIFY | VERIFY_CHECKSEQUENCEVERIFY;

/// Error codes of the C interface
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusApiError {
    Ok = 0,
    TxIndex = 1,
    TxSizeMismatch = 2,
    TxDeserialize = 3,
    AmountRequired = 4,
    InvalidFlags = 5,
}

impl std::fmt::Display for ConsensusApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            ConsensusApiError::Ok => "no error",
            ConsensusApiError::TxIndex => "input index out of range",
            ConsensusApiError::TxSizeMismatch => "transaction size does not match the buffer",
            ConsensusApiError::TxDeserialize => "transaction could not be deserialized",
            ConsensusApiError::AmountRequired => "flags require the spent amount",
            ConsensusApiError::InvalidFlags => "unsupported verification flags",
        };
        f.write_str(text)
    }
}

impl std::error::Error for ConsensusApiError {}

fn flags_supported(flags: c_uint) -> bool {
    // FORKID is part of the interface for the amount-carrying entry point
    flags & !(VERIFY_ALL | ENABLE_SIGHASH_FORKID) == 0
}

/// Version of the C interface
pub fn version() -> c_uint {
    API_VERSION
}

/// VerifyScript over a serialized transaction: 𝕊 × ℤ × 𝔹* × ℕ × ℱ → {valid, invalid} ∪ 𝔼
///
/// 1. Flags outside the interface set are refused
/// 2. `tx_bytes` must decode to a transaction consuming the whole buffer
/// 3. `input_index` must name an input
/// 4. The input's scriptSig is verified against `script_pubkey` in a
///    context that knows only the spent coin (`amount`, no token data)
///
/// `Ok(false)` is a well-formed request whose script fails.
pub fn verify_script_with_amount(
    script_pubkey: &[u8],
    amount: i64,
    tx_bytes: &[u8],
    input_index: usize,
    flags: c_uint,
) -> Result<bool, ConsensusApiError> {
    if !flags_supported(flags) {
        return Err(ConsensusApiError::InvalidFlags);
    }

    let mut reader = Reader::new(tx_bytes);
    let tx = match Transaction::decode(&mut reader) {
        Ok(tx) => tx,
        Err(error) => {
            debug!(%error, len = tx_bytes.len(), "failed to deserialize transaction");
            return Err(ConsensusApiError::TxDeserialize);
        }
    };
    if input_index >= tx.inputs.len() {
        return Err(ConsensusApiError::TxIndex);
    }
    if reader.position() != tx_bytes.len() {
        return Err(ConsensusApiError::TxSizeMismatch);
    }

    let coin = TransactionOutput::new(Amount::from_sat(amount), script_pubkey.to_vec());
    let context =
        ScriptExecutionContext::new_limited(&tx, input_index, &coin).map_err(|_| ConsensusApiError::TxIndex)?;
    let precomputed = PrecomputedTransactionData::new(&context);
    let checker = TransactionSignatureChecker::new(context, &precomputed);

    let result = interpreter::verify_script(
        &tx.inputs[input_index].script_sig,
        script_pubkey,
        ScriptFlags::from_bits_retain(flags),
        &checker,
    );
    Ok(result.is_ok())
}

/// [`verify_script_with_amount`] for spends that do not commit to the
/// amount; flags whose digests need it are refused
pub fn verify_script(
    script_pubkey: &[u8],
    tx_bytes: &[u8],
    input_index: usize,
    flags: c_uint,
) -> Result<bool, ConsensusApiError> {
    if flags & (ENABLE_SIGHASH_FORKID | VERIFY_WITNESS_DEPRECATED) != 0 {
        return Err(ConsensusApiError::AmountRequired);
    }
    verify_script_with_amount(script_pubkey, 0, tx_bytes, input_index, flags)
}

/// View a caller buffer; a null pointer is only acceptable with length 0
///
/// # Safety
///
/// A non-null `data` must be valid for reads of `len` bytes.
unsafe fn raw_slice<'a>(data: *const u8, len: c_uint) -> Option<&'a [u8]> {
    if len == 0 {
        Some(&[])
    } else if data.is_null() {
        None
    } else {
        Some(std::slice::from_raw_parts(data, len as usize))
    }
}

/// # Safety
///
/// `err` must be null or valid for a write.
unsafe fn report(result: Result<bool, ConsensusApiError>, err: *mut ConsensusApiError) -> c_int {
    let (valid, code) = match result {
        Ok(valid) => (valid, ConsensusApiError::Ok),
        Err(code) => (false, code),
    };
    if !err.is_null() {
        *err = code;
    }
    c_int::from(valid)
}

/// Returns 1 if input `n_in` of the transaction at `tx_to` spends
/// `script_pubkey` under `flags`, 0 otherwise; `err` (if not null) receives
/// the error code.
///
/// # Safety
///
/// Non-null buffers must be readable for their stated lengths and `err` must
/// be null or writable.
#[no_mangle]
pub unsafe extern "C" fn cashconsensus_verify_script_with_amount(
    script_pubkey: *const u8,
    script_pubkey_len: c_uint,
    amount: i64,
    tx_to: *const u8,
    tx_to_len: c_uint,
    n_in: c_uint,
    flags: c_uint,
    err: *mut ConsensusApiError,
) -> c_int {
    let result = match (raw_slice(script_pubkey, script_pubkey_len), raw_slice(tx_to, tx_to_len)) {
        (Some(spk), Some(tx)) => verify_script_with_amount(spk, amount, tx, n_in as usize, flags),
        _ => Err(ConsensusApiError::TxDeserialize),
    };
    report(result, err)
}

/// # Safety
///
/// Same contract as [`cashconsensus_verify_script_with_amount`].
#[no_mangle]
pub unsafe extern "C" fn cashconsensus_verify_script(
    script_pubkey: *const u8,
    script_pubkey_len: c_uint,
    tx_to: *const u8,
    tx_to_len: c_uint,
    n_in: c_uint,
    flags: c_uint,
    err: *mut ConsensusApiError,
) -> c_int {
    let result = match (raw_slice(script_pubkey, script_pubkey_len), raw_slice(tx_to, tx_to_len)) {
        (Some(spk), Some(tx)) => verify_script(spk, tx, n_in as usize, flags),
        _ => Err(ConsensusApiError::TxDeserialize),
    };
    report(result, err)
}

#[no_mangle]
pub extern "C" fn cashconsensus_version() -> c_uint {
    version()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash160;
    use crate::key::Key;
    use crate::script::*;
    use crate::serialize::Encodable;
    use crate::sighash::{signature_hash, SigHashType};
    use crate::types::{OutPoint, TransactionInput};

    fn spending_tx(script_sig: Vec<u8>) -> Transaction {
        Transaction {
            version: 2,
            inputs: vec![TransactionInput { prevout: OutPoint::new([3u8; 32], 1), script_sig, sequence: 0xffff_ffff }],
            outputs: vec![TransactionOutput::new(Amount::from_sat(9_000), vec![OP_1])],
            lock_time: 0,
        }
    }

    fn serialize(tx: &Transaction) -> Vec<u8> {
        let mut bytes = Vec::new();
        tx.encode(&mut bytes);
        bytes
    }

    /// P2PKH spend signed with `hash_type` under `flags`
    fn signed_p2pkh(amount: i64, hash_type: SigHashType, flags: ScriptFlags) -> (Vec<u8>, Vec<u8>) {
        let key = Key::from_slice(&[0x21; 32], true).unwrap();
        let pubkey = key.public_key();
        let script_pubkey = p2pkh_script(&hash160(&pubkey));
        let mut tx = spending_tx(Vec::new());
        let coin = TransactionOutput::new(Amount::from_sat(amount), script_pubkey.clone());
        let digest = {
            let context = ScriptExecutionContext::new_limited(&tx, 0, &coin).unwrap();
            signature_hash(&script_pubkey, &context, hash_type, flags, None)
        };
        let mut sig = key.sign_ecdsa(&digest).unwrap();
        sig.push(hash_type.raw() as u8);
        tx.inputs[0].script_sig = ScriptBuilder::new().push_slice(&sig).push_slice(&pubkey).into_bytes();
        (script_pubkey, serialize(&tx))
    }

    #[test]
    fn test_version() {
        assert_eq!(version(), 1);
        assert_eq!(cashconsensus_version(), 1);
    }

    #[test]
    fn test_trivial_spend() {
        let tx = serialize(&spending_tx(vec![OP_1]));
        assert_eq!(verify_script(&[OP_1], &tx, 0, VERIFY_ALL), Ok(true));
        assert_eq!(verify_script(&[OP_0], &tx, 0, VERIFY_ALL), Ok(false));
        assert_eq!(verify_script(&[OP_EQUAL], &tx, 0, VERIFY_NONE), Ok(false));
    }

    #[test]
    fn test_request_errors() {
        let tx = serialize(&spending_tx(vec![OP_1]));
        assert_eq!(verify_script(&[OP_1], &tx, 1, VERIFY_ALL), Err(ConsensusApiError::TxIndex));

        let mut padded = tx.clone();
        padded.push(0);
        assert_eq!(verify_script(&[OP_1], &padded, 0, VERIFY_ALL), Err(ConsensusApiError::TxSizeMismatch));

        assert_eq!(verify_script(&[OP_1], &tx[..tx.len() - 1], 0, VERIFY_ALL), Err(ConsensusApiError::TxDeserialize));
        assert_eq!(verify_script(&[OP_1], &[], 0, VERIFY_ALL), Err(ConsensusApiError::TxDeserialize));

        assert_eq!(verify_script(&[OP_1], &tx, 0, 1 << 3), Err(ConsensusApiError::InvalidFlags));
        assert_eq!(verify_script(&[OP_1], &tx, 0, ENABLE_SIGHASH_FORKID), Err(ConsensusApiError::AmountRequired));
        assert_eq!(verify_script(&[OP_1], &tx, 0, VERIFY_WITNESS_DEPRECATED), Err(ConsensusApiError::AmountRequired));
        assert_eq!(
            verify_script_with_amount(&[OP_1], 0, &tx, 0, VERIFY_WITNESS_DEPRECATED),
            Err(ConsensusApiError::InvalidFlags)
        );
        // FORKID is accepted once the amount is supplied
        assert_eq!(verify_script_with_amount(&[OP_1], 0, &tx, 0, VERIFY_ALL | ENABLE_SIGHASH_FORKID), Ok(true));
    }

    #[test]
    fn test_legacy_signature() {
        let (script_pubkey, tx) = signed_p2pkh(0, SigHashType::from_raw(SigHashType::ALL), ScriptFlags::NONE);
        assert_eq!(verify_script(&script_pubkey, &tx, 0, VERIFY_ALL), Ok(true));
    }

    #[test]
    fn test_forkid_signature_commits_to_amount() {
        let flags = ScriptFlags::ENABLE_SIGHASH_FORKID;
        let (script_pubkey, tx) = signed_p2pkh(10_000, SigHashType::all_forkid(), flags);
        let api_flags = VERIFY_ALL | ENABLE_SIGHASH_FORKID;
        assert_eq!(verify_script_with_amount(&script_pubkey, 10_000, &tx, 0, api_flags), Ok(true));
        assert_eq!(verify_script_with_amount(&script_pubkey, 10_001, &tx, 0, api_flags), Ok(false));
        // without FORKID enabled the fork id hash type is not strictly checked,
        // but the legacy digest no longer matches
        assert_eq!(verify_script_with_amount(&script_pubkey, 10_000, &tx, 0, VERIFY_ALL), Ok(false));
    }

    #[test]
    fn test_c_interface() {
        let tx = serialize(&spending_tx(vec![OP_1]));
        let spk = [OP_1];
        let mut err = ConsensusApiError::InvalidFlags;
        let valid = unsafe {
            cashconsensus_verify_script(spk.as_ptr(), 1, tx.as_ptr(), tx.len() as c_uint, 0, VERIFY_ALL, &mut err)
        };
        assert_eq!(valid, 1);
        assert_eq!(err, ConsensusApiError::Ok);

        let valid = unsafe {
            cashconsensus_verify_script_with_amount(
                spk.as_ptr(),
                1,
                0,
                tx.as_ptr(),
                tx.len() as c_uint,
                3,
                VERIFY_ALL,
                &mut err,
            )
        };
        assert_eq!(valid, 0);
        assert_eq!(err, ConsensusApiError::TxIndex);

        let valid = unsafe {
            cashconsensus_verify_script(spk.as_ptr(), 1, std::ptr::null(), 10, 0, VERIFY_ALL, std::ptr::null_mut())
        };
        assert_eq!(valid, 0);
    }

    #[test]
    fn test_error_codes_fixed() {
        assert_eq!(ConsensusApiError::Ok as i32, 0);
        assert_eq!(ConsensusApiError::TxIndex as i32, 1);
        assert_eq!(ConsensusApiError::TxSizeMismatch as i32, 2);
        assert_eq!(ConsensusApiError::TxDeserialize as i32, 3);
        assert_eq!(ConsensusApiError::AmountRequired as i32, 4);
        assert_eq!(ConsensusApiError::InvalidFlags as i32, 5);
    }
}
