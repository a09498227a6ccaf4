//! Signature and public key encoding rules
//!
//! Every check returns `Ok(())` for an acceptable encoding or the specific
//! [`ScriptError`] describing why it is not. Empty signatures always pass:
//! they are the compact way to supply a failing signature.

use crate::pubkey::{check_low_s, COMPRESSED_PUBLIC_KEY_SIZE, PUBLIC_KEY_SIZE, SCHNORR_SIGNATURE_SIZE};
use crate::script_error::ScriptError;
use crate::script_flags::ScriptFlags;
use crate::sighash::get_hash_type;

type CheckResult = Result<(), ScriptError>;

/// Strict DER: 0x30 [len] 0x02 [lenR] [R] 0x02 [lenS] [S], with R and S
/// positive and minimally encoded. Consensus-critical since BIP66.
pub fn is_valid_der_encoding(sig: &[u8]) -> bool {
    // Minimum and maximum size constraints.
    if sig.len() < 8 || sig.len() > 72 {
        return false;
    }

    // A signature is of type 0x30 (compound) covering the whole buffer.
    if sig[0] != 0x30 || sig[1] as usize != sig.len() - 2 {
        return false;
    }

    // R: integer, non-empty, non-negative, fits in the signature
    if sig[2] != 0x02 {
        return false;
    }
    let len_r = sig[3] as usize;
    if len_r == 0 || sig[4] & 0x80 != 0 || len_r > sig.len() - 7 {
        return false;
    }
    // Null bytes at the start of R only when the next byte has its top bit set
    if len_r > 1 && sig[4] == 0x00 && sig[5] & 0x80 == 0 {
        return false;
    }

    // S starts after R
    let start_s = len_r + 4;
    if sig[start_s] != 0x02 {
        return false;
    }
    let len_s = sig[start_s + 1] as usize;
    if len_s == 0 || sig[start_s + 2] & 0x80 != 0 {
        return false;
    }
    if start_s + len_s + 2 != sig.len() {
        return false;
    }
    if len_s > 1 && sig[start_s + 2] == 0x00 && sig[start_s + 3] & 0x80 == 0 {
        return false;
    }

    true
}

fn is_schnorr_sig(sig: &[u8]) -> bool {
    sig.len() == SCHNORR_SIGNATURE_SIZE
}

fn check_raw_ecdsa_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    if is_schnorr_sig(sig) {
        // 64-byte signatures are Schnorr, forbidden where only ECDSA is allowed
        return Err(ScriptError::SigBadLength);
    }
    if flags.intersects(ScriptFlags::DERSIG | ScriptFlags::LOW_S | ScriptFlags::STRICTENC)
        && !is_valid_der_encoding(sig)
    {
        return Err(ScriptError::SigDer);
    }
    if flags.contains(ScriptFlags::LOW_S) && !check_low_s(sig) {
        return Err(ScriptError::SigHighS);
    }
    Ok(())
}

fn check_raw_schnorr_encoding(sig: &[u8], _flags: ScriptFlags) -> CheckResult {
    if is_schnorr_sig(sig) {
        Ok(())
    } else {
        Err(ScriptError::SigNonSchnorr)
    }
}

fn check_raw_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    if is_schnorr_sig(sig) {
        return Ok(());
    }
    check_raw_ecdsa_encoding(sig, flags)
}

/// Hash type rules, enforced under STRICTENC
fn check_sighash_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    if !flags.contains(ScriptFlags::STRICTENC) {
        return Ok(());
    }

    let hash_type = get_hash_type(sig);
    if !hash_type.is_defined() {
        return Err(ScriptError::SigHashType);
    }

    let uses_fork = hash_type.has_fork_id();
    let fork_enabled = flags.contains(ScriptFlags::ENABLE_SIGHASH_FORKID);
    if !fork_enabled && uses_fork {
        return Err(ScriptError::IllegalForkId);
    }
    if fork_enabled && !uses_fork {
        return Err(ScriptError::MustUseForkId);
    }

    // SIGHASH_UTXOS needs tokens and forkid, and excludes ANYONECANPAY
    if hash_type.has_utxos()
        && (!flags.contains(ScriptFlags::ENABLE_TOKENS) || !uses_fork || hash_type.has_anyone_can_pay())
    {
        return Err(ScriptError::SigHashType);
    }

    Ok(())
}

fn check_transaction_encoding_with(
    sig: &[u8],
    flags: ScriptFlags,
    raw_check: fn(&[u8], ScriptFlags) -> CheckResult,
) -> CheckResult {
    let Some((_, body)) = sig.split_last() else {
        return Ok(());
    };
    raw_check(body, flags)?;
    check_sighash_encoding(sig, flags)
}

/// Signature consumed by OP_CHECKDATASIG: no hash type byte
pub fn check_data_signature_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    if sig.is_empty() {
        return Ok(());
    }
    check_raw_encoding(sig, flags)
}

/// Transaction signature, ECDSA or Schnorr, followed by a hash type byte
pub fn check_transaction_signature_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    check_transaction_encoding_with(sig, flags, check_raw_encoding)
}

/// Transaction signature that must be ECDSA (legacy multisig)
pub fn check_transaction_ecdsa_signature_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    check_transaction_encoding_with(sig, flags, check_raw_ecdsa_encoding)
}

/// Transaction signature that must be Schnorr (bitfield multisig)
pub fn check_transaction_schnorr_signature_encoding(sig: &[u8], flags: ScriptFlags) -> CheckResult {
    check_transaction_encoding_with(sig, flags, check_raw_schnorr_encoding)
}

fn is_compressed_or_uncompressed_pubkey(pubkey: &[u8]) -> bool {
    match pubkey.len() {
        COMPRESSED_PUBLIC_KEY_SIZE => pubkey[0] == 0x02 || pubkey[0] == 0x03,
        PUBLIC_KEY_SIZE => pubkey[0] == 0x04,
        _ => false,
    }
}

/// Under STRICTENC a key must be 33 bytes (02/03) or 65 bytes (04)
pub fn check_pubkey_encoding(pubkey: &[u8], flags: ScriptFlags) -> CheckResult {
    if flags.contains(ScriptFlags::STRICTENC) && !is_compressed_or_uncompressed_pubkey(pubkey) {
        return Err(ScriptError::PubkeyType);
    }
    Ok(())
}
