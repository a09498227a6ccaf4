//! Public keys and signature verification over secp256k1
//!
//! ECDSA signatures are DER encoded; Schnorr signatures are the 64-byte
//! `r ∥ s` form where `R` is chosen with a quadratic-residue y coordinate.

use std::sync::OnceLock;

use secp256k1::ecdsa::Signature;
use secp256k1::{All, Message, PublicKey, Scalar, Secp256k1, SecretKey};

use crate::hash::sha256;
use crate::types::Hash;
use crate::uint::U256;

pub const COMPRESSED_PUBLIC_KEY_SIZE: usize = 33;
pub const PUBLIC_KEY_SIZE: usize = 65;
pub const SCHNORR_SIGNATURE_SIZE: usize = 64;

/// Field prime p = 2^256 - 2^32 - 977
pub(crate) const FIELD_PRIME: U256 = U256([
    0xFFFF_FFFE_FFFF_FC2F,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// Group order n
pub(crate) const CURVE_ORDER: U256 = U256([
    0xBFD2_5E8C_D036_4141,
    0xBAAE_DCE6_AF48_A03B,
    0xFFFF_FFFF_FFFF_FFFE,
    0xFFFF_FFFF_FFFF_FFFF,
]);

/// Process-wide verification context
pub(crate) fn secp() -> &'static Secp256k1<All> {
    static SECP: OnceLock<Secp256k1<All>> = OnceLock::new();
    SECP.get_or_init(Secp256k1::new)
}

/// Verify a signature without its hashtype byte: 64 bytes is Schnorr,
/// anything else is DER-encoded ECDSA
pub fn verify_signature(sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
    if sig.len() == SCHNORR_SIGNATURE_SIZE {
        verify_schnorr(sig, pubkey, sighash)
    } else {
        verify_ecdsa(sig, pubkey, sighash)
    }
}

/// ECDSA verification with lax DER parsing.
///
/// The signature is normalized to low S first; whether high S is acceptable
/// is a script-flag decision made before verification.
pub fn verify_ecdsa(sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
    let Ok(key) = PublicKey::from_slice(pubkey) else {
        return false;
    };
    let Ok(mut signature) = Signature::from_der_lax(sig) else {
        return false;
    };
    signature.normalize_s();
    let Ok(message) = Message::from_digest_slice(sighash) else {
        return false;
    };
    secp().verify_ecdsa(&message, &signature, &key).is_ok()
}

/// Schnorr verification: 𝒮 × 𝒫 × ℍ → {true, false}
///
/// For signature (r, s), key P and message m:
/// 1. r < p and s < n
/// 2. e = SHA256(r ∥ compressed(P) ∥ m) mod n
/// 3. R = sG - eP, R ≠ ∞
/// 4. jacobi(R.y) = 1 and R.x = r
pub fn verify_schnorr(sig: &[u8], pubkey: &[u8], sighash: &Hash) -> bool {
    if sig.len() != SCHNORR_SIGNATURE_SIZE {
        return false;
    }
    let Ok(key) = PublicKey::from_slice(pubkey) else {
        return false;
    };

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&sig[..32]);
    s.copy_from_slice(&sig[32..]);
    if U256::from_be_bytes(&r) >= FIELD_PRIME || U256::from_be_bytes(&s) >= CURVE_ORDER {
        return false;
    }

    let e = schnorr_challenge(&r, &key, sighash);
    let secp = secp();

    // Either term is None when it is the point at infinity.
    let s_g = SecretKey::from_slice(&s)
        .ok()
        .map(|k| PublicKey::from_secret_key(secp, &k));
    let neg_e_p = Scalar::from_be_bytes(e)
        .ok()
        .and_then(|e| key.negate(secp).mul_tweak(secp, &e).ok());

    let point = match (s_g, neg_e_p) {
        (Some(a), Some(b)) => match a.combine(&b) {
            Ok(point) => point,
            Err(_) => return false,
        },
        (Some(a), None) | (None, Some(a)) => a,
        (None, None) => return false,
    };

    let serialized = point.serialize_uncompressed();
    let mut y = [0u8; 32];
    y.copy_from_slice(&serialized[33..65]);
    serialized[1..33] == r && jacobi(&U256::from_be_bytes(&y), &FIELD_PRIME) == 1
}

/// e = SHA256(r ∥ compressed(P) ∥ m) reduced mod n
pub(crate) fn schnorr_challenge(r: &[u8; 32], key: &PublicKey, message: &Hash) -> [u8; 32] {
    let mut preimage = Vec::with_capacity(32 + COMPRESSED_PUBLIC_KEY_SIZE + 32);
    preimage.extend_from_slice(r);
    preimage.extend_from_slice(&key.serialize());
    preimage.extend_from_slice(message);
    let mut e = U256::from_be_bytes(&sha256(&preimage));
    // 2^256 < 2n, one subtraction reduces
    if e >= CURVE_ORDER {
        e = e - CURVE_ORDER;
    }
    e.to_be_bytes()
}

/// Jacobi symbol (value | modulus) for odd modulus, binary algorithm
pub(crate) fn jacobi(value: &U256, modulus: &U256) -> i32 {
    let Some((_, mut a)) = value.div_rem(modulus) else {
        return 0;
    };
    let mut n = *modulus;
    let mut t = 1;

    while !a.is_zero() {
        while a.low_u64() & 1 == 0 {
            a = a.shr(1);
            if matches!(n.low_u64() & 7, 3 | 5) {
                t = -t;
            }
        }
        if a < n {
            std::mem::swap(&mut a, &mut n);
            if a.low_u64() & 3 == 3 && n.low_u64() & 3 == 3 {
                t = -t;
            }
        }
        a = a - n;
    }

    if n == U256::ONE {
        t
    } else {
        0
    }
}

/// CheckLowS: does the DER signature already carry the low S value?
pub fn check_low_s(sig: &[u8]) -> bool {
    let Ok(signature) = Signature::from_der_lax(sig) else {
        return false;
    };
    let mut normalized = signature;
    normalized.normalize_s();
    normalized.serialize_compact() == signature.serialize_compact()
}

/// Can the bytes be parsed as a point on the curve?
pub fn is_fully_valid(pubkey: &[u8]) -> bool {
    PublicKey::from_slice(pubkey).is_ok()
}
