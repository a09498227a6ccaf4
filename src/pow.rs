//! Proof of work: compact targets, block proof and chain work

use serde::{Deserialize, Serialize};

use crate::types::{BlockHeader, Hash};
use crate::uint::U256;

/// Proof-of-work parameters of a network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowParams {
    /// Easiest admissible target
    pub pow_limit: U256,
    /// Target seconds between blocks
    pub target_spacing: i64,
}

impl PowParams {
    pub fn mainnet() -> Self {
        PowParams {
            pow_limit: U256([u64::MAX, u64::MAX, u64::MAX, 0x0000_0000_ffff_ffff]),
            target_spacing: 10 * 60,
        }
    }

    pub fn regtest() -> Self {
        PowParams {
            pow_limit: U256([u64::MAX, u64::MAX, u64::MAX, 0x7fff_ffff_ffff_ffff]),
            target_spacing: 10 * 60,
        }
    }
}

impl Default for PowParams {
    fn default() -> Self {
        PowParams::mainnet()
    }
}

/// A decoded compact target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactTarget {
    pub target: U256,
    /// Sign bit set on a non-zero mantissa
    pub negative: bool,
    /// The value does not fit in 256 bits
    pub overflow: bool,
}

/// SetCompact: ℕ₃₂ → U256 × {neg} × {overflow}
///
/// bits = size (8 bits) ∥ sign (1 bit) ∥ mantissa (23 bits), value is
/// mantissa · 256^(size − 3).
pub fn set_compact(compact: u32) -> CompactTarget {
    let size = compact >> 24;
    let mut word = compact & 0x007f_ffff;
    let target = if size <= 3 {
        word >>= 8 * (3 - size);
        U256::from_u64(u64::from(word))
    } else {
        U256::from_u64(u64::from(word)).shl(8 * (size - 3))
    };
    CompactTarget {
        target,
        negative: word != 0 && compact & 0x0080_0000 != 0,
        overflow: word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)),
    }
}

/// GetCompact: U256 × {neg} → ℕ₃₂, the shortest compact form of `value`
pub fn get_compact(value: &U256, negative: bool) -> u32 {
    let mut size = (value.bits() + 7) / 8;
    let mut compact = if size <= 3 {
        (value.low_u64() << (8 * (3 - size))) as u32
    } else {
        value.shr(8 * (size - 3)).low_u64() as u32
    };
    // The sign bit is not part of the mantissa
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact |= size << 24;
    if negative && compact & 0x007f_ffff != 0 {
        compact |= 0x0080_0000;
    }
    compact
}

/// GetBlockProof: expected number of hashes for a block at `bits`,
/// 2^256 / (target + 1), computed as ~target / (target + 1) + 1.
/// Zero for invalid targets.
pub fn get_block_proof(bits: u32) -> U256 {
    let decoded = set_compact(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() {
        return U256::ZERO;
    }
    let target = decoded.target;
    match (!target).div_rem(&(target + U256::ONE)) {
        Some((quotient, _)) => quotient + U256::ONE,
        None => U256::ZERO,
    }
}

/// CheckProofOfWork: ℍ × ℕ₃₂ → {true, false}
///
/// 1. The target decoded from `bits` must be positive, non-overflowing,
///    non-zero and no easier than the network limit
/// 2. The hash, read as a little-endian number, must not exceed it
pub fn check_proof_of_work(hash: &Hash, bits: u32, params: &PowParams) -> bool {
    let decoded = set_compact(bits);
    if decoded.negative || decoded.overflow || decoded.target.is_zero() || decoded.target > params.pow_limit {
        return false;
    }
    U256::from_le_bytes(hash) <= decoded.target
}

pub fn check_header_proof_of_work(header: &BlockHeader, params: &PowParams) -> bool {
    check_proof_of_work(&header.hash(), header.bits, params)
}

/// Seconds of work at the tip's difficulty separating two chain work totals,
/// signed by direction and saturating at `i64::MAX`
pub fn proof_equivalent_time(to_work: &U256, from_work: &U256, tip_proof: &U256, params: &PowParams) -> i64 {
    let (diff, sign) = if to_work > from_work {
        (*to_work - *from_work, 1)
    } else {
        (*from_work - *to_work, -1)
    };
    let scaled = diff
        .checked_mul_u64(params.target_spacing.unsigned_abs())
        .and_then(|product| product.div_rem(tip_proof))
        .map(|(quotient, _)| quotient);
    match scaled {
        Some(r) if r.bits() <= 63 => sign * r.low_u64() as i64,
        _ => sign * i64::MAX,
    }
}
