//! 256-bit unsigned integer for targets, chain work and field arithmetic

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Not, Sub};

use serde::{Deserialize, Serialize};

/// 256-bit unsigned integer, little-endian 64-bit limbs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct U256(pub [u64; 4]);

impl U256 {
    pub const ZERO: U256 = U256([0; 4]);
    pub const ONE: U256 = U256([1, 0, 0, 0]);
    pub const MAX: U256 = U256([u64::MAX; 4]);

    pub fn from_u64(value: u64) -> Self {
        U256([value, 0, 0, 0])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&x| x == 0)
    }

    pub fn low_u64(&self) -> u64 {
        self.0[0]
    }

    /// Position of the highest set bit plus one
    pub fn bits(&self) -> u32 {
        for i in (0..4).rev() {
            if self.0[i] != 0 {
                return 64 * i as u32 + (64 - self.0[i].leading_zeros());
            }
        }
        0
    }

    pub fn bit(&self, index: u32) -> bool {
        (self.0[(index / 64) as usize] >> (index % 64)) & 1 == 1
    }

    pub fn shl(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in 0..4 {
            if i + word_shift < 4 {
                result.0[i + word_shift] |= self.0[i] << bit_shift;
                if bit_shift > 0 && i + word_shift + 1 < 4 {
                    result.0[i + word_shift + 1] |= self.0[i] >> (64 - bit_shift);
                }
            }
        }

        result
    }

    pub fn shr(&self, shift: u32) -> Self {
        if shift >= 256 {
            return U256::ZERO;
        }

        let mut result = U256::ZERO;
        let word_shift = (shift / 64) as usize;
        let bit_shift = shift % 64;

        for i in word_shift..4 {
            result.0[i - word_shift] |= self.0[i] >> bit_shift;
            if bit_shift > 0 && i > word_shift {
                result.0[i - word_shift - 1] |= self.0[i] << (64 - bit_shift);
            }
        }

        result
    }

    pub fn overflowing_add(&self, other: &U256) -> (U256, bool) {
        let mut result = U256::ZERO;
        let mut carry = false;
        for i in 0..4 {
            let (sum, c1) = self.0[i].overflowing_add(other.0[i]);
            let (sum, c2) = sum.overflowing_add(carry as u64);
            result.0[i] = sum;
            carry = c1 || c2;
        }
        (result, carry)
    }

    pub fn overflowing_sub(&self, other: &U256) -> (U256, bool) {
        let mut result = U256::ZERO;
        let mut borrow = false;
        for i in 0..4 {
            let (diff, b1) = self.0[i].overflowing_sub(other.0[i]);
            let (diff, b2) = diff.overflowing_sub(borrow as u64);
            result.0[i] = diff;
            borrow = b1 || b2;
        }
        (result, borrow)
    }

    pub fn checked_add(&self, other: &U256) -> Option<U256> {
        match self.overflowing_add(other) {
            (value, false) => Some(value),
            (_, true) => None,
        }
    }

    /// Multiply by a 64-bit value, `None` on overflow
    pub fn checked_mul_u64(&self, factor: u64) -> Option<U256> {
        let mut result = U256::ZERO;
        let mut carry = 0u128;
        for i in 0..4 {
            let product = u128::from(self.0[i]) * u128::from(factor) + carry;
            result.0[i] = product as u64;
            carry = product >> 64;
        }
        if carry != 0 {
            return None;
        }
        Some(result)
    }

    /// Quotient and remainder by shift-and-subtract long division.
    /// Returns `None` when dividing by zero.
    pub fn div_rem(&self, divisor: &U256) -> Option<(U256, U256)> {
        if divisor.is_zero() {
            return None;
        }
        if self < divisor {
            return Some((U256::ZERO, *self));
        }

        let mut quotient = U256::ZERO;
        let mut remainder = U256::ZERO;
        for i in (0..self.bits()).rev() {
            // the shifted-out top bit means the true remainder exceeds any divisor
            let carry = remainder.bit(255);
            remainder = remainder.shl(1);
            if self.bit(i) {
                remainder.0[0] |= 1;
            }
            if carry || remainder >= *divisor {
                remainder = remainder.overflowing_sub(divisor).0;
                quotient.0[(i / 64) as usize] |= 1 << (i % 64);
            }
        }
        Some((quotient, remainder))
    }

    pub fn from_le_bytes(bytes: &[u8; 32]) -> Self {
        let mut words = [0u64; 4];
        for (i, word) in words.iter_mut().enumerate() {
            let mut limb = [0u8; 8];
            limb.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            *word = u64::from_le_bytes(limb);
        }
        U256(words)
    }

    pub fn to_le_bytes(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, &word) in self.0.iter().enumerate() {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn from_be_bytes(bytes: &[u8; 32]) -> Self {
        let mut le = *bytes;
        le.reverse();
        U256::from_le_bytes(&le)
    }

    pub fn to_be_bytes(&self) -> [u8; 32] {
        let mut bytes = self.to_le_bytes();
        bytes.reverse();
        bytes
    }
}

impl PartialOrd for U256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for U256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().rev().zip(other.0.iter().rev()) {
            match a.cmp(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }
}

/// Wrapping addition
impl Add for U256 {
    type Output = U256;
    fn add(self, rhs: U256) -> U256 {
        self.overflowing_add(&rhs).0
    }
}

/// Wrapping subtraction
impl Sub for U256 {
    type Output = U256;
    fn sub(self, rhs: U256) -> U256 {
        self.overflowing_sub(&rhs).0
    }
}

impl Not for U256 {
    type Output = U256;
    fn not(self) -> U256 {
        U256([!self.0[0], !self.0[1], !self.0[2], !self.0[3]])
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.to_be_bytes() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifts() {
        let one = U256::ONE;
        assert_eq!(one.shl(64), U256([0, 1, 0, 0]));
        assert_eq!(one.shl(255).shr(255), one);
        assert_eq!(U256([0, 0, 0, 1]).shr(130), U256([1 << 62, 0, 0, 0]));
        assert_eq!(one.shl(256), U256::ZERO);
    }

    #[test]
    fn test_add_sub_carry() {
        let a = U256([u64::MAX, 0, 0, 0]);
        assert_eq!(a + U256::ONE, U256([0, 1, 0, 0]));
        assert_eq!(U256([0, 1, 0, 0]) - U256::ONE, a);
        assert_eq!(U256::MAX.checked_add(&U256::ONE), None);
        assert_eq!(!U256::ZERO, U256::MAX);
    }

    #[test]
    fn test_div_rem() {
        let n = U256([0, 0, 1, 0]);
        let (q, r) = n.div_rem(&U256::from_u64(3)).unwrap();
        assert_eq!(q.checked_mul_u64(3).unwrap() + r, n);
        assert!(r < U256::from_u64(3));
        assert_eq!(U256::from_u64(100).div_rem(&U256::from_u64(7)), Some((U256::from_u64(14), U256::from_u64(2))));
        assert_eq!(U256::ONE.div_rem(&U256::ZERO), None);

        let big = U256([1, 0, 0, 1 << 63]);
        let (q, r) = U256::MAX.div_rem(&big).unwrap();
        assert_eq!(q, U256::ONE);
        assert_eq!(r, U256::MAX - big);
    }

    #[test]
    fn test_byte_order() {
        let mut be = [0u8; 32];
        be[31] = 1;
        assert_eq!(U256::from_be_bytes(&be), U256::ONE);
        assert_eq!(U256::ONE.to_le_bytes()[0], 1);
        assert_eq!(format!("{}", U256::from_u64(255)).trim_start_matches('0'), "ff");
    }

    #[test]
    fn test_bits() {
        assert_eq!(U256::ZERO.bits(), 0);
        assert_eq!(U256::ONE.bits(), 1);
        assert_eq!(U256([0, 0, 0, 1 << 63]).bits(), 256);
    }
}
