//! Monetary amounts in satoshi units
//!
//! `Amount` is a signed 64-bit count of the smallest currency unit. It only
//! combines with other amounts and with integers; there is no floating point
//! arithmetic on purpose, every conversion to a decimal string goes through
//! [`format_money`] and [`parse_money`].

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Rem, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{ConsensusError, Result};

/// Amount: ℤ (satoshis)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

/// One satoshi
pub const SATOSHI: Amount = Amount(1);

/// One hundred satoshis
pub const CASH: Amount = Amount(100);

/// One coin: 10^8 satoshis
pub const COIN: Amount = Amount(100_000_000);

/// No amount larger than this (in satoshi) is valid.
pub const MAX_MONEY: Amount = Amount(10_000_000 * 100_000_000);

impl Amount {
    pub const fn zero() -> Self {
        Amount(0)
    }

    pub const fn satoshi() -> Self {
        SATOSHI
    }

    pub const fn from_sat(sat: i64) -> Self {
        Amount(sat)
    }

    pub const fn to_sat(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }
}

/// MoneyRange: 0 ≤ v ≤ MAX_MONEY
pub fn money_range(value: Amount) -> bool {
    value >= Amount::zero() && value <= MAX_MONEY
}

impl Add for Amount {
    type Output = Amount;
    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Amount;
    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Mul<Amount> for i64 {
    type Output = Amount;
    fn mul(self, rhs: Amount) -> Amount {
        Amount(self * rhs.0)
    }
}

impl Div<Amount> for Amount {
    type Output = i64;
    fn div(self, rhs: Amount) -> i64 {
        self.0 / rhs.0
    }
}

impl Div<i64> for Amount {
    type Output = Amount;
    fn div(self, rhs: i64) -> Amount {
        Amount(self.0 / rhs)
    }
}

impl Rem<Amount> for Amount {
    type Output = Amount;
    fn rem(self, rhs: Amount) -> Amount {
        Amount(self.0 % rhs.0)
    }
}

impl Rem<i64> for Amount {
    type Output = Amount;
    fn rem(self, rhs: i64) -> Amount {
        Amount(self.0 % rhs)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_money(*self))
    }
}

/// FormatMoney: Amount → "whole.fraction"
///
/// Prints eight fractional digits, then trims trailing zeros while keeping
/// at least two of them.
pub fn format_money(amount: Amount) -> String {
    // i64::MIN has no positive counterpart; unsigned_abs keeps it printable
    let abs = amount.0.unsigned_abs();
    let coin = COIN.0 as u64;
    let mut s = format!("{}.{:08}", abs / coin, abs % coin);

    let keep = s.len() - 6;
    while s.len() > keep && s.ends_with('0') {
        s.pop();
    }

    if amount.0 < 0 {
        s.insert(0, '-');
    }
    s
}

/// ParseMoney: "whole[.fraction]" → Amount
///
/// Accepts surrounding whitespace, at most 10 whole digits and at most 8
/// fractional digits. Signs and exponents are rejected.
pub fn parse_money(input: &str) -> Result<Amount> {
    let invalid = || ConsensusError::InvalidAmount(input.to_string());
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };
    if !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }
    if whole.len() > 10 || fraction.len() > 8 {
        return Err(invalid());
    }

    let mut units = 0i64;
    let mut mult = COIN.0 / 10;
    for digit in fraction.bytes() {
        units += i64::from(digit - b'0') * mult;
        mult /= 10;
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| invalid())?
    };
    Ok(Amount(whole_value * COIN.0 + units))
}

/// CompressAmount: Amount → ℕ, defined for non-negative amounts only
///
/// 1. If the amount is negative, there is no encoding
/// 2. If the amount is 0, output 0
/// 3. Divide by the largest power of 10 possible; call the exponent e (e ≤ 9)
/// 4. If e < 9, the last digit d of the result is non-zero; drop it, call the
///    remainder n and output 1 + 10·(9·n + d − 1) + e
/// 5. Otherwise output 1 + 10·(n − 1) + 9
pub fn compress_amount(amount: Amount) -> Option<u64> {
    let mut n = u64::try_from(amount.0).ok()?;
    if n == 0 {
        return Some(0);
    }
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        Some(1u64.wrapping_add((n.wrapping_mul(9).wrapping_add(d - 1)).wrapping_mul(10)).wrapping_add(e))
    } else {
        Some(1u64.wrapping_add((n - 1).wrapping_mul(10)).wrapping_add(9))
    }
}

/// DecompressAmount: ℕ → Amount, the inverse of [`compress_amount`]
pub fn decompress_amount(x: u64) -> Amount {
    if x == 0 {
        return Amount::zero();
    }
    let mut x = x - 1;
    let mut e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x.wrapping_mul(10).wrapping_add(d)
    } else {
        x.wrapping_add(1)
    };
    while e > 0 {
        n = n.wrapping_mul(10);
        e -= 1;
    }
    Amount(n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_range() {
        assert!(money_range(Amount::zero()));
        assert!(money_range(MAX_MONEY));
        assert!(!money_range(MAX_MONEY + SATOSHI));
        assert!(!money_range(-SATOSHI));
    }

    #[test]
    fn test_amount_arithmetic() {
        let a = 3 * COIN;
        assert_eq!(a / COIN, 3);
        assert_eq!((a + CASH) % COIN, CASH);
        assert_eq!(a / 3, COIN);
        assert_eq!(-a + a, Amount::zero());
        assert_eq!(MAX_MONEY.checked_mul(1_000_000_000), None);
    }

    // ============================================================================
    // MONEY STRINGS
    // ============================================================================

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(Amount::zero()), "0.00");
        assert_eq!(format_money(12_345_678_901 * SATOSHI), "123.45678901");
        assert_eq!(format_money(COIN), "1.00");
        assert_eq!(format_money(COIN / 10), "0.10");
        assert_eq!(format_money(COIN / 100_000_000), "0.00000001");
        assert_eq!(format_money(-COIN), "-1.00");
        assert_eq!(format_money(10 * COIN + COIN / 2), "10.50");
    }

    #[test]
    fn test_parse_money() {
        assert_eq!(parse_money("0.0").unwrap(), Amount::zero());
        assert_eq!(parse_money("12345.6789").unwrap(), 12345 * COIN + 67_890_000 * SATOSHI);
        assert_eq!(parse_money(" 1 ").unwrap(), COIN);
        assert_eq!(parse_money("0.00000001").unwrap(), SATOSHI);
        assert_eq!(parse_money(".5").unwrap(), COIN / 2);
        assert_eq!(parse_money("1234567890").unwrap(), 1_234_567_890 * COIN);
    }

    #[test]
    fn test_parse_money_rejects() {
        assert!(parse_money("").is_err());
        assert!(parse_money("-1").is_err());
        assert!(parse_money("1e3").is_err());
        assert!(parse_money("0.000000001").is_err());
        assert!(parse_money("12345678901").is_err());
        assert!(parse_money("1 2").is_err());
    }

    // ============================================================================
    // COMPRESSION
    // ============================================================================

    #[test]
    fn test_compress_amount_known_values() {
        assert_eq!(compress_amount(Amount::zero()), Some(0x0));
        assert_eq!(compress_amount(SATOSHI), Some(0x1));
        assert_eq!(compress_amount(CASH), Some(0x3));
        assert_eq!(compress_amount(COIN / 100), Some(0x7));
        assert_eq!(compress_amount(COIN), Some(0x9));
        assert_eq!(compress_amount(50 * COIN), Some(0x32));
        assert_eq!(compress_amount(21_000_000 * COIN), Some(0x1406f40));
    }

    #[test]
    fn test_compress_amount_negative() {
        assert_eq!(compress_amount(-SATOSHI), None);
        assert_eq!(compress_amount(-MAX_MONEY), None);
        assert_eq!(compress_amount(Amount(i64::MIN)), None);
    }

    #[test]
    fn test_decompress_amount_known_values() {
        assert_eq!(decompress_amount(0x9), COIN);
        assert_eq!(decompress_amount(0x32), 50 * COIN);
        assert_eq!(decompress_amount(0x1406f40), 21_000_000 * COIN);
    }

    #[test]
    fn test_compress_round_trip_ranges() {
        for i in 1..=100_000i64 {
            let a = Amount::from_sat(i);
            assert_eq!(compress_amount(a).map(decompress_amount), Some(a));
        }
        for x in 0..=100_000u64 {
            assert_eq!(compress_amount(decompress_amount(x)), Some(x));
        }
    }
}
