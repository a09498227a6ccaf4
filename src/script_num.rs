//! Script numbers: little-endian sign-magnitude integers on the stack

use crate::script_error::ScriptError;

/// Numeric value of a stack element.
///
/// Values are held as `i64`; the accepted operand width (4 or 8 bytes) is
/// decided when decoding. `i64::MIN` is never produced by arithmetic since
/// its encoding does not fit in 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ScriptNum(i64);

impl ScriptNum {
    pub const fn new(value: i64) -> Self {
        ScriptNum(value)
    }

    /// Decode a stack element as a number.
    ///
    /// 1. |bytes| > max_size: range error (32-bit or 64-bit flavour)
    /// 2. require_minimal ∧ ¬minimal(bytes): MINIMALNUM
    /// 3. Otherwise the sign-magnitude little-endian value
    pub fn decode(
        bytes: &[u8],
        require_minimal: bool,
        max_size: usize,
        integers_64_bit: bool,
    ) -> Result<Self, ScriptError> {
        if bytes.len() > max_size {
            return Err(if integers_64_bit {
                ScriptError::InvalidNumberRange64Bit
            } else {
                ScriptError::InvalidNumberRange
            });
        }
        if require_minimal && !is_minimally_encoded(bytes, max_size) {
            return Err(ScriptError::MinimalNum);
        }
        Ok(ScriptNum(decode_unchecked(bytes)))
    }

    pub const fn value(self) -> i64 {
        self.0
    }

    /// Value clamped to the i32 range
    pub fn getint32(self) -> i32 {
        self.0.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn to_bytes(self) -> Vec<u8> {
        encode(self.0)
    }

    pub fn checked_add(self, other: ScriptNum) -> Option<ScriptNum> {
        self.0.checked_add(other.0).filter(|&v| v != i64::MIN).map(ScriptNum)
    }

    pub fn checked_sub(self, other: ScriptNum) -> Option<ScriptNum> {
        self.0.checked_sub(other.0).filter(|&v| v != i64::MIN).map(ScriptNum)
    }

    pub fn checked_mul(self, other: ScriptNum) -> Option<ScriptNum> {
        self.0.checked_mul(other.0).filter(|&v| v != i64::MIN).map(ScriptNum)
    }
}

fn decode_unchecked(bytes: &[u8]) -> i64 {
    let Some(&last) = bytes.last() else { return 0 };
    let mut magnitude: u64 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        magnitude |= u64::from(b) << (8 * i);
    }
    if last & 0x80 != 0 {
        magnitude &= !(0x80u64 << (8 * (bytes.len() - 1)));
        -(magnitude as i64)
    } else {
        magnitude as i64
    }
}

/// Minimal sign-magnitude encoding of `value`
pub fn encode(value: i64) -> Vec<u8> {
    if value == 0 {
        return Vec::new();
    }
    let negative = value < 0;
    let mut abs = value.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs != 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // the top bit carries the sign; add a byte if it is already in use
    let last = out.len() - 1;
    if out[last] & 0x80 != 0 {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        out[last] |= 0x80;
    }
    out
}

/// IsMinimallyEncoded: no superfluous zero bytes and no negative zero
pub fn is_minimally_encoded(bytes: &[u8], max_size: usize) -> bool {
    if bytes.len() > max_size {
        return false;
    }
    if let Some(&last) = bytes.last() {
        // Most significant byte zero apart from the sign bit is only allowed
        // when the next byte's high bit would otherwise be read as the sign.
        if last & 0x7f == 0 && (bytes.len() <= 1 || bytes[bytes.len() - 2] & 0x80 == 0) {
            return false;
        }
    }
    true
}

/// MinimallyEncode: rewrite `data` in minimal form, returning whether it
/// changed
pub fn minimally_encode(data: &mut Vec<u8>) -> bool {
    let Some(&last) = data.last() else { return false };

    // If the last byte is not 0x00 or 0x80, we are minimally encoded.
    if last & 0x7f != 0 {
        return false;
    }

    // A single byte here is a zero, which encodes as an empty array.
    if data.len() == 1 {
        data.clear();
        return true;
    }

    // If the next byte has its sign bit set, then we are minimally encoded.
    if data[data.len() - 2] & 0x80 != 0 {
        return false;
    }

    for i in (1..data.len()).rev() {
        if data[i - 1] != 0 {
            if data[i - 1] & 0x80 != 0 {
                // need one more byte to hold the sign
                data[i] = last;
                data.truncate(i + 1);
            } else {
                data[i - 1] |= last;
                data.truncate(i);
            }
            return true;
        }
    }

    // all zeros
    data.clear();
    true
}

/// Stack element truthiness: any non-zero byte, except a lone sign bit in
/// the last position (negative zero)
pub fn cast_to_bool(bytes: &[u8]) -> bool {
    for (i, &b) in bytes.iter().enumerate() {
        if b != 0 {
            return !(i == bytes.len() - 1 && b == 0x80);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_values() {
        assert_eq!(encode(0), Vec::<u8>::new());
        assert_eq!(encode(1), vec![0x01]);
        assert_eq!(encode(-1), vec![0x81]);
        assert_eq!(encode(127), vec![0x7f]);
        assert_eq!(encode(128), vec![0x80, 0x00]);
        assert_eq!(encode(-128), vec![0x80, 0x80]);
        assert_eq!(encode(255), vec![0xff, 0x00]);
        assert_eq!(encode(-255), vec![0xff, 0x80]);
        assert_eq!(encode(i64::MAX), vec![0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(encode(i64::MIN).len(), 9);
    }

    #[test]
    fn test_decode_values() {
        for v in [0i64, 1, -1, 127, -127, 128, -128, 32767, -32768, 2147483647, -2147483647] {
            assert_eq!(ScriptNum::decode(&encode(v), true, 4, false).unwrap().value(), v);
        }
        assert_eq!(ScriptNum::decode(&encode(i64::MAX), true, 8, true).unwrap().value(), i64::MAX);
        assert_eq!(ScriptNum::decode(&encode(-i64::MAX), true, 8, true).unwrap().value(), -i64::MAX);
    }

    #[test]
    fn test_decode_range_errors() {
        assert_eq!(
            ScriptNum::decode(&[1, 2, 3, 4, 5], false, 4, false),
            Err(ScriptError::InvalidNumberRange)
        );
        assert_eq!(
            ScriptNum::decode(&[0u8; 9], false, 8, true),
            Err(ScriptError::InvalidNumberRange64Bit)
        );
    }

    #[test]
    fn test_decode_minimal() {
        assert_eq!(ScriptNum::decode(&[0x00], true, 4, false), Err(ScriptError::MinimalNum));
        assert_eq!(ScriptNum::decode(&[0x80], true, 4, false), Err(ScriptError::MinimalNum));
        assert_eq!(ScriptNum::decode(&[0x01, 0x00], true, 4, false), Err(ScriptError::MinimalNum));
        assert_eq!(ScriptNum::decode(&[0x01, 0x00], false, 4, false).unwrap().value(), 1);
        assert_eq!(ScriptNum::decode(&[0x80], false, 4, false).unwrap().value(), 0);
        assert!(ScriptNum::decode(&[0xff, 0x00], true, 4, false).is_ok());
    }

    #[test]
    fn test_checked_arithmetic() {
        let max = ScriptNum::new(i64::MAX);
        assert_eq!(max.checked_add(ScriptNum::new(1)), None);
        assert_eq!(ScriptNum::new(-i64::MAX).checked_sub(ScriptNum::new(1)), None);
        assert_eq!(ScriptNum::new(1 << 32).checked_mul(ScriptNum::new(1 << 31)), None);
        assert_eq!(ScriptNum::new(6).checked_mul(ScriptNum::new(-7)), Some(ScriptNum::new(-42)));
    }

    #[test]
    fn test_getint32_clamps() {
        assert_eq!(ScriptNum::new(1 << 40).getint32(), i32::MAX);
        assert_eq!(ScriptNum::new(-(1 << 40)).getint32(), i32::MIN);
    }

    #[test]
    fn test_minimally_encode() {
        let cases: &[(&[u8], &[u8])] = &[
            (&[], &[]),
            (&[0x00], &[]),
            (&[0x80], &[]),
            (&[0x01, 0x00], &[0x01]),
            (&[0x01, 0x80], &[0x81]),
            (&[0x80, 0x00], &[0x80, 0x00]),
            (&[0xab, 0x00, 0x00, 0x80], &[0xab, 0x80]),
            (&[0x00, 0x00, 0x00], &[]),
            (&[0x7f, 0x00, 0x00, 0x00], &[0x7f]),
            (&[0xff, 0x00, 0x00, 0x00], &[0xff, 0x00]),
        ];
        for (input, expected) in cases {
            let mut data = input.to_vec();
            minimally_encode(&mut data);
            assert_eq!(&data, expected);
            assert!(is_minimally_encoded(&data, 8));
        }
    }

    #[test]
    fn test_cast_to_bool() {
        assert!(!cast_to_bool(&[]));
        assert!(!cast_to_bool(&[0x00, 0x00]));
        assert!(!cast_to_bool(&[0x00, 0x80]));
        assert!(cast_to_bool(&[0x80, 0x00]));
        assert!(cast_to_bool(&[0x01]));
    }
}
