//! Base58 and Base58Check encoding

use crate::error::{ConsensusError, Result};
use crate::hash::sha256d;

/// All alphanumeric characters except for "0", "I", "O", and "l"
const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

fn digit_value(c: u8) -> Option<u32> {
    ALPHABET.iter().position(|&a| a == c).map(|p| p as u32)
}

/// EncodeBase58: 𝔹* → Σ₅₈*
///
/// Leading zero bytes map to leading '1' characters; the remainder is the
/// big-endian base-58 representation of the input.
pub fn encode_base58(input: &[u8]) -> String {
    let zeroes = input.iter().take_while(|&&b| b == 0).count();
    let rest = &input[zeroes..];

    // log(256) / log(58), rounded up
    let mut b58 = vec![0u8; rest.len() * 138 / 100 + 1];
    let mut length = 0usize;
    for &byte in rest {
        let mut carry = u32::from(byte);
        let mut i = 0usize;
        for digit in b58.iter_mut().rev() {
            if carry == 0 && i >= length {
                break;
            }
            carry += 256 * u32::from(*digit);
            *digit = (carry % 58) as u8;
            carry /= 58;
            i += 1;
        }
        length = i;
    }

    let digits = &b58[b58.len() - length..];
    let skip = digits.iter().take_while(|&&d| d == 0).count();

    let mut out = String::with_capacity(zeroes + digits.len() - skip);
    out.extend(std::iter::repeat('1').take(zeroes));
    out.extend(digits[skip..].iter().map(|&d| ALPHABET[d as usize] as char));
    out
}

/// DecodeBase58: Σ₅₈* → 𝔹*
///
/// Surrounding whitespace is ignored. Fails on any non-alphabet character
/// or when the decoded length would exceed `max_len`.
pub fn decode_base58(input: &str, max_len: usize) -> Result<Vec<u8>> {
    let invalid = |why: &str| ConsensusError::InvalidBase58(why.to_string());
    let trimmed = input.trim_matches(|c| matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r'));
    let bytes = trimmed.as_bytes();

    let zeroes = bytes.iter().take_while(|&&c| c == b'1').count();
    if zeroes > max_len {
        return Err(invalid("too long"));
    }

    // log(58) / log(256), rounded up
    let mut b256 = vec![0u8; (bytes.len() - zeroes) * 733 / 1000 + 1];
    let mut length = 0usize;
    for &c in &bytes[zeroes..] {
        let mut carry = digit_value(c).ok_or_else(|| invalid("invalid character"))?;
        let mut i = 0usize;
        for digit in b256.iter_mut().rev() {
            if carry == 0 && i >= length {
                break;
            }
            carry += 58 * u32::from(*digit);
            *digit = (carry % 256) as u8;
            carry /= 256;
            i += 1;
        }
        length = i;
        if length + zeroes > max_len {
            return Err(invalid("too long"));
        }
    }

    let mut out = vec![0u8; zeroes];
    out.extend_from_slice(&b256[b256.len() - length..]);
    Ok(out)
}

/// EncodeBase58Check: payload ∥ SHA256d(payload)[0..4], base-58 encoded
pub fn encode_base58_check(payload: &[u8]) -> String {
    let mut data = payload.to_vec();
    data.extend_from_slice(&sha256d(payload)[..4]);
    encode_base58(&data)
}

/// DecodeBase58Check: verify and strip the 4-byte checksum
pub fn decode_base58_check(input: &str, max_len: usize) -> Result<Vec<u8>> {
    let mut data = decode_base58(input, max_len.saturating_add(4))?;
    if data.len() < 4 {
        return Err(ConsensusError::InvalidBase58("missing checksum".to_string()));
    }
    let split = data.len() - 4;
    if sha256d(&data[..split])[..4] != data[split..] {
        return Err(ConsensusError::InvalidBase58("checksum mismatch".to_string()));
    }
    data.truncate(split);
    Ok(data)
}
