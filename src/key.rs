//! Secret keys and signing, used to build signed spends

use rand::RngCore;
use secp256k1::{Message, PublicKey, Scalar, SecretKey};

use crate::error::{ConsensusError, Result};
use crate::hash::sha256;
use crate::pubkey::{jacobi, schnorr_challenge, secp, FIELD_PRIME};
use crate::types::Hash;
use crate::uint::U256;

/// A secp256k1 secret key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Key {
    secret: SecretKey,
    compressed: bool,
}

impl Key {
    pub fn from_slice(bytes: &[u8], compressed: bool) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| ConsensusError::Serialization(format!("invalid secret key: {}", e)))?;
        Ok(Key { secret, compressed })
    }

    /// Fresh random key
    pub fn generate(compressed: bool) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0u8; 32];
            rng.fill_bytes(&mut bytes);
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Key { secret, compressed };
            }
        }
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Serialized public key, 33 or 65 bytes
    pub fn public_key(&self) -> Vec<u8> {
        let key = PublicKey::from_secret_key(secp(), &self.secret);
        if self.compressed {
            key.serialize().to_vec()
        } else {
            key.serialize_uncompressed().to_vec()
        }
    }

    /// Low-S DER-encoded ECDSA signature over `hash`
    pub fn sign_ecdsa(&self, hash: &Hash) -> Result<Vec<u8>> {
        let message = Message::from_digest_slice(hash)
            .map_err(|e| ConsensusError::Serialization(e.to_string()))?;
        let signature = secp().sign_ecdsa(&message, &self.secret);
        Ok(signature.serialize_der().to_vec())
    }

    /// 64-byte Schnorr signature over `hash`.
    ///
    /// 1. k = H(x ∥ m ∥ attempt) mod n, nonzero
    /// 2. R = kG; if jacobi(R.y) ≠ 1 then k = -k
    /// 3. e = H(R.x ∥ P ∥ m) mod n
    /// 4. s = k + e·x
    pub fn sign_schnorr(&self, hash: &Hash) -> Result<[u8; 64]> {
        let secp = secp();
        let key = PublicKey::from_secret_key(secp, &self.secret);

        let mut attempt = 0u8;
        let nonce = loop {
            let mut preimage = Vec::with_capacity(65);
            preimage.extend_from_slice(&self.secret.secret_bytes());
            preimage.extend_from_slice(hash);
            preimage.push(attempt);
            if let Ok(k) = SecretKey::from_slice(&sha256(&preimage)) {
                break k;
            }
            attempt = attempt.wrapping_add(1);
        };

        let point = PublicKey::from_secret_key(secp, &nonce).serialize_uncompressed();
        let mut r = [0u8; 32];
        let mut y = [0u8; 32];
        r.copy_from_slice(&point[1..33]);
        y.copy_from_slice(&point[33..65]);
        let nonce = if jacobi(&U256::from_be_bytes(&y), &FIELD_PRIME) == 1 {
            nonce
        } else {
            nonce.negate()
        };

        let e = Scalar::from_be_bytes(schnorr_challenge(&r, &key, hash))
            .map_err(|e| ConsensusError::Serialization(e.to_string()))?;
        let s = match self.secret.mul_tweak(&e) {
            Ok(ex) => nonce
                .add_tweak(&Scalar::from(ex))
                .map_err(|e| ConsensusError::Serialization(e.to_string()))?,
            // e = 0
            Err(_) => nonce,
        };

        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&r);
        sig[32..].copy_from_slice(&s.secret_bytes());
        Ok(sig)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubkey::{check_low_s, verify_ecdsa, verify_schnorr};

    fn test_key() -> Key {
        Key::from_slice(&[0x11; 32], true).unwrap()
    }

    #[test]
    fn test_public_key_sizes() {
        assert_eq!(test_key().public_key().len(), 33);
        let uncompressed = Key::from_slice(&[0x11; 32], false).unwrap();
        assert_eq!(uncompressed.public_key().len(), 65);
        assert_eq!(uncompressed.public_key()[0], 0x04);
    }

    #[test]
    fn test_invalid_secret_rejected() {
        assert!(Key::from_slice(&[0u8; 32], true).is_err());
        assert!(Key::from_slice(&[0xff; 32], true).is_err());
    }

    #[test]
    fn test_ecdsa_sign_verify() {
        let key = test_key();
        let hash = sha256(b"message");
        let sig = key.sign_ecdsa(&hash).unwrap();
        assert!(check_low_s(&sig));
        assert!(verify_ecdsa(&sig, &key.public_key(), &hash));
        assert!(!verify_ecdsa(&sig, &key.public_key(), &sha256(b"other")));
    }

    #[test]
    fn test_schnorr_sign_verify() {
        let key = test_key();
        for i in 0..8u8 {
            let hash = sha256(&[i]);
            let sig = key.sign_schnorr(&hash).unwrap();
            assert!(verify_schnorr(&sig, &key.public_key(), &hash));
            let mut bad = sig;
            bad[63] ^= 1;
            assert!(!verify_schnorr(&bad, &key.public_key(), &hash));
        }
    }

    #[test]
    fn test_schnorr_uncompressed_key() {
        let key = Key::from_slice(&[0x22; 32], false).unwrap();
        let hash = sha256(b"uncompressed");
        let sig = key.sign_schnorr(&hash).unwrap();
        assert!(verify_schnorr(&sig, &key.public_key(), &hash));
    }
}
