//! Fixed-layout ratchet header and its encrypted wire wrapper (§4.3).

use crate::aead;
use crate::constants::{CURVE25519_PUBLIC_LENGTH, HEADER_LENGTH, HEADER_NONCE_LENGTH};
use crate::errors::RatchetError;
use crate::primitives::{random_bytes, PublicKey};

/// Cleartext ratchet header: `ratchet_pub ‖ PN ‖ Ns`, big-endian, 40 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub ratchet_pub: PublicKey,
    pub pn: u32,
    pub ns: u32,
}

impl Header {
    pub fn encode(&self) -> [u8; HEADER_LENGTH] {
        let mut out = [0u8; HEADER_LENGTH];
        out[0..CURVE25519_PUBLIC_LENGTH].copy_from_slice(&self.ratchet_pub.0);
        out[CURVE25519_PUBLIC_LENGTH..CURVE25519_PUBLIC_LENGTH + 4].copy_from_slice(&self.pn.to_be_bytes());
        out[CURVE25519_PUBLIC_LENGTH + 4..HEADER_LENGTH].copy_from_slice(&self.ns.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Header, RatchetError> {
        if bytes.len() != HEADER_LENGTH {
            return Err(RatchetError::BadHeaderLayout {
                expected: HEADER_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut ratchet_pub = [0u8; CURVE25519_PUBLIC_LENGTH];
        ratchet_pub.copy_from_slice(&bytes[0..CURVE25519_PUBLIC_LENGTH]);
        let pn = u32::from_be_bytes(bytes[CURVE25519_PUBLIC_LENGTH..CURVE25519_PUBLIC_LENGTH + 4].try_into().unwrap());
        let ns = u32::from_be_bytes(bytes[CURVE25519_PUBLIC_LENGTH + 4..HEADER_LENGTH].try_into().unwrap());
        Ok(Header {
            ratchet_pub: PublicKey(ratchet_pub),
            pn,
            ns,
        })
    }
}

/// Encrypts `header` under `header_key`, appending the 16-byte nonce in cleartext.
/// The nonce is never reused as the AES-CBC IV — the IV always comes from the
/// HKDF-80 split inside `aead::encrypt`.
pub fn encrypt(header_key: &[u8; 32], info: &[u8], header: &Header) -> Result<Vec<u8>, RatchetError> {
    let nonce: [u8; HEADER_NONCE_LENGTH] = random_bytes();
    let mut wire = aead::encrypt(header_key, info, &nonce, &header.encode())?;
    wire.extend_from_slice(&nonce);
    Ok(wire)
}

/// Splits the trailing nonce off `wire`, verifies and decrypts under `header_key`.
pub fn decrypt(header_key: &[u8; 32], info: &[u8], wire: &[u8]) -> Result<Header, RatchetError> {
    if wire.len() < HEADER_NONCE_LENGTH {
        return Err(RatchetError::HeaderDecryptFailed);
    }
    let split = wire.len() - HEADER_NONCE_LENGTH;
    let (encrypted, nonce) = wire.split_at(split);
    let cleartext = aead::decrypt(header_key, info, nonce, encrypted).map_err(|_| RatchetError::HeaderDecryptFailed)?;
    Header::decode(&cleartext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let hk = [9u8; 32];
        let header = Header {
            ratchet_pub: PublicKey([1u8; 32]),
            pn: 3,
            ns: 7,
        };
        let wire = encrypt(&hk, b"info", &header).unwrap();
        let decoded = decrypt(&hk, b"info", &wire).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn wrong_key_fails() {
        let header = Header {
            ratchet_pub: PublicKey([1u8; 32]),
            pn: 0,
            ns: 0,
        };
        let wire = encrypt(&[1u8; 32], b"info", &header).unwrap();
        assert!(decrypt(&[2u8; 32], b"info", &wire).is_err());
    }

    #[test]
    fn flipped_byte_fails() {
        let header = Header {
            ratchet_pub: PublicKey([1u8; 32]),
            pn: 0,
            ns: 0,
        };
        let hk = [5u8; 32];
        let mut wire = encrypt(&hk, b"info", &header).unwrap();
        wire[0] ^= 0xFF;
        assert!(decrypt(&hk, b"info", &wire).is_err());
    }
}
