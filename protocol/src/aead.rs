//! The encrypt-then-MAC construction used identically for payloads and headers
//! (§4.2). Note this is not a true AEAD: the tag authenticates the caller-supplied
//! `nonce` parameter, never the ciphertext. Callers MUST preserve this for wire
//! compatibility — see the design notes on the payload/header MAC scope.

use crate::constants::{AEAD_OKM_LENGTH, AES256_CBC_IV_LENGTH, AES256_SECRET_LENGTH, SHA256_HASH_LENGTH};
use crate::errors::RatchetError;
use crate::primitives::{aes_cbc_decrypt, aes_cbc_encrypt, hkdf, hmac_sha256};

/// `ciphertext = aes_cbc_encrypt(enc_key, iv, plaintext)`, `tag = hmac(auth_key, nonce)`,
/// keys and iv split from `hkdf(ikm, info, 80)`. Returns `ciphertext ‖ tag`.
pub fn encrypt(ikm: &[u8], info: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, RatchetError> {
    let okm = hkdf(ikm, info, AEAD_OKM_LENGTH, None)?;
    let (enc_key, auth_key, iv) = split_okm(&okm);

    let mut ciphertext = aes_cbc_encrypt(&enc_key, &iv, plaintext);
    let tag = hmac_sha256(&auth_key, nonce);
    ciphertext.extend_from_slice(&tag);
    Ok(ciphertext)
}

/// Recomputes the 80-byte OKM, splits `ct ‖ tag32` off `ciphertext_and_tag`, verifies
/// the tag against `nonce`, then decrypts. Fails with `InvalidTag` on any mismatch.
pub fn decrypt(ikm: &[u8], info: &[u8], nonce: &[u8], ciphertext_and_tag: &[u8]) -> Result<Vec<u8>, RatchetError> {
    if ciphertext_and_tag.len() < SHA256_HASH_LENGTH {
        return Err(RatchetError::InvalidTag);
    }
    let split = ciphertext_and_tag.len() - SHA256_HASH_LENGTH;
    let (ciphertext, tag) = ciphertext_and_tag.split_at(split);

    let okm = hkdf(ikm, info, AEAD_OKM_LENGTH, None)?;
    let (enc_key, auth_key, iv) = split_okm(&okm);

    let expected_tag = hmac_sha256(&auth_key, nonce);
    if !constant_time_eq(&expected_tag, tag) {
        return Err(RatchetError::InvalidTag);
    }
    aes_cbc_decrypt(&enc_key, &iv, ciphertext)
}

fn split_okm(okm: &[u8]) -> ([u8; AES256_SECRET_LENGTH], [u8; AES256_SECRET_LENGTH], [u8; AES256_CBC_IV_LENGTH]) {
    let mut enc_key = [0u8; AES256_SECRET_LENGTH];
    let mut auth_key = [0u8; AES256_SECRET_LENGTH];
    let mut iv = [0u8; AES256_CBC_IV_LENGTH];
    enc_key.copy_from_slice(&okm[0..32]);
    auth_key.copy_from_slice(&okm[32..64]);
    iv.copy_from_slice(&okm[64..80]);
    (enc_key, auth_key, iv)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let ikm = [3u8; 32];
        let ct = encrypt(&ikm, b"info", b"nonce", b"plaintext").unwrap();
        let pt = decrypt(&ikm, b"info", b"nonce", &ct).unwrap();
        assert_eq!(pt, b"plaintext");
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let ikm = [3u8; 32];
        let mut ct = encrypt(&ikm, b"info", b"nonce", b"plaintext").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(decrypt(&ikm, b"info", b"nonce", &ct), Err(RatchetError::InvalidTag)));
    }

    #[test]
    fn wrong_nonce_is_rejected() {
        let ikm = [3u8; 32];
        let ct = encrypt(&ikm, b"info", b"nonce-a", b"plaintext").unwrap();
        assert!(matches!(decrypt(&ikm, b"info", b"nonce-b", &ct), Err(RatchetError::InvalidTag)));
    }
}
