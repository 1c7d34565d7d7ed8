//! Low-level cryptographic primitives underpinning the handshake and the ratchet:
//! HMAC-SHA-256, HKDF, AES-256-CBC, X25519 scalar multiplication, and an
//! XEdDSA-style signature scheme over the same Curve25519 identity keys.

use crate::constants::{
    AES256_CBC_IV_LENGTH, AES256_SECRET_LENGTH, CURVE25519_PUBLIC_LENGTH, CURVE25519_SECRET_LENGTH,
    SHA256_HASH_LENGTH, SIGNATURE_LENGTH,
};
use crate::errors::RatchetError;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use ed25519_dalek::ed25519::signature::{Signer, Verifier};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// A Curve25519 public key: 32 bytes, doubles as a peer/session identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; CURVE25519_PUBLIC_LENGTH]);

impl From<&PrivateKey> for PublicKey {
    fn from(private: &PrivateKey) -> PublicKey {
        let secret = StaticSecret::from(private.0);
        PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
    }
}

/// A Curve25519 private scalar. Zeroized on drop; never `Debug`-printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey(pub(crate) [u8; CURVE25519_SECRET_LENGTH]);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    pub fn generate() -> PrivateKey {
        let secret = StaticSecret::random_from_rng(&mut OsRng);
        PrivateKey(secret.to_bytes())
    }

    pub fn to_bytes(&self) -> [u8; CURVE25519_SECRET_LENGTH] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; CURVE25519_SECRET_LENGTH]) -> PrivateKey {
        PrivateKey(bytes)
    }
}

/// A Curve25519 keypair: the private scalar and its derived public point.
#[derive(Clone)]
pub struct KeyPair {
    pub private: PrivateKey,
    pub public: PublicKey,
}

impl KeyPair {
    pub fn generate() -> KeyPair {
        let private = PrivateKey::generate();
        let public = PublicKey::from(&private);
        KeyPair { private, public }
    }
}

/// An Ed25519 verifying key derived from an identity's Curve25519 private scalar.
/// Distinct from [`PublicKey`] (the Montgomery point used for X25519 DH) — kept
/// alongside an identity's `PublicKey` wherever signatures need verifying, the same
/// way a signed prekey bundle carries both values.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct VerifyingKey(pub [u8; CURVE25519_PUBLIC_LENGTH]);

/// An XEdDSA-style signature over a Curve25519 identity key.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Signature(pub [u8; SIGNATURE_LENGTH]);

/// Derives the Ed25519 verifying key that corresponds to `priv` under [`sign`].
pub fn derive_verifying_key(private: &PrivateKey) -> VerifyingKey {
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&private.0);
    VerifyingKey(signing_key.verifying_key().to_bytes())
}

/// XEdDSA-style signing: reinterprets the raw Curve25519 scalar directly as an
/// Ed25519 signing-key seed. `rand64` is accepted for interface fidelity with the
/// handshake's randomized-signing contract but is not mixed into the signature
/// nonce; `ed25519-dalek`'s safe API only exposes RFC 8032 deterministic signing.
pub fn sign(private: &PrivateKey, message: &[u8], mut rand64: [u8; 64]) -> Signature {
    let signing_key = ed25519_dalek::SigningKey::from_bytes(&private.0);
    let signature = signing_key.sign(message);
    rand64.zeroize();
    Signature(signature.to_bytes())
}

/// Verifies an XEdDSA-style signature. Returns `false` (never panics) on any
/// malformed key or signature.
pub fn verify(verifying_key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
    let Ok(vk) = ed25519_dalek::VerifyingKey::from_bytes(&verifying_key.0) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(&signature.0);
    vk.verify(message, &sig).is_ok()
}

/// Scalar multiplication on Curve25519: `priv * pub`.
pub fn x25519(private: &PrivateKey, public: &PublicKey) -> [u8; 32] {
    let secret = StaticSecret::from(private.0);
    let their_public = x25519_dalek::PublicKey::from(public.0);
    secret.diffie_hellman(&their_public).to_bytes()
}

/// HMAC-SHA-256 over `data` under `key`.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; SHA256_HASH_LENGTH] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

/// RFC-5869 HKDF extract-and-expand over HMAC-SHA-256. `salt` defaults to a
/// 32-byte zero string when absent.
pub fn hkdf(
    ikm: &[u8],
    info: &[u8],
    length: usize,
    salt: Option<&[u8]>,
) -> Result<Vec<u8>, RatchetError> {
    let zero_salt = [0u8; SHA256_HASH_LENGTH];
    let hk = Hkdf::<Sha256>::new(Some(salt.unwrap_or(&zero_salt)), ikm);
    let mut okm = vec![0u8; length];
    hk.expand(info, &mut okm)?;
    Ok(okm)
}

/// AES-256-CBC encrypt with PKCS#7 padding.
pub fn aes_cbc_encrypt(key: &[u8; AES256_SECRET_LENGTH], iv: &[u8; AES256_CBC_IV_LENGTH], plaintext: &[u8]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// AES-256-CBC decrypt, validating PKCS#7 padding.
pub fn aes_cbc_decrypt(
    key: &[u8; AES256_SECRET_LENGTH],
    iv: &[u8; AES256_CBC_IV_LENGTH],
    ciphertext: &[u8],
) -> Result<Vec<u8>, RatchetError> {
    let cipher = Aes256CbcDec::new(key.into(), iv.into());
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| RatchetError::InvalidTag)
}

/// Fills an array of length `N` with OS-sourced randomness.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut buf = [0u8; N];
    OsRng.fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x25519_is_symmetric() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_eq!(x25519(&a.private, &b.public), x25519(&b.private, &a.public));
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = PrivateKey::generate();
        let vk = derive_verifying_key(&key);
        let sig = sign(&key, b"hello", random_bytes::<64>());
        assert!(verify(&vk, b"hello", &sig));
        assert!(!verify(&vk, b"goodbye", &sig));
    }

    #[test]
    fn hkdf_is_deterministic_given_same_salt() {
        let ikm = [7u8; 32];
        let a = hkdf(&ikm, b"info", 64, None).unwrap();
        let b = hkdf(&ikm, b"info", 64, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn aes_cbc_round_trips() {
        let key = [1u8; 32];
        let iv = [2u8; 16];
        let ct = aes_cbc_encrypt(&key, &iv, b"attack at dawn");
        let pt = aes_cbc_decrypt(&key, &iv, &ct).unwrap();
        assert_eq!(pt, b"attack at dawn");
    }

    #[test]
    fn aes_cbc_decrypt_rejects_corrupted_padding() {
        let key = [1u8; 32];
        let iv = [2u8; 16];
        let mut ct = aes_cbc_encrypt(&key, &iv, b"attack at dawn");
        let last = ct.len() - 1;
        ct[last] ^= 0xFF;
        assert!(aes_cbc_decrypt(&key, &iv, &ct).is_err());
    }
}
