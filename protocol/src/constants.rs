// byte size of a Curve25519 private key
pub(crate) const CURVE25519_SECRET_LENGTH: usize = 32;
// byte size of a Curve25519 public key
pub(crate) const CURVE25519_PUBLIC_LENGTH: usize = CURVE25519_SECRET_LENGTH;

pub(crate) const SIGNATURE_LENGTH: usize = 64;
// byte size of a sha256 hash / hmac tag
pub(crate) const SHA256_HASH_LENGTH: usize = 32;
// byte size of an aes256 key
pub(crate) const AES256_SECRET_LENGTH: usize = 32;
// byte size of the AES-256-CBC IV
pub(crate) const AES256_CBC_IV_LENGTH: usize = 16;
// byte size of the header auth-encrypt nonce appended on the wire
pub(crate) const HEADER_NONCE_LENGTH: usize = 16;
// byte size of the OKM split by auth_encrypt: enc_key(32) + auth_key(32) + iv(16)
pub(crate) const AEAD_OKM_LENGTH: usize = AES256_SECRET_LENGTH * 2 + AES256_CBC_IV_LENGTH;
// byte size of the OKM produced by kdf_root: new RK(32) + chain key(32) + next header key(32)
pub(crate) const ROOT_KDF_OKM_LENGTH: usize = 96;
// byte size of the cleartext ratchet header: ratchet_pub(32) ‖ PN(4) ‖ Ns(4)
pub(crate) const HEADER_LENGTH: usize = CURVE25519_PUBLIC_LENGTH + 4 + 4;
// number of one-time prekeys generated per publish-bundle call
pub(crate) const ONE_TIME_PREKEY_BATCH: usize = 10;

/// Maximum number of message keys a single decrypt call may skip ahead.
pub const MAX_SKIP: u32 = 10;
