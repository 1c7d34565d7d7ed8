//! Error types surfaced by the X3DH handshake and the ratchet session.

use thiserror::Error;

/// Errors raised while publishing a bundle or running the X3DH handshake.
#[derive(Debug, Error)]
pub enum X3dhError {
    #[error("bundle's signed prekey signature does not verify against its identity key")]
    InvalidBundleSignature,

    #[error("responder has no signed prekey matching the one the initiator used")]
    UnknownSignedPrekey,

    #[error("responder has no one-time prekey matching the one the initiator used")]
    UnknownOneTimePrekey,

    #[error("HKDF output length invalid: {0}")]
    Hkdf(#[from] hkdf::InvalidLength),

    #[error("ratchet error during handshake completion: {0}")]
    Ratchet(#[from] RatchetError),
}

/// Errors raised by the Double Ratchet session's encrypt/decrypt/skip operations.
#[derive(Debug, Error)]
pub enum RatchetError {
    #[error("encrypt called before a sending chain exists")]
    NotReady,

    #[error("neither the current nor the next header key authenticates this header")]
    HeaderDecryptFailed,

    #[error("payload or header MAC did not verify")]
    InvalidTag,

    #[error("skip would exceed MAX_SKIP messages")]
    TooManySkipped,

    #[error("decrypted header is not exactly {expected} bytes (got {actual})")]
    BadHeaderLayout { expected: usize, actual: usize },

    #[error("HKDF output length invalid: {0}")]
    Hkdf(#[from] hkdf::InvalidLength),
}
