//! X3DH + header-encrypted Double Ratchet core.
//!
//! [`x3dh`] seeds a new session from a prekey-bundle handshake; [`ratchet`] then
//! governs every subsequent header and payload encryption/decryption. [`identity`]
//! and [`directory`] hold the per-client bookkeeping (identity keypair, signed
//! prekey rotation, one-time prekeys, and the session-id -> ratchet map).

pub mod aead;
pub mod constants;
pub mod directory;
pub mod errors;
pub mod header;
pub mod identity;
pub mod primitives;
pub mod ratchet;
pub mod x3dh;
