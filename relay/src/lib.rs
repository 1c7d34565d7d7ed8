//! In-memory reference relay (§6 of the spec, §4.7 of the expanded spec): the
//! bundle store, message queue, and live bridge that bridge two header-encrypted
//! Double Ratchet sessions without ever observing plaintext or long-term secret
//! material. Exposed as a library, not just a binary, so integration tooling
//! (the client crate's demo binary, this crate's own route tests) can embed a
//! relay instance directly instead of shelling out to a separate process.

pub mod errors;
pub mod routes;
pub mod state;
