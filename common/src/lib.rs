//! Wire codec shared by the relay and the client (§2, §6 of the expanded spec):
//! JSON-serializable twins of every `protocol` structure that crosses the relay
//! boundary, plus the base64 encode/decode helpers that back them.

pub mod error;
pub mod wire;

pub use error::CommonError;
pub use wire::*;
