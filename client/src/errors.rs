//! Errors surfaced by the client's relay I/O and session bookkeeping. Core
//! cryptographic failures (`protocol::errors::{X3dhError, RatchetError}`) are
//! wrapped rather than flattened, so callers can still match on the underlying
//! kind from §7 of the spec.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("relay rejected the request with status {status}: {body}")]
    Relay { status: reqwest::StatusCode, body: String },

    #[error("live bridge connection failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("live bridge closed before a frame arrived")]
    BridgeClosed,

    #[error("live bridge sent a malformed frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("wire field failed to decode: {0}")]
    Wire(#[from] common::CommonError),

    #[error("X3DH handshake failed: {0}")]
    X3dh(#[from] protocol::errors::X3dhError),

    #[error("ratchet operation failed: {0}")]
    Ratchet(#[from] protocol::errors::RatchetError),

    #[error("no ratchet session registered under session id {0}")]
    UnknownSession(Uuid),
}
