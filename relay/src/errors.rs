//! Errors the relay's routes reject requests with (§4.7 of the expanded spec).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("no bundle published for this identity")]
    BundleNotFound,

    #[error("a bundle with this signed prekey signature is already published, rotate first")]
    DuplicateSignature,

    #[error("this identity has no one-time prekeys left")]
    NoOneTimePrekeysRemaining,

    #[error("no message queued for this session id")]
    MessageNotFound,

    #[error("timed out waiting for a second peer to join the live bridge")]
    BridgeTimeout,
}

impl warp::reject::Reject for RelayError {}
