//! Errors raised while decoding a wire object back into a core `protocol` type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommonError {
    #[error("invalid base64 encoding")]
    Base64,

    #[error("decoded field has the wrong byte length")]
    WrongLength,
}
