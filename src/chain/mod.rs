//! Stacks chain layer.
//!
//! Everything the exchange needs to talk to the chain: the Clarity
//! consensus wire encoding, order hashing and RSV signature verification,
//! a minimal single-sig contract-call transaction builder, and the node
//! HTTP client.

pub mod clarity;
pub mod client;
pub mod hashing;
pub mod transaction;

use thiserror::Error;

/// Errors surfaced by the chain layer.
#[derive(Debug, Error)]
pub enum ChainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("node rejected transaction: {0}")]
    Rejected(String),

    #[error("node request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Http(err.to_string())
    }
}
