//! Error types for Picofeed Core.

use thiserror::Error;

/// Wire format errors raised while encoding or decoding a single segment.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer underflow at offset {offset}: need {needed} bytes, {available} available")]
    BufferUnderflow {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown segment tag {tag:#04x} at offset {offset}")]
    UnknownTag { offset: usize, tag: u8 },

    #[error("varint at offset {offset} does not fit in 64 bits")]
    VarintOverflow { offset: usize },

    #[error("missing or invalid magic header")]
    BadMagic,

    #[error("destination too small: need {needed} bytes, {available} available")]
    DestinationTooSmall { needed: usize, available: usize },
}

/// Errors that can occur during feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("block at height {height} does not link to its predecessor")]
    InvalidParent { height: usize },

    #[error("invalid secret key: expected 32 or 64 bytes, got {len}")]
    InvalidSecretKey { len: usize },

    #[error("block body must not be empty")]
    EmptyBody,

    #[error("feed overflow: block needs {required} bytes, {available} available")]
    FeedOverflow { required: usize, available: usize },

    #[error("feed buffer was taken by another feed")]
    Stolen,

    #[error("input is not a pickled feed")]
    NotPickle,

    #[error("malformed pickle: {0}")]
    MalformedPickle(String),

    #[error("cannot build a feed from {kind}")]
    UnsupportedInput { kind: &'static str },

    #[error("no block at height {height}")]
    BlockNotFound { height: usize },

    #[error("no signer known for block")]
    NoSigner,

    #[error("invalid signature")]
    InvalidSignature,
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
