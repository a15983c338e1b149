//! Error taxonomy for the tokenizer engine.
//!
//! Mirrors the four fatal error kinds plus the two call-site behaviors
//! called out for the training/encoding pipeline: configuration errors
//! and I/O errors are fatal before any work starts, consistency errors
//! indicate a bug in the merge loop's bookkeeping, and decode errors are
//! fatal at the call site. Unknown special tokens at encode time are
//! *not* an error variant here — they downgrade silently to Normal
//! handling, per the caller-facing contract.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("decode error: unknown symbol id {0}")]
    Decode(u32),
}

pub type Result<T> = std::result::Result<T, TokenizerError>;
