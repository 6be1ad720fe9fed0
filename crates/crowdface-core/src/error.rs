use thiserror::Error;

use crate::types::IdentityId;

/// Errors returned by crowdface-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid input: descriptor length mismatch (expected {expected}, got {got})")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("identity {0} not found")]
    NotFound(IdentityId),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("image encoding failed: {0}")]
    Image(String),
}

impl Error {
    /// True for both flavours of caller-supplied bad input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, Error::DimensionMismatch { .. } | Error::InvalidInput(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
