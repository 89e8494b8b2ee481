use thiserror::Error;

use crate::offsets;

/// Why a chat message was not handed to the game.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("could not find signature for chat sending")]
    Unavailable,
    #[error("message is empty")]
    Empty,
    #[error("message is {len} bytes, longer than {} bytes", offsets::MAX_MESSAGE_BYTES)]
    TooLong { len: usize },
    #[error("message contained invalid characters")]
    InvalidCharacters,
}

impl SendError {
    /// True for errors caused by the message itself rather than the environment.
    pub fn is_invalid_argument(&self) -> bool {
        !matches!(self, SendError::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature is empty")]
    Empty,
    #[error("invalid signature token {token:?} at position {index}")]
    InvalidToken { index: usize, token: String },
}
