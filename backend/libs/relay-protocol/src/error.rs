use thiserror::Error;

use crate::messages::EventKind;

/// Errors raised while decoding or validating relay messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no type field")]
    MissingType,

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("message type {0} is reserved for the relay and cannot be pushed")]
    NotPushable(EventKind),

    #[error("invalid referral level {0}, expected 1 or 2")]
    InvalidLevel(u8),

    #[error("userId must not be empty")]
    EmptyUserId,
}
