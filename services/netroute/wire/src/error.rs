//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug)]
pub enum WireError {
    /// Payload is not valid JSON
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload is valid JSON but not an object
    #[error("payload is not a json object")]
    NotAnObject,

    /// The `type` discriminator is missing or not a string
    #[error("missing type discriminator")]
    MissingType,

    /// A known message type with missing or mistyped fields
    #[error("malformed {kind} payload: {reason}")]
    Malformed {
        /// Message type that failed to decode
        kind: &'static str,
        /// Decoder error description
        reason: String,
    },
}

impl WireError {
    pub(crate) fn malformed(kind: &'static str, reason: impl ToString) -> Self {
        WireError::Malformed {
            kind,
            reason: reason.to_string(),
        }
    }
}
