use thiserror::Error;

/// Failure of a single rotation cycle.
///
/// Both variants are transient: the rotation controller turns them into an
/// `Error` state and retries after one interval.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RotationError {
    /// Transport failure, timeout, non-success status or unreadable body.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Payload did not describe an image, or the image bytes did not decode.
    #[error("decode failed: {0}")]
    Decode(String),
}

impl RotationError {
    pub fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
