//! Memory service error taxonomy.
//!
//! Every memory failure degrades to an empty lesson list at the call site;
//! these types exist so the degradation is logged with a reason.

use thiserror::Error;

/// Failure talking to the lesson memory service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The backing service could not be reached.
    #[error("memory service unavailable: {reason}")]
    Unavailable { reason: String },
    /// The service answered with something we could not decode.
    #[error("malformed memory response: {reason}")]
    Malformed { reason: String },
    /// Local persistence (save/load) failed.
    #[error("memory persistence failed: {reason}")]
    Persistence { reason: String },
}

impl MemoryError {
    /// Whether a retry might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Persistence { .. })
    }
}
