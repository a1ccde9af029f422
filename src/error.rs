// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use thiserror::Error;

use crate::cipher::CipherError;
use crate::storage::traits::StorageError;
use crate::transport::TransportError;

/// Errors raised inside the engine.
///
/// None of these escape [`IdentityEngine::get_id`](crate::IdentityEngine::get_id)
/// or [`PendingResolution::resolve`](crate::PendingResolution::resolve): they are
/// logged, counted and turned into an empty or cached result at that boundary.
#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl IdentityError {
    pub(crate) fn decode(what: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    /// Short label for metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Decode { .. } => "decode",
            Self::Storage(_) => "storage",
            Self::Transport(_) => "transport",
            Self::Cipher(_) => "cipher",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IdentityError::Config("partner is required".into());
        assert_eq!(err.to_string(), "invalid configuration: partner is required");

        let err = IdentityError::decode("first-party record", "expected value at line 1");
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("first-party record"));
    }

    #[test]
    fn test_from_storage_error() {
        let err: IdentityError = StorageError::Backend("quota exceeded".into()).into();
        assert_eq!(err.kind(), "storage");
        assert!(err.to_string().contains("quota exceeded"));
    }
}
