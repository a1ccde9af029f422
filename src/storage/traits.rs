// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Backing technology a host can offer for persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Origin-scoped local storage.
    Html5,
    /// First-party cookies.
    Cookie,
}

impl StorageType {
    /// Parse a host storage-type name; unsupported names yield `None`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "html5" => Some(Self::Html5),
            "cookie" => Some(Self::Cookie),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Html5 => write!(f, "html5"),
            Self::Cookie => write!(f, "cookie"),
        }
    }
}

/// Raw string key/value persistence.
///
/// Writes must be visible to subsequent reads on the same store immediately;
/// the engine never merges at this layer, every `set` is a full overwrite.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Whether the backend can currently be used.
    fn is_available(&self) -> bool {
        true
    }
}
