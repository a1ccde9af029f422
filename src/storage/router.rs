// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage-type routing.
//!
//! The host registers one backend per [`StorageType`] it can offer and the
//! caller declares which types it allows. Reads come from the first allowed
//! backend holding the key; writes and removals go to every allowed backend.

use std::sync::Arc;
use tracing::debug;

use super::traits::{KeyValueStore, StorageError, StorageType};

/// Resolve the caller's storage preference. Unknown names are dropped and an
/// empty result falls back to `html5`.
#[must_use]
pub fn define_storage_types(enabled: &[String]) -> Vec<StorageType> {
    let mut types: Vec<StorageType> = Vec::new();
    for name in enabled {
        match StorageType::parse(name) {
            Some(t) if !types.contains(&t) => types.push(t),
            Some(_) => {}
            None => debug!(storage_type = %name, "Ignoring unsupported storage type"),
        }
    }
    if types.is_empty() {
        types.push(StorageType::Html5);
    }
    types
}

#[derive(Clone)]
pub struct StorageRouter {
    backends: Vec<(StorageType, Arc<dyn KeyValueStore>)>,
    allowed: Vec<StorageType>,
}

impl StorageRouter {
    pub fn new(backends: Vec<(StorageType, Arc<dyn KeyValueStore>)>, allowed: Vec<StorageType>) -> Self {
        Self { backends, allowed }
    }

    /// Allowed types, in preference order
    #[must_use]
    pub fn allowed(&self) -> &[StorageType] {
        &self.allowed
    }

    fn active(&self) -> impl Iterator<Item = &Arc<dyn KeyValueStore>> {
        self.allowed.iter().filter_map(move |t| {
            self.backends
                .iter()
                .find(|(bt, store)| bt == t && store.is_available())
                .map(|(_, store)| store)
        })
    }
}

impl KeyValueStore for StorageRouter {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut last_err = None;
        for store in self.active() {
            match store.get(key) {
                Ok(Some(value)) => return Ok(Some(value)),
                Ok(None) => {}
                Err(e) => last_err = Some(e),
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut written = 0;
        for store in self.active() {
            store.set(key, value)?;
            written += 1;
        }
        if written == 0 {
            return Err(StorageError::Unavailable(format!(
                "no allowed backend for {:?}",
                self.allowed
            )));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        for store in self.active() {
            store.remove(key)?;
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.active().next().is_some()
    }
}
