// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Typed, fault-tolerant access to the persisted identity state.
//!
//! Records are stored as JSON strings under fixed keys. This layer never
//! surfaces an error: malformed records read as absent, backend failures are
//! logged, counted and swallowed.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::constants::{first_party_key, partner_key, sync_key, CLIENT_HINTS_KEY};
use crate::metrics;
use crate::record::{FirstPartyRecord, PartnerCacheRecord};
use crate::storage::traits::KeyValueStore;

#[derive(Clone)]
pub struct IdentityStateStore {
    store: Arc<dyn KeyValueStore>,
    first_party_key: String,
    partner_key: String,
    sync_key: String,
}

impl IdentityStateStore {
    pub fn new(store: Arc<dyn KeyValueStore>, partner: i64, silo_enabled: bool) -> Self {
        Self {
            store,
            first_party_key: first_party_key(partner, silo_enabled),
            partner_key: partner_key(partner),
            sync_key: sync_key(partner),
        }
    }

    fn read_raw(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Storage read failed");
                metrics::record_storage_error("get");
                None
            }
        }
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_raw(key)?;
        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(key, error = %e, "Discarding malformed stored record");
                metrics::record_decode_failure("record");
                None
            }
        }
    }

    fn write_raw(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Storage write failed");
            metrics::record_storage_error("set");
        }
    }

    fn write<T: Serialize>(&self, key: &str, record: &T) {
        match serde_json::to_string(record) {
            Ok(json) => self.write_raw(key, &json),
            Err(e) => warn!(key, error = %e, "Record could not be serialized"),
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Storage remove failed");
            metrics::record_storage_error("remove");
        } else {
            debug!(key, "Removed stored record");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // First-party record
    // ═══════════════════════════════════════════════════════════════════════

    pub fn load_first_party(&self) -> Option<FirstPartyRecord> {
        self.read(&self.first_party_key)
    }

    pub fn save_first_party(&self, record: &FirstPartyRecord) {
        self.write(&self.first_party_key, record);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Partner cache record
    // ═══════════════════════════════════════════════════════════════════════

    pub fn load_partner(&self) -> Option<PartnerCacheRecord> {
        self.read(&self.partner_key)
    }

    pub fn save_partner(&self, record: &PartnerCacheRecord) {
        self.write(&self.partner_key, record);
    }

    pub fn remove_partner(&self) {
        self.remove(&self.partner_key);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Client hints and pixel stamp (plain strings)
    // ═══════════════════════════════════════════════════════════════════════

    pub fn load_client_hints(&self) -> Option<String> {
        self.read_raw(CLIENT_HINTS_KEY).filter(|h| !h.is_empty())
    }

    pub fn save_client_hints(&self, encoded: &str) {
        self.write_raw(CLIENT_HINTS_KEY, encoded);
    }

    pub fn remove_client_hints(&self) {
        self.remove(CLIENT_HINTS_KEY);
    }

    /// Last pixel sync for this partner. Unparseable or zero stamps read as never.
    pub fn last_pixel_sync(&self) -> Option<i64> {
        self.read_raw(&self.sync_key)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|stamp| *stamp != 0)
    }

    pub fn stamp_pixel_sync(&self, now: i64) {
        self.write_raw(&self.sync_key, &now.to_string());
    }
}

impl std::fmt::Debug for IdentityStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStateStore")
            .field("first_party_key", &self.first_party_key)
            .field("partner_key", &self.partner_key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Group;
    use crate::storage::memory::InMemoryStore;
    use crate::storage::traits::StorageError;

    fn store() -> (Arc<InMemoryStore>, IdentityStateStore) {
        let backend = Arc::new(InMemoryStore::new());
        let state = IdentityStateStore::new(backend.clone(), 7, false);
        (backend, state)
    }

    #[test]
    fn test_first_party_roundtrip() {
        let (_, state) = store();
        assert!(state.load_first_party().is_none());

        let mut record = FirstPartyRecord::new("pc".into(), 10);
        record.group = Group::WithIiq;
        state.save_first_party(&record);

        assert_eq!(state.load_first_party(), Some(record));
    }

    #[test]
    fn test_malformed_record_reads_absent() {
        let (backend, state) = store();
        backend.set("_iiq_fdata", "{not json").unwrap();
        backend.set("_iiq_fdata_7", "\"plain text\"").unwrap();

        assert!(state.load_first_party().is_none());
        assert!(state.load_partner().is_none());
    }

    #[test]
    fn test_silo_uses_partner_scoped_key() {
        let backend = Arc::new(InMemoryStore::new());
        let state = IdentityStateStore::new(backend.clone(), 9, true);
        state.save_first_party(&FirstPartyRecord::new("pc".into(), 1));

        assert!(backend.contains("_iiq_fdata_p_9"));
        assert!(!backend.contains("_iiq_fdata"));
    }

    #[test]
    fn test_partner_and_hints_removal() {
        let (backend, state) = store();
        state.save_partner(&PartnerCacheRecord::default());
        state.save_client_hints("{\"1\":\"?0\"}");
        assert!(backend.contains("_iiq_fdata_7"));
        assert!(state.load_client_hints().is_some());

        state.remove_partner();
        state.remove_client_hints();
        assert!(!backend.contains("_iiq_fdata_7"));
        assert!(!backend.contains("_iiq_ch"));
    }

    #[test]
    fn test_pixel_stamp() {
        let (backend, state) = store();
        assert_eq!(state.last_pixel_sync(), None);

        state.stamp_pixel_sync(1_234);
        assert_eq!(state.last_pixel_sync(), Some(1_234));

        backend.set("_iiq_sync_7", "garbage").unwrap();
        assert_eq!(state.last_pixel_sync(), None);
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Unavailable("disabled".into()))
        }
    }

    #[test]
    fn test_backend_errors_are_swallowed() {
        let state = IdentityStateStore::new(Arc::new(BrokenStore), 7, false);
        state.save_first_party(&FirstPartyRecord::default());
        state.remove_partner();
        assert!(state.load_first_party().is_none());
        assert!(state.last_pixel_sync().is_none());
    }
}
