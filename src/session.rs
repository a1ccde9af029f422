// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mutable state of one `get_id` cycle.

use tracing::trace;

use crate::record::{Eid, FirstPartyRecord, PartnerCacheRecord};
use crate::state_store::IdentityStateStore;
use crate::telemetry::TelemetryCounters;

/// Records and runtime values threaded through a single cycle, from load to
/// the final persist after the reply (or timeout) is handled.
#[derive(Debug, Clone)]
pub struct Session {
    pub partner: i64,
    pub first_party: FirstPartyRecord,
    pub partner_record: PartnerCacheRecord,
    /// Whether a partner record was found at load time.
    pub partner_existed: bool,
    pub counters: TelemetryCounters,
    /// Plaintext eids known for this cycle (decrypted cache or fresh reply).
    pub runtime_eids: Vec<Eid>,
    /// Dispatch time of the resolution request.
    pub request_start: Option<i64>,
}

impl Session {
    pub fn new(partner: i64, first_party: FirstPartyRecord, partner_record: Option<PartnerCacheRecord>) -> Self {
        let partner_existed = partner_record.is_some();
        let partner_record = partner_record.unwrap_or_default();
        let counters = TelemetryCounters::from_record(&partner_record);
        Self {
            partner,
            first_party,
            partner_record,
            partner_existed,
            counters,
            runtime_eids: Vec::new(),
            request_start: None,
        }
    }

    pub fn persist_first_party(&self, store: &IdentityStateStore) {
        store.save_first_party(&self.first_party);
    }

    /// Write the partner record with the current counters and eid-list
    /// length. Skipped while the user is opted out, so a removed record is
    /// not re-created.
    pub fn persist_partner(&mut self, store: &IdentityStateStore) {
        if self.first_party.opted_out() {
            trace!(partner = self.partner, "Opted out, partner record not written");
            return;
        }
        self.partner_record.eidl = Some(if self.runtime_eids.is_empty() {
            -1
        } else {
            self.runtime_eids.len() as i64
        });
        self.counters.store_into(&mut self.partner_record);
        store.save_partner(&self.partner_record);
    }

    pub fn persist_all(&mut self, store: &IdentityStateStore) {
        self.persist_first_party(store);
        self.persist_partner(store);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn state() -> IdentityStateStore {
        IdentityStateStore::new(Arc::new(InMemoryStore::new()), 7, false)
    }

    #[test]
    fn test_counters_loaded_from_record() {
        let record = PartnerCacheRecord {
            call_count: 3,
            fail_count: 1,
            ..Default::default()
        };
        let session = Session::new(7, FirstPartyRecord::default(), Some(record));
        assert!(session.partner_existed);
        assert_eq!(session.counters.call_count, 3);
        assert_eq!(session.counters.fail_count, 1);
    }

    #[test]
    fn test_persist_sets_eidl_and_counters() {
        let store = state();
        let mut session = Session::new(7, FirstPartyRecord::default(), None);
        session.persist_all(&store);
        assert_eq!(store.load_partner().unwrap().eidl, Some(-1));

        session.runtime_eids = vec![json!({"source": "a"}), json!({"source": "b"})];
        session.counters.record_outcome(2);
        session.persist_partner(&store);

        let saved = store.load_partner().unwrap();
        assert_eq!(saved.eidl, Some(2));
        assert_eq!(saved.call_count, 1);
    }

    #[test]
    fn test_opted_out_skips_partner_write() {
        let store = state();
        let first_party = FirstPartyRecord {
            is_opted_out: Some(true),
            ..Default::default()
        };
        let mut session = Session::new(7, first_party, None);
        session.persist_all(&store);

        assert!(store.load_first_party().is_some());
        assert!(store.load_partner().is_none());
    }
}
