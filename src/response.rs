// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resolution reply handling.
//!
//! A parsed reply is applied to the session in a fixed field order:
//!
//! ```text
//! cttl → tc → isOptedOut → pid/dbsaved → ls → data → ct/sid/spd → rrtt → terminal
//!         │        │                       │
//!         │        │                       └─ ls=false: wipe, persist, stop
//!         │        └─ true: wipe, drop partner + hints keys, stop
//!         └─ 41: group B, wipe, persist, stop
//! ```
//!
//! The processor mutates and persists state but never invokes the caller's
//! completion callback; the caller delivers [`Session::runtime_eids`] once
//! [`ResponseProcessor::process`] returns.

use std::sync::Arc;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cipher::{seal_eids, PayloadCipher};
use crate::constants::{HOURS_24, TC_WITHHELD};
use crate::error::IdentityError;
use crate::hooks::GroupNotifier;
use crate::record::{CachedData, EidsEnvelope, Group};
use crate::session::Session;
use crate::state_store::IdentityStateStore;

/// Reply of the resolution service. Unknown fields are ignored, and a
/// known field with an unusable type reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResolutionReply {
    #[serde(default, deserialize_with = "lenient_int")]
    pub cttl: Option<i64>,
    /// Termination cause.
    #[serde(default, deserialize_with = "lenient_int")]
    pub tc: Option<i64>,
    #[serde(default, rename = "isOptedOut", deserialize_with = "lenient_bool")]
    pub is_opted_out: Option<bool>,
    #[serde(default)]
    pub pid: Option<Value>,
    #[serde(default)]
    pub dbsaved: Option<Value>,
    /// Live sync flag; `false` disables identifiers for this cycle.
    #[serde(default, deserialize_with = "lenient_bool")]
    pub ls: Option<bool>,
    #[serde(default)]
    pub data: Option<Value>,
    /// Client type.
    #[serde(default, deserialize_with = "lenient_int")]
    pub ct: Option<i64>,
    /// Site id.
    #[serde(default)]
    pub sid: Option<Value>,
    #[serde(default)]
    pub spd: Option<Value>,
}

/// Integers, integral floats and numeric strings. Anything else is absent.
fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn bool_of(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let parsed = int_of(&value);
    if parsed.is_none() && !value.is_null() {
        debug!(value = %value, "Ignoring non-numeric reply field");
    }
    Ok(parsed)
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(bool_of(&value))
}

impl ResolutionReply {
    /// Parse a reply body. Only JSON objects are accepted.
    pub fn parse(body: &str) -> Result<Self, IdentityError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| IdentityError::decode("reply", e.to_string()))?;
        if !value.is_object() {
            return Err(IdentityError::decode("reply", "not a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| IdentityError::decode("reply", e.to_string()))
    }
}

/// How a reply ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Body was not a valid reply; counters ticked as no-data only.
    Unparsed,
    /// Termination cause moved the user to the withheld group.
    Withheld,
    /// Server reported the user opted out.
    OptedOut,
    /// `ls: false`.
    LiveSyncDisabled,
    /// Identifiers returned and cached.
    Resolved,
    /// Valid reply without identifiers.
    NoData,
}

impl ReplyOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unparsed => "unparsed",
            Self::Withheld => "withheld",
            Self::OptedOut => "opted_out",
            Self::LiveSyncDisabled => "live_sync_disabled",
            Self::Resolved => "resolved",
            Self::NoData => "no_data",
        }
    }
}

/// What the `data` field turns into.
enum ReplyData {
    Invalid,
    Envelope(EidsEnvelope),
    Cleared,
}

fn interpret_data(data: Option<&Value>) -> ReplyData {
    match data {
        Some(Value::String(s)) if s.is_empty() => ReplyData::Invalid,
        Some(Value::String(s)) => ReplyData::Envelope(EidsEnvelope::new(vec![Value::String(s.clone())])),
        Some(value @ Value::Object(map)) if map.contains_key("eids") => {
            match serde_json::from_value::<EidsEnvelope>(value.clone()) {
                Ok(envelope) => ReplyData::Envelope(envelope),
                Err(e) => {
                    warn!(error = %e, "Reply data has an unusable eids field");
                    ReplyData::Cleared
                }
            }
        }
        _ => ReplyData::Cleared,
    }
}

pub struct ResponseProcessor {
    store: IdentityStateStore,
    cipher: Arc<dyn PayloadCipher>,
    notifier: GroupNotifier,
}

impl ResponseProcessor {
    pub fn new(store: IdentityStateStore, cipher: Arc<dyn PayloadCipher>, notifier: GroupNotifier) -> Self {
        Self { store, cipher, notifier }
    }

    /// Apply a reply body to the session and persist the result.
    pub fn process(&self, body: &str, session: &mut Session, now: i64) -> ReplyOutcome {
        let reply = match ResolutionReply::parse(body) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(partner = session.partner, error = %e, "Unusable resolution reply");
                crate::metrics::record_decode_failure("reply");
                session.counters.record_no_data();
                session.persist_partner(&self.store);
                return ReplyOutcome::Unparsed;
            }
        };
        self.apply(reply, session, now)
    }

    fn wipe(session: &mut Session) {
        session.partner_record.data = Some(CachedData::Empty);
        session.runtime_eids.clear();
    }

    fn apply(&self, reply: ResolutionReply, session: &mut Session, now: i64) -> ReplyOutcome {
        session.partner_record.date = Some(now);
        session.first_party.s_cal = Some(now);
        session.partner_record.cttl = Some(reply.cttl.unwrap_or(HOURS_24));

        if let Some(tc) = reply.tc {
            session.partner_record.termination_cause = Some(tc);
            if tc == TC_WITHHELD {
                session.first_party.set_group(Group::WithoutIiq);
                session.persist_first_party(&self.store);
                self.notifier.changed(Group::WithoutIiq);
                Self::wipe(session);
                session.persist_all(&self.store);
                self.notifier.report(Group::WithoutIiq);
                info!(partner = session.partner, "User moved to withheld group");
                return ReplyOutcome::Withheld;
            }
            session.first_party.set_group(Group::WithIiq);
            self.notifier.report(Group::WithIiq);
            self.notifier.changed(Group::WithIiq);
        }

        if let Some(opted_out) = reply.is_opted_out {
            if session.first_party.is_opted_out != Some(opted_out) {
                session.first_party.is_opted_out = Some(opted_out);
            }
            if opted_out {
                Self::wipe(session);
                self.store.remove_partner();
                self.store.remove_client_hints();
                session.persist_first_party(&self.store);
                info!(partner = session.partner, "User opted out, partner data removed");
                return ReplyOutcome::OptedOut;
            }
        }

        if let Some(pid) = reply.pid {
            session.first_party.pid = Some(pid);
        }
        if let Some(dbsaved) = reply.dbsaved {
            session.first_party.dbsaved = Some(dbsaved);
        }

        if reply.ls == Some(false) {
            Self::wipe(session);
            session.persist_all(&self.store);
            debug!(partner = session.partner, "Live sync disabled by server");
            return ReplyOutcome::LiveSyncDisabled;
        }

        let mut fresh: Option<EidsEnvelope> = None;
        if reply.data.is_some() || reply.ls.is_some() {
            match interpret_data(reply.data.as_ref()) {
                ReplyData::Invalid => {
                    session.partner_record.data = Some(CachedData::InvalidId);
                    session.runtime_eids.clear();
                }
                ReplyData::Envelope(envelope) => fresh = Some(envelope),
                ReplyData::Cleared => session.partner_record.data = None,
            }
        }

        if let Some(ct) = reply.ct {
            session.partner_record.client_type = Some(ct);
        }
        if let Some(sid) = reply.sid {
            session.partner_record.site_id = Some(sid);
        }
        if let Some(spd) = reply.spd {
            session.first_party.spd = Some(spd);
        }
        if let Some(start) = session.request_start.filter(|s| *s > 0) {
            session.partner_record.rrtt = Some(now - start);
        }

        let outcome = match fresh {
            Some(envelope) if !envelope.is_empty() => {
                session.partner_record.data = match seal_eids(self.cipher.as_ref(), &envelope) {
                    Ok(sealed) => Some(sealed),
                    Err(e) => {
                        warn!(partner = session.partner, error = %e, "Identity payload not cached");
                        None
                    }
                };
                session.runtime_eids = envelope.eids;
                ReplyOutcome::Resolved
            }
            Some(_) => {
                session.partner_record.data = Some(CachedData::Empty);
                session.runtime_eids.clear();
                ReplyOutcome::NoData
            }
            None if session.runtime_eids.is_empty() => ReplyOutcome::NoData,
            None => ReplyOutcome::Resolved,
        };

        session.counters.record_outcome(session.runtime_eids.len());
        session.persist_all(&self.store);
        debug!(
            partner = session.partner,
            outcome = outcome.as_str(),
            eids = session.runtime_eids.len(),
            "Resolution reply applied"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{open_eids, ChaChaCipher};
    use crate::eids::decode;
    use crate::record::FirstPartyRecord;
    use crate::storage::memory::InMemoryStore;
    use parking_lot::Mutex;
    use serde_json::json;

    struct Fixture {
        store: IdentityStateStore,
        cipher: Arc<ChaChaCipher>,
        groups: Arc<Mutex<Vec<Group>>>,
        processor: ResponseProcessor,
    }

    fn fixture() -> Fixture {
        let store = IdentityStateStore::new(Arc::new(InMemoryStore::new()), 7, false);
        let cipher = Arc::new(ChaChaCipher::default());
        let groups = Arc::new(Mutex::new(Vec::new()));
        let seen = groups.clone();
        let notifier = GroupNotifier::new(Some(Arc::new(move |g| seen.lock().push(g))), None, "intent_iq_group");
        let processor = ResponseProcessor::new(store.clone(), cipher.clone(), notifier);
        Fixture { store, cipher, groups, processor }
    }

    fn session() -> Session {
        let mut session = Session::new(7, FirstPartyRecord::new("pc".into(), 0), None);
        session.request_start = Some(900);
        session
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        assert!(ResolutionReply::parse("not json").is_err());
        assert!(ResolutionReply::parse("[1, 2]").is_err());
        assert!(ResolutionReply::parse("\"text\"").is_err());
        let reply = ResolutionReply::parse(r#"{"cttl": 5, "unknown": true}"#).unwrap();
        assert_eq!(reply.cttl, Some(5));
    }

    #[test]
    fn test_parse_tolerates_mistyped_fields() {
        let reply = ResolutionReply::parse(r#"{"tc": "41", "ct": "2", "cttl": 3600000.0, "ls": "true"}"#).unwrap();
        assert_eq!(reply.tc, Some(41));
        assert_eq!(reply.ct, Some(2));
        assert_eq!(reply.cttl, Some(3_600_000));
        assert_eq!(reply.ls, Some(true));

        let reply = ResolutionReply::parse(r#"{"tc": [1], "ct": {"a": 1}, "isOptedOut": 3, "cttl": null}"#).unwrap();
        assert_eq!(reply, ResolutionReply::default());
    }

    #[test]
    fn test_string_termination_cause_moves_to_withheld_group() {
        let f = fixture();
        let mut session = session();
        let body = r#"{"tc": "41", "ls": true, "data": {"eids": [{"source": "intentiq.com"}]}}"#;

        let outcome = f.processor.process(body, &mut session, 1_000);
        assert_eq!(outcome, ReplyOutcome::Withheld);
        assert!(session.runtime_eids.is_empty());
        assert_eq!(f.store.load_first_party().unwrap().group, Group::WithoutIiq);
    }

    #[test]
    fn test_mistyped_field_keeps_rest_of_reply() {
        let f = fixture();
        let mut session = session();
        let body = r#"{"ct": "2", "sid": "s", "tc": [], "cttl": 3600000, "ls": true,
                       "data": {"eids": [{"source": "intentiq.com", "uids": [{"id": "x"}]}]}}"#;

        let outcome = f.processor.process(body, &mut session, 1_000);
        assert_eq!(outcome, ReplyOutcome::Resolved);
        assert_eq!(session.runtime_eids.len(), 1);

        let stored = f.store.load_partner().unwrap();
        assert_eq!(stored.client_type, Some(2));
        assert_eq!(stored.cttl, Some(3_600_000));
        assert!(stored.termination_cause.is_none());
        assert!(matches!(stored.data, Some(CachedData::Ciphertext(_))));
    }

    #[test]
    fn test_unparseable_body_ticks_no_data_only() {
        let f = fixture();
        let mut session = session();
        let outcome = f.processor.process("<html>", &mut session, 1_000);

        assert_eq!(outcome, ReplyOutcome::Unparsed);
        assert_eq!(session.counters.no_data_count, 1);
        assert!(session.first_party.s_cal.is_none());
        assert!(f.store.load_first_party().is_none());
        assert_eq!(f.store.load_partner().unwrap().no_data_counter, 1);
    }

    #[test]
    fn test_resolved_eids_are_encrypted() {
        let f = fixture();
        let mut session = session();
        let body = json!({
            "cttl": 3_600_000,
            "tc": 20,
            "ls": true,
            "data": {"eids": [{"source": "intentiq.com", "uids": [{"id": "x"}]}]},
            "ct": 2,
            "sid": 99,
            "pid": "p-1"
        })
        .to_string();

        let outcome = f.processor.process(&body, &mut session, 1_000);
        assert_eq!(outcome, ReplyOutcome::Resolved);
        assert_eq!(session.runtime_eids.len(), 1);
        assert_eq!(*f.groups.lock(), vec![Group::WithIiq]);

        let stored = f.store.load_partner().unwrap();
        assert_eq!(stored.cttl, Some(3_600_000));
        assert_eq!(stored.rrtt, Some(100));
        assert_eq!(stored.client_type, Some(2));
        assert_eq!(stored.call_count, 1);
        assert_eq!(stored.eidl, Some(1));
        assert!(matches!(stored.data, Some(CachedData::Ciphertext(_))));
        let opened = open_eids(f.cipher.as_ref(), stored.data.as_ref().unwrap()).unwrap();
        assert_eq!(opened.eids, session.runtime_eids);

        let first_party = f.store.load_first_party().unwrap();
        assert_eq!(first_party.s_cal, Some(1_000));
        assert_eq!(first_party.group, Group::WithIiq);
        assert_eq!(first_party.pid, Some(json!("p-1")));
    }

    #[test]
    fn test_withheld_termination_cause() {
        let f = fixture();
        let mut session = session();
        session.runtime_eids = vec![json!({"source": "cached"})];

        let outcome = f.processor.process(r#"{"tc": 41, "data": {"eids": [1]}}"#, &mut session, 1_000);
        assert_eq!(outcome, ReplyOutcome::Withheld);
        assert!(session.runtime_eids.is_empty());
        assert_eq!(*f.groups.lock(), vec![Group::WithoutIiq]);

        let stored = f.store.load_partner().unwrap();
        assert_eq!(stored.data, Some(CachedData::Empty));
        assert_eq!(stored.termination_cause, Some(41));
        assert_eq!(f.store.load_first_party().unwrap().group, Group::WithoutIiq);
    }

    #[test]
    fn test_opt_out_removes_partner_and_hints() {
        let f = fixture();
        f.store.save_partner(&Default::default());
        f.store.save_client_hints("{\"1\":\"?0\"}");
        let mut session = session();

        let outcome = f.processor.process(r#"{"isOptedOut": true, "data": "abc"}"#, &mut session, 1_000);
        assert_eq!(outcome, ReplyOutcome::OptedOut);
        assert!(f.store.load_partner().is_none());
        assert!(f.store.load_client_hints().is_none());
        assert_eq!(f.store.load_first_party().unwrap().is_opted_out, Some(true));

        // A later opted-out cycle must not re-create the record
        session.persist_all(&f.store);
        assert!(f.store.load_partner().is_none());
    }

    #[test]
    fn test_live_sync_disabled() {
        let f = fixture();
        let mut session = session();
        let outcome = f.processor.process(r#"{"ls": false, "data": "abc"}"#, &mut session, 1_000);

        assert_eq!(outcome, ReplyOutcome::LiveSyncDisabled);
        assert_eq!(f.store.load_partner().unwrap().data, Some(CachedData::Empty));
    }

    #[test]
    fn test_empty_data_stores_invalid_id_sentinel() {
        let f = fixture();
        let mut session = session();
        let outcome = f.processor.process(r#"{"data": ""}"#, &mut session, 1_000);

        assert_eq!(outcome, ReplyOutcome::NoData);
        let stored = f.store.load_partner().unwrap();
        assert_eq!(stored.data, Some(CachedData::InvalidId));
        assert_eq!(stored.no_data_counter, 1);

        let raw = serde_json::to_value(&stored).unwrap();
        assert!(decode(&raw["data"]).is_none());
    }

    #[test]
    fn test_bare_string_becomes_single_eid() {
        let f = fixture();
        let mut session = session();
        let outcome = f.processor.process(r#"{"ls": true, "data": "id-123"}"#, &mut session, 1_000);

        assert_eq!(outcome, ReplyOutcome::Resolved);
        assert_eq!(session.runtime_eids, vec![json!("id-123")]);
    }

    #[test]
    fn test_missing_cttl_defaults_to_a_day() {
        let f = fixture();
        let mut session = session();
        f.processor.process("{}", &mut session, 1_000);

        let stored = f.store.load_partner().unwrap();
        assert_eq!(stored.cttl, Some(HOURS_24));
        assert_eq!(stored.no_data_counter, 1);
    }

    #[test]
    fn test_ls_without_data_clears_cache() {
        let f = fixture();
        let mut session = session();
        session.partner_record.data = Some(CachedData::Ciphertext("old".into()));
        f.processor.process(r#"{"ls": true}"#, &mut session, 1_000);

        assert_eq!(f.store.load_partner().unwrap().data, None);
    }
}
