// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Persisted record types.
//!
//! Two records are owned by the engine:
//!
//! - [`FirstPartyRecord`]: one per site (or per partner when siloed), holds the
//!   pseudonymous `pcid`, the A/B group and the last observed consent strings.
//! - [`PartnerCacheRecord`]: one per partner, holds the encrypted eids payload,
//!   its server-assigned TTL and the telemetry counters.
//!
//! Both serialize to the camelCase JSON shape the host storage already holds,
//! so records written by earlier clients keep parsing.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{EMPTY, INVALID_ID};

/// A single external identifier object, opaque to the engine.
pub type Eid = Value;

/// A/B group assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Group {
    /// No server decision yet.
    #[default]
    #[serde(rename = "U")]
    NotYetDefined,
    /// Resolved identifiers are surfaced to the caller.
    #[serde(rename = "A")]
    WithIiq,
    /// Withheld group: the caller always receives an empty result.
    #[serde(rename = "B")]
    WithoutIiq,
}

impl Group {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetDefined => "U",
            Self::WithIiq => "A",
            Self::WithoutIiq => "B",
        }
    }
}

impl std::fmt::Display for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plaintext form of the cached identity payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EidsEnvelope {
    #[serde(default)]
    pub eids: Vec<Eid>,
}

impl EidsEnvelope {
    #[must_use]
    pub fn new(eids: Vec<Eid>) -> Self {
        Self { eids }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eids.is_empty()
    }
}

/// Stored identity payload of a partner record.
///
/// Identifiers are only ever persisted as ciphertext; the other two shapes
/// carry no identifier at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CachedDataRepr", into = "CachedDataRepr")]
pub enum CachedData {
    /// The service answered with an explicitly empty identifier.
    InvalidId,
    /// Wiped payload (`{"eids":[]}` on disk).
    Empty,
    /// Encrypted JSON of an [`EidsEnvelope`].
    Ciphertext(String),
}

impl CachedData {
    /// Ciphertext, if this payload holds one.
    #[must_use]
    pub fn ciphertext(&self) -> Option<&str> {
        match self {
            Self::Ciphertext(c) if !c.is_empty() => Some(c),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CachedDataRepr {
    Text(String),
    Envelope(Value),
}

impl From<CachedDataRepr> for CachedData {
    fn from(repr: CachedDataRepr) -> Self {
        match repr {
            CachedDataRepr::Text(s) if s == INVALID_ID => Self::InvalidId,
            CachedDataRepr::Text(s) if s.is_empty() => Self::Empty,
            CachedDataRepr::Text(s) => Self::Ciphertext(s),
            // Plaintext envelopes are never trusted as identifiers.
            CachedDataRepr::Envelope(_) => Self::Empty,
        }
    }
}

impl From<CachedData> for CachedDataRepr {
    fn from(data: CachedData) -> Self {
        match data {
            CachedData::InvalidId => Self::Text(INVALID_ID.to_string()),
            CachedData::Empty => Self::Envelope(json!({ "eids": [] })),
            CachedData::Ciphertext(c) => Self::Text(c),
        }
    }
}

/// First-party record: the durable pseudonymous identity of this browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstPartyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcid_date: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
    /// Last successful sync (epoch millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s_cal: Option<i64>,
    #[serde(default)]
    pub group: Group,
    #[serde(default)]
    pub usp_string: String,
    #[serde(default)]
    pub gpp_string: String,
    #[serde(default)]
    pub gdpr_string: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_opted_out: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbsaved: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spd: Option<Value>,
}

impl FirstPartyRecord {
    /// Fresh record for a first-seen browser.
    #[must_use]
    pub fn new(pcid: String, now: i64) -> Self {
        Self {
            pcid: Some(pcid),
            pcid_date: Some(now),
            date: Some(now),
            group: Group::NotYetDefined,
            usp_string: EMPTY.to_string(),
            gpp_string: EMPTY.to_string(),
            gdpr_string: EMPTY.to_string(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn opted_out(&self) -> bool {
        self.is_opted_out.unwrap_or(false)
    }

    /// Apply a server group directive. A decided group never falls back to undefined.
    pub fn set_group(&mut self, group: Group) {
        if group != Group::NotYetDefined {
            self.group = group;
        }
    }
}

/// Partner cache record: encrypted payload, TTL and telemetry for one partner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerCacheRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<CachedData>,
    /// Cache lifetime (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cttl: Option<i64>,
    /// Round-trip time of the last request (ms).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rrtt: Option<i64>,
    /// Time of the last parsed reply (epoch millis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<i64>,
    #[serde(default)]
    pub call_count: u64,
    #[serde(default)]
    pub fail_count: u64,
    #[serde(default)]
    pub no_data_counter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_cause: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eidl: Option<i64>,
    #[serde(default)]
    pub wsrvcll: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_wire_names() {
        assert_eq!(serde_json::to_string(&Group::WithIiq).unwrap(), "\"A\"");
        assert_eq!(serde_json::to_string(&Group::WithoutIiq).unwrap(), "\"B\"");
        assert_eq!(serde_json::to_string(&Group::NotYetDefined).unwrap(), "\"U\"");
        assert_eq!(format!("{}", Group::WithoutIiq), "B");
    }

    #[test]
    fn test_new_first_party_record() {
        let record = FirstPartyRecord::new("abc".into(), 1000);
        assert_eq!(record.pcid.as_deref(), Some("abc"));
        assert_eq!(record.pcid_date, Some(1000));
        assert_eq!(record.group, Group::NotYetDefined);
        assert_eq!(record.gdpr_string, EMPTY);
        assert!(record.s_cal.is_none());
        assert!(!record.opted_out());
    }

    #[test]
    fn test_first_party_record_camel_case() {
        let mut record = FirstPartyRecord::new("abc".into(), 5);
        record.s_cal = Some(9);
        record.is_opted_out = Some(true);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["pcidDate"], 5);
        assert_eq!(value["sCal"], 9);
        assert_eq!(value["isOptedOut"], true);
        assert_eq!(value["group"], "U");
    }

    #[test]
    fn test_group_never_reverts_to_undefined() {
        let mut record = FirstPartyRecord::new("abc".into(), 1);
        record.set_group(Group::WithIiq);
        record.set_group(Group::NotYetDefined);
        assert_eq!(record.group, Group::WithIiq);
    }

    #[test]
    fn test_cached_data_shapes() {
        let invalid: CachedData = serde_json::from_value(json!("INVALID_ID")).unwrap();
        assert_eq!(invalid, CachedData::InvalidId);

        let wiped: CachedData = serde_json::from_value(json!({"eids": []})).unwrap();
        assert_eq!(wiped, CachedData::Empty);

        let cipher: CachedData = serde_json::from_value(json!("U2FsdGVk")).unwrap();
        assert_eq!(cipher.ciphertext(), Some("U2FsdGVk"));

        assert_eq!(serde_json::to_value(CachedData::Empty).unwrap(), json!({"eids": []}));
        assert_eq!(serde_json::to_value(CachedData::InvalidId).unwrap(), json!("INVALID_ID"));
    }

    #[test]
    fn test_plaintext_envelope_is_not_trusted() {
        let legacy: CachedData =
            serde_json::from_value(json!({"eids": [{"source": "intentiq.com"}]})).unwrap();
        assert_eq!(legacy, CachedData::Empty);
        assert!(legacy.ciphertext().is_none());
    }

    #[test]
    fn test_partner_record_parses_legacy_shape() {
        let raw = json!({
            "data": "cipher",
            "cttl": 43200000,
            "callCount": 3,
            "failCount": 1,
            "noDataCounter": 2,
            "wsrvcll": true,
            "unknownField": "ignored"
        });
        let record: PartnerCacheRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.cttl, Some(43_200_000));
        assert_eq!(record.call_count, 3);
        assert_eq!(record.no_data_counter, 2);
        assert!(record.wsrvcll);
        assert_eq!(record.data, Some(CachedData::Ciphertext("cipher".into())));
    }
}
