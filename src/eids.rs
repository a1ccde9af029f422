// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Identifier decoding and the external-id descriptor.

use serde::Serialize;
use serde_json::Value;

use crate::constants::{EID_ATYPE, EID_SOURCE, INVALID_ID};

/// Decoded identifier as exposed to the host pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentIqId {
    #[serde(rename = "intentIqId")]
    pub intent_iq_id: Value,
}

/// Decode a stored or returned value. Absent, empty, `false`, zero and the
/// `INVALID_ID` sentinel all mean "no identifier".
#[must_use]
pub fn decode(value: &Value) -> Option<IntentIqId> {
    let present = match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty() && s != INVALID_ID,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    };
    present.then(|| IntentIqId {
        intent_iq_id: value.clone(),
    })
}

/// How the host should label the identifiers when building its eids list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EidDescriptor {
    pub source: &'static str,
    pub atype: u8,
}

pub const INTENT_IQ_EID: EidDescriptor = EidDescriptor {
    source: EID_SOURCE,
    atype: EID_ATYPE,
};

impl EidDescriptor {
    /// `source` of an eid object.
    #[must_use]
    pub fn source_of<'a>(&self, eid: &'a Value) -> Option<&'a str> {
        eid.get("source").and_then(Value::as_str)
    }

    /// `id` of the first uid.
    #[must_use]
    pub fn value_of<'a>(&self, eid: &'a Value) -> Option<&'a Value> {
        first_uid(eid).and_then(|uid| uid.get("id"))
    }

    /// `ext` of the first uid.
    #[must_use]
    pub fn ext_of<'a>(&self, eid: &'a Value) -> Option<&'a Value> {
        first_uid(eid).and_then(|uid| uid.get("ext"))
    }
}

fn first_uid(eid: &Value) -> Option<&Value> {
    eid.get("uids")?.as_array()?.first()
}
