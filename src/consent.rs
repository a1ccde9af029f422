// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Consent signals and the refresh gate.
//!
//! [`should_refresh`] is a pure function: it only looks at the current
//! consent signals, the stored records and the time it is handed. Rules are
//! evaluated in order and the first match wins:
//!
//! ```text
//! 1. consent fingerprint changed          → Refresh(ConsentChanged)
//! 2. no successful sync yet (sCal)        → Refresh(NeverSynced)
//! 3. partner record expired / incomplete  → Refresh(CacheExpired)
//! 4. no partner record, not opted out     → Refresh(Bootstrap)
//! 5. now > sCal + 24h                     → Refresh(DailyRefresh)
//!    otherwise                            → Serve
//! ```

use serde::Deserialize;

use crate::constants::HOURS_24;
use crate::record::{FirstPartyRecord, PartnerCacheRecord};

/// Privacy signals collected by the host's consent management platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentSignals {
    #[serde(default)]
    pub gdpr_applies: bool,
    #[serde(default)]
    pub gdpr_string: String,
    #[serde(default)]
    pub gpp_string: String,
    #[serde(default)]
    pub usp_string: String,
}

impl ConsentSignals {
    /// Concatenation compared against the stored strings.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        format!("{}{}{}", self.gdpr_string, self.gpp_string, self.usp_string)
    }

    /// A GDPR consent string is present (regulatory signal detected).
    #[must_use]
    pub fn gdpr_detected(&self) -> bool {
        !self.gdpr_string.is_empty()
    }

    /// Copy the signals into the first-party record.
    pub fn apply_to(&self, record: &mut FirstPartyRecord) {
        record.usp_string = self.usp_string.clone();
        record.gpp_string = self.gpp_string.clone();
        record.gdpr_string = self.gdpr_string.clone();
    }
}

/// Fingerprint of the strings stored on a first-party record.
#[must_use]
pub fn stored_fingerprint(record: &FirstPartyRecord) -> String {
    format!("{}{}{}", record.gdpr_string, record.gpp_string, record.usp_string)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    ConsentChanged,
    NeverSynced,
    CacheExpired,
    Bootstrap,
    DailyRefresh,
}

impl RefreshReason {
    /// Reasons that also require the consent strings to be copied into the
    /// record and both records persisted before any request.
    #[must_use]
    pub fn invalidates_cache(&self) -> bool {
        matches!(self, Self::ConsentChanged | Self::NeverSynced | Self::CacheExpired)
    }

    /// Whether an opted-out user still needs the full resolution request.
    /// Only a resolution reply can revoke an opt-out, so consent changes and
    /// first contact go to the service; routine expiry only pings the pixel.
    #[must_use]
    pub fn requires_resolution_when_opted_out(&self) -> bool {
        matches!(self, Self::ConsentChanged | Self::NeverSynced | Self::Bootstrap)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConsentChanged => "consent_changed",
            Self::NeverSynced => "never_synced",
            Self::CacheExpired => "cache_expired",
            Self::Bootstrap => "bootstrap",
            Self::DailyRefresh => "daily_refresh",
        }
    }
}

impl std::fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshDecision {
    /// Cached state is good, no network call.
    Serve,
    Refresh(RefreshReason),
}

impl RefreshDecision {
    #[must_use]
    pub fn is_refresh(&self) -> bool {
        matches!(self, Self::Refresh(_))
    }

    #[must_use]
    pub fn reason(&self) -> Option<RefreshReason> {
        match self {
            Self::Serve => None,
            Self::Refresh(reason) => Some(*reason),
        }
    }
}

/// Inputs of the refresh gate.
#[derive(Debug, Clone, Copy)]
pub struct GateInput<'a> {
    pub current: &'a ConsentSignals,
    pub first_party: &'a FirstPartyRecord,
    /// `None` when no partner record was stored yet.
    pub partner: Option<&'a PartnerCacheRecord>,
    pub now: i64,
}

/// Decide whether the cached identity must be refreshed from the service.
#[must_use]
pub fn should_refresh(input: GateInput<'_>) -> RefreshDecision {
    let fp = input.first_party;

    if input.current.fingerprint() != stored_fingerprint(fp) {
        return RefreshDecision::Refresh(RefreshReason::ConsentChanged);
    }

    let Some(s_cal) = fp.s_cal.filter(|t| *t > 0) else {
        return RefreshDecision::Refresh(RefreshReason::NeverSynced);
    };

    if let Some(partner) = input.partner {
        let expired = match (partner.cttl.filter(|c| *c > 0), partner.date.filter(|d| *d > 0)) {
            (Some(cttl), Some(date)) => input.now - date > cttl,
            _ => true,
        };
        if expired {
            return RefreshDecision::Refresh(RefreshReason::CacheExpired);
        }
    } else if !fp.opted_out() {
        return RefreshDecision::Refresh(RefreshReason::Bootstrap);
    }

    if input.now > s_cal + HOURS_24 {
        RefreshDecision::Refresh(RefreshReason::DailyRefresh)
    } else {
        RefreshDecision::Serve
    }
}
