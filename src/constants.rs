// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Fixed keys, sentinels and timing constants shared across the engine.

/// Storage key of the first-party record (suffixed with `_p_{partner}` when siloed).
pub const FIRST_PARTY_KEY: &str = "_iiq_fdata";

/// Storage key of the encoded client-hints snapshot.
pub const CLIENT_HINTS_KEY: &str = "_iiq_ch";

/// Prefix of the per-partner pixel last-sync stamp.
pub const SYNC_KEY_PREFIX: &str = "_iiq_sync";

/// Placeholder written into consent fields of a freshly created first-party record.
pub const EMPTY: &str = "EMPTY";

/// Sentinel stored when the resolution service explicitly returned no identifier.
pub const INVALID_ID: &str = "INVALID_ID";

/// Client version reported as `jsver`.
pub const VERSION: &str = "0.29";

/// Attribution tag reported as `source`.
pub const SOURCE_TAG: &str = "pbjs";

/// Default cache lifetime and daily refresh interval (ms).
pub const HOURS_24: i64 = 86_400_000;

/// Minimum interval between two pixel syncs (ms).
pub const SYNC_REFRESH_MILL: i64 = 3_600_000;

/// Fold base for source-metadata translation.
pub const META_DATA_CONSTANT: u64 = 256;

/// Termination cause that places the user in the withheld group.
pub const TC_WITHHELD: i64 = 41;

/// Default completion timeout (ms).
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Default targeting key used when reporting the A/B group.
pub const DEFAULT_GAM_PARAMETER: &str = "intent_iq_group";

pub const DEFAULT_SERVER_ADDRESS: &str = "https://api.intentiq.com";
pub const GDPR_SERVER_ADDRESS: &str = "https://api-gdpr.intentiq.com";
pub const DEFAULT_PIXEL_ADDRESS: &str = "https://sync.intentiq.com";
pub const GDPR_PIXEL_ADDRESS: &str = "https://sync-gdpr.intentiq.com";

/// Servlet path shared by the resolution and pixel endpoints.
pub const SERVLET_PATH: &str = "/profiles_engine/ProfilesEngineServlet";

/// Source reported in the eids descriptor.
pub const EID_SOURCE: &str = "intentiq.com";

/// Agent type reported in the eids descriptor.
pub const EID_ATYPE: u8 = 1;

/// Key of the per-partner pixel last-sync stamp.
#[must_use]
pub fn sync_key(partner: i64) -> String {
    format!("{}_{}", SYNC_KEY_PREFIX, partner)
}

/// Key of the first-party record, honouring the per-partner silo.
#[must_use]
pub fn first_party_key(partner: i64, silo_enabled: bool) -> String {
    if silo_enabled {
        format!("{}_p_{}", FIRST_PARTY_KEY, partner)
    } else {
        FIRST_PARTY_KEY.to_string()
    }
}

/// Key of the partner cache record.
#[must_use]
pub fn partner_key(partner: i64) -> String {
    format!("{}_{}", FIRST_PARTY_KEY, partner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_party_key_silo() {
        assert_eq!(first_party_key(7, false), "_iiq_fdata");
        assert_eq!(first_party_key(7, true), "_iiq_fdata_p_7");
    }

    #[test]
    fn test_partner_and_sync_keys() {
        assert_eq!(partner_key(42), "_iiq_fdata_42");
        assert_eq!(sync_key(42), "_iiq_sync_42");
    }
}
