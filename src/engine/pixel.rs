// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Best-effort sync pixel for paths that skip the resolution request.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::constants::SYNC_REFRESH_MILL;
use crate::metrics;
use crate::record::FirstPartyRecord;
use crate::state_store::IdentityStateStore;
use crate::transport::Transport;

/// Whether a pixel sync is due.
///
/// Opted-out users sync when first seen or when their last activity
/// (`date`, else `sCal`) is over an hour old. Everyone else is throttled by
/// the per-partner stamp.
#[must_use]
pub fn pixel_due(
    first_party: &FirstPartyRecord,
    last_sync: Option<i64>,
    new_user: bool,
    now: i64,
) -> bool {
    if first_party.opted_out() {
        let reference = first_party.date.or(first_party.s_cal).unwrap_or(now);
        return new_user || now - reference > SYNC_REFRESH_MILL;
    }
    match last_sync {
        None => true,
        Some(stamp) => now - stamp > SYNC_REFRESH_MILL,
    }
}

/// Send the pixel if due. Returns whether it was dispatched.
///
/// The request runs on a detached task; its outcome is only logged.
/// Without a tokio runtime nothing is sent or stamped.
pub fn sync_pixel(
    store: &IdentityStateStore,
    transport: Arc<dyn Transport>,
    first_party: &mut FirstPartyRecord,
    url: String,
    new_user: bool,
    now: i64,
) -> bool {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("No tokio runtime, sync pixel skipped");
        metrics::record_pixel_sync("skipped");
        return false;
    };
    if !pixel_due(first_party, store.last_pixel_sync(), new_user, now) {
        metrics::record_pixel_sync("throttled");
        return false;
    }

    if first_party.opted_out() {
        if first_party.date.is_some() {
            first_party.date = Some(now);
            store.save_first_party(first_party);
        }
    } else {
        store.stamp_pixel_sync(now);
    }

    metrics::record_request("pixel");
    runtime.spawn(async move {
        match transport.get(&url).await {
            Ok(_) => metrics::record_pixel_sync("sent"),
            Err(e) => {
                debug!(error = %e, "Sync pixel failed");
                metrics::record_transport_error("pixel");
                metrics::record_pixel_sync("failed");
            }
        }
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: i64 = SYNC_REFRESH_MILL;

    #[test]
    fn test_regular_user_throttled_by_stamp() {
        let record = FirstPartyRecord::default();
        assert!(pixel_due(&record, None, false, 10 * HOUR));
        assert!(!pixel_due(&record, Some(10 * HOUR - 10), false, 10 * HOUR));
        assert!(pixel_due(&record, Some(8 * HOUR), false, 10 * HOUR));
    }

    #[test]
    fn test_sync_without_runtime_is_skipped() {
        use crate::storage::memory::InMemoryStore;
        use crate::transport::HttpTransport;

        let store = IdentityStateStore::new(Arc::new(InMemoryStore::new()), 7, false);
        let mut record = FirstPartyRecord::default();
        let sent = sync_pixel(
            &store,
            Arc::new(HttpTransport::new()),
            &mut record,
            "https://sync.example.com/".into(),
            true,
            10 * HOUR,
        );

        assert!(!sent);
        assert!(store.last_pixel_sync().is_none());
    }

    #[test]
    fn test_opted_out_user_rules() {
        let mut record = FirstPartyRecord {
            is_opted_out: Some(true),
            date: Some(10 * HOUR),
            ..Default::default()
        };
        // Stamp is irrelevant for opted-out users
        assert!(!pixel_due(&record, None, false, 10 * HOUR + 5));
        assert!(pixel_due(&record, None, true, 10 * HOUR + 5));
        assert!(pixel_due(&record, Some(10 * HOUR), false, 12 * HOUR));

        record.date = None;
        record.s_cal = None;
        assert!(!pixel_due(&record, None, false, 12 * HOUR));
    }
}
