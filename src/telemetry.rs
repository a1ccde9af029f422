// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-partner telemetry counters.
//!
//! The counters travel inside the partner cache record and are reported to
//! the service on the next request (`jaesc`, `jafc`, `jaensc`). They are
//! loaded at the start of every `get_id`, reset right before each outbound
//! request and ticked once per cycle outcome.

use crate::record::PartnerCacheRecord;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryCounters {
    /// Cycles that ended with identifiers.
    pub call_count: u64,
    /// Transport failures.
    pub fail_count: u64,
    /// Cycles that ended without identifiers.
    pub no_data_count: u64,
}

impl TelemetryCounters {
    #[must_use]
    pub fn from_record(record: &PartnerCacheRecord) -> Self {
        Self {
            call_count: record.call_count,
            fail_count: record.fail_count,
            no_data_count: record.no_data_counter,
        }
    }

    pub fn store_into(&self, record: &mut PartnerCacheRecord) {
        record.call_count = self.call_count;
        record.fail_count = self.fail_count;
        record.no_data_counter = self.no_data_count;
    }

    /// Start of a new outbound request cycle.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Tick success or no-data depending on how many eids the cycle produced.
    pub fn record_outcome(&mut self, eid_count: usize) {
        if eid_count == 0 {
            self.record_no_data();
        } else {
            self.call_count += 1;
            crate::metrics::record_outcome("success");
        }
    }

    pub fn record_no_data(&mut self) {
        self.no_data_count += 1;
        crate::metrics::record_outcome("no_data");
    }

    pub fn record_failure(&mut self) {
        self.fail_count += 1;
        crate::metrics::record_outcome("failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_store() {
        let mut record = PartnerCacheRecord {
            call_count: 4,
            fail_count: 1,
            no_data_counter: 2,
            ..Default::default()
        };
        let mut counters = TelemetryCounters::from_record(&record);
        assert_eq!(counters.call_count, 4);

        counters.record_outcome(3);
        counters.record_failure();
        counters.store_into(&mut record);

        assert_eq!(record.call_count, 5);
        assert_eq!(record.fail_count, 2);
        assert_eq!(record.no_data_counter, 2);
    }

    #[test]
    fn test_outcome_ticks() {
        let mut counters = TelemetryCounters::default();
        counters.record_outcome(0);
        counters.record_outcome(0);
        counters.record_outcome(1);
        assert_eq!(counters.no_data_count, 2);
        assert_eq!(counters.call_count, 1);
        assert_eq!(counters.fail_count, 0);
    }

    #[test]
    fn test_reset_clears_all_three() {
        let mut counters = TelemetryCounters {
            call_count: 9,
            fail_count: 9,
            no_data_count: 9,
        };
        counters.reset();
        assert_eq!(counters, TelemetryCounters::default());
    }
}
