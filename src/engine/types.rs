// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public result types of [`super::IdentityEngine::get_id`].

use std::sync::Arc;

use tracing::{debug, warn};

use super::scheduler::CompletionToken;
use crate::clock::Clock;
use crate::metrics::{self, LatencyTimer};
use crate::record::Eid;
use crate::response::ResponseProcessor;
use crate::session::Session;
use crate::state_store::IdentityStateStore;
use crate::transport::Transport;

/// Outcome of `get_id`.
#[derive(Debug)]
pub enum IdResponse {
    /// No identity work was done (invalid config or blacklisted browser).
    /// The callback has already fired with an empty result.
    Skipped,
    /// Served without a resolution request. The callback has already fired.
    Cached(Vec<Eid>),
    /// A resolution request is pending; await [`PendingResolution::resolve`].
    Deferred(PendingResolution),
}

impl IdResponse {
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }

    /// Eids available right now, without waiting on the network.
    #[must_use]
    pub fn immediate_eids(&self) -> &[Eid] {
        match self {
            Self::Skipped => &[],
            Self::Cached(eids) => eids,
            Self::Deferred(pending) => pending.cached(),
        }
    }
}

impl std::fmt::Display for IdResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped => write!(f, "Skipped"),
            Self::Cached(eids) => write!(f, "Cached({} eids)", eids.len()),
            Self::Deferred(pending) => write!(f, "Deferred({} cached eids)", pending.cached().len()),
        }
    }
}

/// A resolution request built and ready to send.
///
/// The completion timer is already running when this is returned: if
/// `resolve` is not awaited in time, the callback receives the cached eids.
pub struct PendingResolution {
    pub(crate) url: String,
    pub(crate) cached: Vec<Eid>,
    pub(crate) session: Session,
    pub(crate) store: IdentityStateStore,
    pub(crate) processor: ResponseProcessor,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) token: CompletionToken,
}

impl PendingResolution {
    /// Cached eids, empty for the withheld group.
    #[must_use]
    pub fn cached(&self) -> &[Eid] {
        if self.token.is_withheld() {
            &[]
        } else {
            &self.cached
        }
    }

    /// Resolution URL that will be requested.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send the request, apply the reply and deliver the completion (unless
    /// the timer already did). Returns the eids the caller may use.
    ///
    /// Never fails: transport errors resolve to the cached eids.
    #[tracing::instrument(skip(self), fields(partner = self.session.partner))]
    pub async fn resolve(mut self) -> Vec<Eid> {
        let start = self.clock.now_ms();
        self.session.request_start = Some(start);
        self.session.partner_record.wsrvcll = true;
        self.session.counters.reset();
        self.session.persist_partner(&self.store);

        metrics::record_request("resolution");
        let result = {
            let _timer = LatencyTimer::new("resolution");
            self.transport.get(&self.url).await
        };
        let now = self.clock.now_ms();

        match result {
            Ok(body) => {
                let outcome = self.processor.process(&body, &mut self.session, now);
                debug!(outcome = outcome.as_str(), rtt_ms = now - start, "Resolution completed");
            }
            Err(e) => {
                warn!(error = %e, "Resolution request failed");
                metrics::record_transport_error("resolution");
                self.session.counters.record_failure();
                self.session.counters.record_outcome(self.session.runtime_eids.len());
                self.session.persist_partner(&self.store);
            }
        }

        let eids = if self.token.is_withheld() {
            Vec::new()
        } else {
            self.session.runtime_eids
        };
        self.token.fire(eids.clone(), "response");
        eids
    }
}

impl std::fmt::Debug for PendingResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResolution")
            .field("url", &self.url)
            .field("cached", &self.cached.len())
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
