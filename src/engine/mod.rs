// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Identity engine entry point.
//!
//! [`IdentityEngine::get_id`] runs one identity cycle:
//!
//! ```text
//!  load records ──► consent gate ──┬─ Serve ───────────► callback, Cached(eids)
//!                                  │
//!                                  ├─ blacklisted ─────► pixel, Skipped
//!                                  │
//!                                  ├─ opted out, stale ► pixel, Cached([])
//!                                  │
//!                                  └─ Refresh ─────────► arm timer, Deferred(pending)
//!                                                            │
//!                                        pending.resolve() ──┴─► reply → persist → callback
//! ```
//!
//! The completion callback fires exactly once per call, on whichever path
//! reaches it first.

pub mod pixel;
pub mod scheduler;
pub mod types;

use std::sync::Arc;

use rand::Rng;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cipher::{open_eids, ChaChaCipher, PayloadCipher};
use crate::clock::{Clock, SystemClock};
use crate::config::IdentityConfig;
use crate::consent::{should_refresh, GateInput, RefreshDecision};
use crate::context::PageContext;
use crate::hooks::{GroupNotifier, Hooks};
use crate::metrics;
use crate::record::{CachedData, FirstPartyRecord, Group};
use crate::request::client_hints::encode_client_hints;
use crate::request::{pixel_url, resolution_url, RequestInput};
use crate::response::ResponseProcessor;
use crate::session::Session;
use crate::state_store::IdentityStateStore;
use crate::storage::router::{define_storage_types, StorageRouter};
use crate::storage::traits::{KeyValueStore, StorageType};
use crate::transport::{HttpTransport, Transport};

use self::pixel::sync_pixel;
use self::scheduler::CompletionToken;
pub use self::types::{IdResponse, PendingResolution};

/// Identity resolution and sync engine.
///
/// Holds the host-provided collaborators; per-call settings come in through
/// [`IdentityConfig`] and [`Hooks`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use identity_sync::{Hooks, IdentityConfig, IdentityEngine, IdResponse, InMemoryStore, PageContext};
///
/// # async fn example() {
/// let engine = IdentityEngine::new(Arc::new(InMemoryStore::new()));
/// let config = IdentityConfig::for_partner(7);
/// let hooks = Hooks::with_callback(|eids| println!("{} eids", eids.len()));
///
/// if let IdResponse::Deferred(pending) = engine.get_id(&config, hooks, &PageContext::default()).await {
///     let eids = pending.resolve().await;
///     println!("resolved {} eids", eids.len());
/// }
/// # }
/// ```
pub struct IdentityEngine {
    backends: Vec<(StorageType, Arc<dyn KeyValueStore>)>,
    transport: Arc<dyn Transport>,
    cipher: Arc<dyn PayloadCipher>,
    clock: Arc<dyn Clock>,
}

impl IdentityEngine {
    /// Engine backed by a single `html5` store, the HTTP transport, the
    /// default cipher and the system clock.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            backends: vec![(StorageType::Html5, store)],
            transport: Arc::new(HttpTransport::new()),
            cipher: Arc::new(ChaChaCipher::default()),
            clock: Arc::new(SystemClock),
        }
    }

    /// Register (or replace) the backend for a storage type.
    #[must_use]
    pub fn with_backend(mut self, storage_type: StorageType, store: Arc<dyn KeyValueStore>) -> Self {
        self.backends.retain(|(t, _)| *t != storage_type);
        self.backends.push((storage_type, store));
        self
    }

    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn state_store(&self, config: &IdentityConfig, partner: i64) -> IdentityStateStore {
        let allowed = define_storage_types(&config.enabled_storage_types);
        let router = StorageRouter::new(self.backends.clone(), allowed);
        IdentityStateStore::new(Arc::new(router), partner, config.silo_enabled)
    }

    /// Complete or create the first-party record. Returns it with whether
    /// the browser is seen for the first time.
    fn init_first_party(
        &self,
        store: &IdentityStateStore,
        stored: Option<FirstPartyRecord>,
        now: i64,
    ) -> (FirstPartyRecord, bool) {
        match stored {
            Some(mut record) if record.pcid.as_deref().is_some_and(|p| !p.is_empty()) => {
                if record.pcid_date.is_none() {
                    record.pcid_date = Some(now);
                    store.save_first_party(&record);
                }
                (record, false)
            }
            _ => {
                let record = FirstPartyRecord::new(Uuid::new_v4().to_string(), now);
                store.save_first_party(&record);
                info!(pcid = record.pcid.as_deref().unwrap_or_default(), "Created first-party identifier");
                (record, true)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn send_pixel(
        &self,
        store: &IdentityStateStore,
        config: &IdentityConfig,
        session: &mut Session,
        context: &PageContext,
        client_hints: Option<&str>,
        now: i64,
        nonce: u32,
        new_user: bool,
    ) -> bool {
        let url = pixel_url(&request_input(config, session, context, client_hints, now, nonce));
        sync_pixel(store, self.transport.clone(), &mut session.first_party, url, new_user, now)
    }

    /// Run one identity cycle for `config.partner`.
    ///
    /// Never fails: configuration, storage, decode and transport problems
    /// are logged and turned into an empty or cached result.
    ///
    /// Expects to be polled inside a tokio runtime, which drives the
    /// completion timer and the sync pixel. Without one both are skipped
    /// and the callback is delivered by the cached or response path.
    #[tracing::instrument(skip_all, fields(partner = ?config.partner))]
    pub async fn get_id(&self, config: &IdentityConfig, hooks: Hooks, context: &PageContext) -> IdResponse {
        let Hooks {
            callback,
            group_changed,
            targeting,
        } = hooks;

        let partner = match config.partner() {
            Ok(partner) => partner,
            Err(e) => {
                error!(error = %e, "Identity resolution skipped");
                CompletionToken::new(callback, false).fire(Vec::new(), "skipped");
                return IdResponse::Skipped;
            }
        };

        let now = self.clock.now_ms();
        let store = self.state_store(config, partner);
        let notifier = GroupNotifier::new(group_changed, targeting, config.gam_parameter_name.clone());

        let stored = store.load_first_party();
        let stored_group = stored.as_ref().map(|r| r.group).unwrap_or_default();
        let withheld = stored_group == Group::WithoutIiq;
        notifier.report(stored_group);
        notifier.changed(stored_group);
        let token = CompletionToken::new(callback, withheld);

        let (mut first_party, new_user) = self.init_first_party(&store, stored, now);
        if context.consent.gdpr_detected() && first_party.is_opted_out.is_none() {
            first_party.is_opted_out = Some(true);
        }

        let fresh_hints = context
            .client_hints
            .as_ref()
            .map(encode_client_hints)
            .filter(|h| !h.is_empty());
        let client_hints = match fresh_hints {
            Some(encoded) => {
                if !first_party.opted_out() {
                    store.save_client_hints(&encoded);
                }
                Some(encoded)
            }
            None => store.load_client_hints(),
        };

        let mut partner_record = store.load_partner();
        if let Some(record) = partner_record.as_mut().filter(|r| r.wsrvcll) {
            record.wsrvcll = false;
            if !first_party.opted_out() {
                store.save_partner(record);
            }
        }

        let mut session = Session::new(partner, first_party, partner_record);
        if let Some(envelope) = session
            .partner_record
            .data
            .as_ref()
            .and_then(|data| open_eids(self.cipher.as_ref(), data))
        {
            session.runtime_eids = envelope.eids;
        }
        metrics::set_cached_eids(session.runtime_eids.len());

        let decision = should_refresh(GateInput {
            current: &context.consent,
            first_party: &session.first_party,
            partner: session.partner_existed.then_some(&session.partner_record),
            now,
        });
        metrics::record_decision(decision.reason().map_or("serve", |r| r.as_str()));
        debug!(decision = ?decision, cached_eids = session.runtime_eids.len(), "Refresh decision");

        if decision.reason().is_some_and(|r| r.invalidates_cache()) {
            context.consent.apply_to(&mut session.first_party);
            session.persist_all(&store);
        }

        if session.first_party.opted_out() {
            session.partner_record.data = Some(CachedData::Empty);
            session.runtime_eids.clear();
            token.fire(Vec::new(), "opted_out");
        }
        if withheld || !session.runtime_eids.is_empty() {
            token.fire(session.runtime_eids.clone(), "cached");
        }

        let client_hints = client_hints.as_deref();
        let nonce = rand::thread_rng().gen_range(0..1000);
        let browser = context.browser_lowercase();

        if config.is_blacklisted(&browser) {
            error!(browser = %browser, "Browser is blacklisted, identifiers will not be provided");
            token.fire(Vec::new(), "skipped");
            self.send_pixel(&store, config, &mut session, context, client_hints, now, nonce, new_user);
            return IdResponse::Skipped;
        }

        let reason = match decision {
            RefreshDecision::Serve => {
                let eids = if withheld { Vec::new() } else { session.runtime_eids.clone() };
                token.fire(eids.clone(), "cached");
                session.counters.record_outcome(eids.len());
                session.persist_partner(&store);
                return IdResponse::Cached(eids);
            }
            RefreshDecision::Refresh(reason) => reason,
        };

        if session.first_party.opted_out() && !reason.requires_resolution_when_opted_out() {
            debug!(reason = %reason, "Opted out, syncing pixel instead of resolving");
            self.send_pixel(&store, config, &mut session, context, client_hints, now, nonce, new_user);
            return IdResponse::Cached(Vec::new());
        }

        let url = resolution_url(&request_input(config, &session, context, client_hints, now, nonce));
        let cached = session.runtime_eids.clone();
        token.arm(config.timeout(), cached.clone());
        info!(reason = %reason, new_user, "Resolution request prepared");

        IdResponse::Deferred(PendingResolution {
            url,
            cached,
            processor: ResponseProcessor::new(store.clone(), self.cipher.clone(), notifier),
            session,
            store,
            transport: self.transport.clone(),
            clock: self.clock.clone(),
            token,
        })
    }
}

fn request_input<'a>(
    config: &'a IdentityConfig,
    session: &'a Session,
    context: &'a PageContext,
    client_hints: Option<&'a str>,
    now: i64,
    nonce: u32,
) -> RequestInput<'a> {
    RequestInput {
        config,
        partner: session.partner,
        first_party: &session.first_party,
        partner_record: &session.partner_record,
        counters: session.counters,
        context,
        client_hints,
        now,
        nonce,
    }
}

impl std::fmt::Debug for IdentityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<StorageType> = self.backends.iter().map(|(t, _)| *t).collect();
        f.debug_struct("IdentityEngine")
            .field("backends", &types)
            .finish_non_exhaustive()
    }
}
