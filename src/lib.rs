// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Identity Sync Engine
//!
//! Client-side identity resolution and sync for ad-tech pipelines.
//!
//! The engine keeps a stable pseudonymous first-party identifier per browser,
//! decides whether cached partner identifiers are still fresh, calls the
//! resolution service when they are not, and hands the resulting external
//! identifiers (eids) to the caller exactly once.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       IdentityEngine                        │
//! │  • get_id(config, hooks, context)                          │
//! │  • Cached / Deferred / Skipped                             │
//! └─────────────────────────────────────────────────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────┐
//! │   ConsentGate    │ │  RequestBuilder  │ │ ResponseProcessor│
//! │  should_refresh  │ │ resolution/pixel │ │  reply → records │
//! └──────────────────┘ └──────────────────┘ └──────────────────┘
//!            │                                         │
//!            ▼                                         ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    IdentityStateStore                       │
//! │  • first-party record, partner record, client hints        │
//! │  • StorageRouter over html5 / cookie KeyValueStores        │
//! │  • eids cached as ChaCha20-Poly1305 ciphertext only        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use identity_sync::{Hooks, IdentityConfig, IdentityEngine, IdResponse, InMemoryStore, PageContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = IdentityEngine::new(Arc::new(InMemoryStore::new()));
//!     let config = IdentityConfig::for_partner(7);
//!     let hooks = Hooks::with_callback(|eids| println!("callback: {} eids", eids.len()));
//!
//!     match engine.get_id(&config, hooks, &PageContext::default()).await {
//!         IdResponse::Cached(eids) => println!("cached: {:?}", eids),
//!         IdResponse::Deferred(pending) => println!("resolved: {:?}", pending.resolve().await),
//!         IdResponse::Skipped => println!("skipped"),
//!     }
//! }
//! ```
//!
//! ## Modules
//!
//! - [`engine`]: [`IdentityEngine`], completion token, pixel fallback
//! - [`consent`]: consent signals and the refresh gate
//! - [`request`]: resolution / pixel URL assembly
//! - [`response`]: reply state machine
//! - [`storage`]: key/value backends and storage-type routing
//! - [`cipher`]: payload encryption

pub mod cipher;
pub mod clock;
pub mod config;
pub mod consent;
pub mod constants;
pub mod context;
pub mod eids;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod metrics;
pub mod record;
pub mod request;
pub mod response;
pub mod session;
pub mod state_store;
pub mod storage;
pub mod telemetry;
pub mod transport;

pub use cipher::{ChaChaCipher, CipherError, PayloadCipher};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::IdentityConfig;
pub use consent::{should_refresh, ConsentSignals, GateInput, RefreshDecision, RefreshReason};
pub use context::{DeviceInfo, PageContext};
pub use eids::{decode, IntentIqId, INTENT_IQ_EID};
pub use engine::{IdResponse, IdentityEngine, PendingResolution};
pub use error::IdentityError;
pub use hooks::{Hooks, PartnerCallback, TargetingReporter};
pub use metrics::LatencyTimer;
pub use record::{CachedData, Eid, EidsEnvelope, FirstPartyRecord, Group, PartnerCacheRecord};
pub use request::client_hints::ClientHints;
pub use request::params::AdditionalParam;
pub use storage::memory::InMemoryStore;
pub use storage::traits::{KeyValueStore, StorageError, StorageType};
pub use telemetry::TelemetryCounters;
pub use transport::{HttpTransport, Transport, TransportError};
