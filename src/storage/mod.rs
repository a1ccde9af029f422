// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pluggable key/value persistence.
//!
//! - [`traits`]: the [`KeyValueStore`](traits::KeyValueStore) seam and [`StorageError`](traits::StorageError)
//! - [`memory`]: DashMap-backed store (tests, server-side hosts)
//! - [`router`]: storage-type preference routing over several backends

pub mod traits;
pub mod memory;
pub mod router;
