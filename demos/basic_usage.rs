// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic identity-engine usage example.
//!
//! Demonstrates:
//! 1. A first visit: identifier created, resolution request sent
//! 2. A second visit: cached eids served without a request
//! 3. The stored partner record (payload is ciphertext only)
//! 4. Displaying metrics (OTEL-compatible)
//!
//! The resolution service is replaced by a canned transport so the example
//! runs offline.
//!
//! # Run
//!
//! ```bash
//! cargo run --example basic_usage
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use identity_sync::{
    Hooks, IdResponse, IdentityConfig, IdentityEngine, InMemoryStore, KeyValueStore, PageContext, Transport,
    TransportError,
};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;

/// Answers every resolution request with one eid and every pixel with `{}`.
struct CannedTransport;

#[async_trait]
impl Transport for CannedTransport {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        if url.contains("at=20") {
            return Ok("{}".into());
        }
        let reply = json!({
            "cttl": 43_200_000,
            "tc": 2,
            "ls": true,
            "ct": 1,
            "data": {
                "eids": [{
                    "source": "intentiq.com",
                    "uids": [{ "id": "demo-identifier-0001", "atype": 1 }]
                }]
            }
        });
        Ok(reply.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for OTEL export)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║         identity-sync-engine: Basic Usage Example             ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure the engine
    // ─────────────────────────────────────────────────────────────────────────
    let store = Arc::new(InMemoryStore::new());
    let engine = IdentityEngine::new(store.clone()).with_transport(Arc::new(CannedTransport));

    let config: IdentityConfig = serde_json::from_value(json!({
        "partner": 7,
        "timeoutInMillis": 800,
        "browserBlackList": "opera",
        "enabledStorageTypes": ["html5"],
    }))?;
    let context: PageContext = serde_json::from_value(json!({
        "browser": "chrome",
        "referrer": "https://news.example.com/article",
        "device": {
            "windowInnerHeight": 900,
            "windowInnerWidth": 1440,
            "devicePixelRatio": 2.0,
            "windowScreenHeight": 1080,
            "windowScreenWidth": 1920,
            "language": "en-US"
        },
        "consent": { "uspString": "1YNN" }
    }))?;

    // ─────────────────────────────────────────────────────────────────────────
    // 2. First visit: nothing cached, resolution goes to the service
    // ─────────────────────────────────────────────────────────────────────────
    println!("🌐 First visit...");
    let hooks = Hooks::with_callback(|eids| println!("   callback: {} eid(s)", eids.len()))
        .on_group_changed(|group| println!("   group: {}", group.as_str()));

    match engine.get_id(&config, hooks, &context).await {
        IdResponse::Deferred(pending) => {
            println!("   └─ request: {}", pending.url());
            let eids = pending.resolve().await;
            println!("   └─ resolved {} eid(s): {}", eids.len(), serde_json::to_string(&eids)?);
        }
        other => println!("   └─ {}", other),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Second visit: fresh cache, no request
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔁 Second visit...");
    let hooks = Hooks::with_callback(|eids| println!("   callback: {} eid(s)", eids.len()));
    let response = engine.get_id(&config, hooks, &context).await;
    println!("   └─ {} (deferred: {})", response, response.is_deferred());

    // ─────────────────────────────────────────────────────────────────────────
    // 4. What was persisted
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n💾 Stored records:");
    for key in ["_iiq_fdata", "_iiq_fdata_7"] {
        let value = store.get(key)?.unwrap_or_default();
        println!("   ├─ {} = {}", key, value);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Metrics:");
    dump_metrics(&snapshotter);

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

/// Dump all captured metrics in OTEL-compatible format
fn dump_metrics(snapshotter: &Snapshotter) {
    let snapshot = snapshotter.snapshot();

    let mut counters: Vec<_> = vec![];
    let mut histograms: Vec<_> = vec![];

    for (composite_key, _, _, value) in snapshot.into_vec() {
        let (_, key) = composite_key.into_parts();
        let name = key.name().to_string();
        let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
        let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };

        match value {
            DebugValue::Counter(v) => counters.push((name, label_str, v)),
            DebugValue::Gauge(_) => {}
            DebugValue::Histogram(samples) => {
                let count = samples.len();
                let sum: f64 = samples.iter().map(|v| v.into_inner()).sum();
                histograms.push((name, label_str, count, sum));
            }
        }
    }

    counters.sort_by(|a, b| a.0.cmp(&b.0));
    histograms.sort_by(|a, b| a.0.cmp(&b.0));

    if !counters.is_empty() {
        println!("   ┌─ Counters (cumulative)");
        for (name, labels, value) in &counters {
            println!("   │  └─ {}{} = {}", name, labels, value);
        }
    }
    if !histograms.is_empty() {
        println!("   └─ Histograms");
        for (name, labels, count, sum) in &histograms {
            println!("      └─ {}{} count={} sum={:.4}", name, labels, count, sum);
        }
    }
}
