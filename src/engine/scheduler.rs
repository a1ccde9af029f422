// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Exactly-once completion delivery.
//!
//! A [`CompletionToken`] holds the caller's callback in a take-once slot.
//! Whichever path gets there first (cached serve, reply, transport failure
//! or the timeout task) delivers; every later attempt is a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::hooks::PartnerCallback;
use crate::metrics;
use crate::record::Eid;

struct TokenInner {
    callback: Mutex<Option<PartnerCallback>>,
    fired: AtomicBool,
    /// Withheld group: deliveries are always empty.
    withheld: bool,
    timer: Mutex<Option<AbortHandle>>,
}

#[derive(Clone)]
pub struct CompletionToken {
    inner: Arc<TokenInner>,
}

impl CompletionToken {
    pub fn new(callback: Option<PartnerCallback>, withheld: bool) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                callback: Mutex::new(callback),
                fired: AtomicBool::new(false),
                withheld,
                timer: Mutex::new(None),
            }),
        }
    }

    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_withheld(&self) -> bool {
        self.inner.withheld
    }

    /// Deliver `eids` unless already delivered. Returns whether this call
    /// was the one that delivered.
    pub fn fire(&self, eids: Vec<Eid>, path: &'static str) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            trace!(path, "Completion already delivered");
            return false;
        }
        self.disarm();

        let eids = if self.inner.withheld { Vec::new() } else { eids };
        let callback = self.inner.callback.lock().take();
        metrics::record_callback(path);
        debug!(path, eids = eids.len(), "Delivering completion");
        if let Some(callback) = callback {
            callback(eids);
        }
        true
    }

    /// Start the timeout race. On expiry `fallback` is delivered.
    ///
    /// Outside a tokio runtime no timer is started and delivery is left to
    /// the response path.
    pub fn arm(&self, timeout: Duration, fallback: Vec<Eid>) {
        if self.is_fired() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No tokio runtime, completion timeout not armed");
            return;
        };
        let token = self.clone();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if token.fire(fallback, "timeout") {
                metrics::record_timeout();
                debug!(timeout_ms = timeout.as_millis() as u64, "Completion timed out, cached result delivered");
            }
        });
        *self.inner.timer.lock() = Some(handle.abort_handle());

        // Fired between the check and the store
        if self.is_fired() {
            self.disarm();
        }
    }

    /// Abort the timeout task, if any.
    pub fn disarm(&self) {
        if let Some(handle) = self.inner.timer.lock().take() {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for CompletionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionToken")
            .field("fired", &self.is_fired())
            .field("withheld", &self.inner.withheld)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn recording() -> (Arc<Mutex<Vec<Vec<Eid>>>>, PartnerCallback) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        (calls, Box::new(move |eids| sink.lock().push(eids)))
    }

    #[test]
    fn test_fires_exactly_once() {
        let (calls, callback) = recording();
        let token = CompletionToken::new(Some(callback), false);

        assert!(token.fire(vec![json!(1)], "cached"));
        assert!(!token.fire(vec![json!(2)], "response"));
        assert!(token.is_fired());
        assert_eq!(*calls.lock(), vec![vec![json!(1)]]);
    }

    #[test]
    fn test_arm_without_runtime_is_noop() {
        let (calls, callback) = recording();
        let token = CompletionToken::new(Some(callback), false);

        token.arm(Duration::from_millis(10), vec![json!(1)]);
        assert!(!token.is_fired());
        assert!(token.fire(vec![json!(2)], "response"));
        assert_eq!(*calls.lock(), vec![vec![json!(2)]]);
    }

    #[test]
    fn test_withheld_delivers_empty() {
        let (calls, callback) = recording();
        let token = CompletionToken::new(Some(callback), true);
        token.fire(vec![json!(1)], "cached");
        assert_eq!(*calls.lock(), vec![Vec::<Eid>::new()]);
    }

    #[test]
    fn test_without_callback_still_marks_fired() {
        let token = CompletionToken::new(None, false);
        assert!(token.fire(Vec::new(), "skipped"));
        assert!(!token.fire(Vec::new(), "skipped"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_delivers_fallback() {
        let (calls, callback) = recording();
        let token = CompletionToken::new(Some(callback), false);
        token.arm(Duration::from_millis(500), vec![json!("cached")]);

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(calls.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*calls.lock(), vec![vec![json!("cached")]]);
        assert!(!token.fire(vec![json!("late")], "response"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fire_disarms_timer() {
        let (calls, callback) = recording();
        let token = CompletionToken::new(Some(callback), false);
        token.arm(Duration::from_millis(500), vec![json!("cached")]);

        token.fire(vec![json!("fresh")], "response");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*calls.lock(), vec![vec![json!("fresh")]]);
    }

    #[tokio::test]
    async fn test_arm_after_fire_is_noop() {
        let token = CompletionToken::new(None, false);
        token.fire(Vec::new(), "cached");
        token.arm(Duration::from_millis(1), Vec::new());
        assert!(token.inner.timer.lock().is_none());
    }
}
