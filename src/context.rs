// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Page-level inputs collected by the host.
//!
//! Browser detection, screen measurement, referrer resolution, consent
//! collection and high-entropy client hints all live outside the engine. The
//! host gathers them once per page and hands them over as a [`PageContext`].

use serde::Deserialize;

use crate::consent::ConsentSignals;
use crate::request::client_hints::ClientHints;

/// Window and screen measurements.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub window_inner_height: u32,
    pub window_inner_width: u32,
    pub device_pixel_ratio: f64,
    pub window_screen_height: u32,
    pub window_screen_width: u32,
    pub language: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    /// Lowercase browser name (`chrome`, `safari`, `firefox`, ...).
    #[serde(default)]
    pub browser: Option<String>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    /// Top-level page URL or referrer, unencoded.
    #[serde(default)]
    pub referrer: Option<String>,
    #[serde(default)]
    pub consent: ConsentSignals,
    /// Freshly collected high-entropy hints, when the host has them.
    #[serde(default)]
    pub client_hints: Option<ClientHints>,
}

impl PageContext {
    /// Browser name, lowercased, empty when unknown.
    #[must_use]
    pub fn browser_lowercase(&self) -> String {
        self.browser.as_deref().unwrap_or_default().to_lowercase()
    }
}
