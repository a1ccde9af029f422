// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the identity engine.
//!
//! Field names follow the host's camelCase configuration object so it can be
//! deserialized as-is.
//!
//! # Example
//!
//! ```
//! use identity_sync::IdentityConfig;
//!
//! // Minimal config: only the partner is required
//! let config = IdentityConfig::for_partner(7);
//! assert_eq!(config.timeout().as_millis(), 500);
//!
//! // From host JSON
//! let config: IdentityConfig = serde_json::from_str(r#"{
//!     "partner": 7,
//!     "timeoutInMillis": 300,
//!     "browserBlackList": "Safari,Edge",
//!     "siloEnabled": true
//! }"#).unwrap();
//! assert!(config.silo_enabled);
//! assert_eq!(config.partner().unwrap(), 7);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::constants::{
    DEFAULT_GAM_PARAMETER, DEFAULT_PIXEL_ADDRESS, DEFAULT_SERVER_ADDRESS, DEFAULT_TIMEOUT_MS,
    GDPR_PIXEL_ADDRESS, GDPR_SERVER_ADDRESS,
};
use crate::error::IdentityError;
use crate::request::params::AdditionalParam;

/// Per-call configuration of [`IdentityEngine::get_id`](crate::IdentityEngine::get_id).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Partner identifier (required)
    #[serde(default)]
    pub partner: Option<i64>,

    /// Completion callback timeout in ms (0 = default of 500)
    #[serde(default = "default_timeout_in_millis")]
    pub timeout_in_millis: u64,

    /// Comma-separated browser names that only get the sync pixel
    #[serde(default)]
    pub browser_black_list: Option<String>,

    /// Targeting key the A/B group is reported under
    #[serde(default = "default_gam_parameter_name")]
    pub gam_parameter_name: String,

    /// Keep a separate first-party record per partner
    #[serde(default)]
    pub silo_enabled: bool,

    /// Dotted source version, folded into `fbp`
    #[serde(default)]
    pub source_meta_data: Option<String>,

    /// Pre-computed `fbp`, wins over `source_meta_data`
    #[serde(default)]
    pub source_meta_data_external: Option<u64>,

    #[serde(default)]
    pub additional_params: Vec<AdditionalParam>,

    /// Storage preference (`html5`, `cookie`), in order
    #[serde(default)]
    pub enabled_storage_types: Vec<String>,

    #[serde(default)]
    pub partner_client_id: Option<String>,

    /// Declared type of `partner_client_id`; only 0, 1, 3 and 4 are sent
    #[serde(default)]
    pub partner_client_id_type: Option<i64>,

    /// Partner account id
    #[serde(default)]
    pub pai: Option<String>,

    /// Publisher domain, used for the referrer block
    #[serde(default)]
    pub domain_name: Option<String>,

    /// Resolution server override
    #[serde(default)]
    pub iiq_server_address: Option<String>,

    /// Pixel server override
    #[serde(default)]
    pub iiq_pixel_server_address: Option<String>,
}

fn default_timeout_in_millis() -> u64 { DEFAULT_TIMEOUT_MS }
fn default_gam_parameter_name() -> String { DEFAULT_GAM_PARAMETER.to_string() }

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            partner: None,
            timeout_in_millis: default_timeout_in_millis(),
            browser_black_list: None,
            gam_parameter_name: default_gam_parameter_name(),
            silo_enabled: false,
            source_meta_data: None,
            source_meta_data_external: None,
            additional_params: Vec::new(),
            enabled_storage_types: Vec::new(),
            partner_client_id: None,
            partner_client_id_type: None,
            pai: None,
            domain_name: None,
            iiq_server_address: None,
            iiq_pixel_server_address: None,
        }
    }
}

impl IdentityConfig {
    #[must_use]
    pub fn for_partner(partner: i64) -> Self {
        Self {
            partner: Some(partner),
            ..Default::default()
        }
    }

    /// The validated partner id.
    pub fn partner(&self) -> Result<i64, IdentityError> {
        self.partner
            .ok_or_else(|| IdentityError::Config("a valid partner must be defined".into()))
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        let ms = if self.timeout_in_millis == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_in_millis
        };
        Duration::from_millis(ms)
    }

    /// Whether the (lowercased) browser name appears in the blacklist.
    #[must_use]
    pub fn is_blacklisted(&self, browser: &str) -> bool {
        match self.browser_black_list.as_deref() {
            Some(list) if !browser.is_empty() => list.to_lowercase().contains(browser),
            _ => false,
        }
    }

    /// Resolution server base address.
    #[must_use]
    pub fn server_address(&self, gdpr_detected: bool) -> &str {
        match self.iiq_server_address.as_deref() {
            Some(addr) if !addr.is_empty() => addr,
            _ if gdpr_detected => GDPR_SERVER_ADDRESS,
            _ => DEFAULT_SERVER_ADDRESS,
        }
    }

    /// Pixel server base address.
    #[must_use]
    pub fn pixel_address(&self, gdpr_detected: bool) -> &str {
        match self.iiq_pixel_server_address.as_deref() {
            Some(addr) if !addr.is_empty() => addr,
            _ if gdpr_detected => GDPR_PIXEL_ADDRESS,
            _ => DEFAULT_PIXEL_ADDRESS,
        }
    }
}
