// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resolution and sync-pixel URL assembly.
//!
//! Both builders are pure: everything time- or randomness-dependent (`now`,
//! the `tsrnd` nonce) is passed in, so the same [`RequestInput`] always yields
//! the same URL.
//!
//! # Resolution URL parameter order
//!
//! ```text
//! at, mi, dpi, pt, dpn          fixed head
//! pai                           partner account
//! pid, iiqpcid, iiqpciddate     first-party block
//! pcid, idtype                  partner client id
//! cttl, rrtt                    cache timings
//! us_privacy, gpp, gdpr...      consent block
//! japs                          silo flag
//! jaesc, jafc, jaensc           counters
//! cz, dw, dh, dpr, lan, uh      device block
//! jsver, testGroup, fbp         client block
//! <additional>, spd             caller params, server echo
//! vrref/fui, source, tsrnd      tail
//! ```

pub mod client_hints;
pub mod metadata;
pub mod params;

use serde_json::Value;
use urlencoding::encode;

use crate::config::IdentityConfig;
use crate::consent::ConsentSignals;
use crate::constants::{SERVLET_PATH, SOURCE_TAG, VERSION};
use crate::context::{DeviceInfo, PageContext};
use crate::record::{FirstPartyRecord, PartnerCacheRecord};
use crate::telemetry::TelemetryCounters;

use self::metadata::effective_metadata;
use self::params::{append_additional_params, append_referrer, Destination};

/// Everything a URL is built from.
#[derive(Debug, Clone, Copy)]
pub struct RequestInput<'a> {
    pub config: &'a IdentityConfig,
    pub partner: i64,
    pub first_party: &'a FirstPartyRecord,
    pub partner_record: &'a PartnerCacheRecord,
    /// Counter values before the cycle reset.
    pub counters: TelemetryCounters,
    pub context: &'a PageContext,
    /// Encoded client hints (see [`client_hints::encode_client_hints`]).
    pub client_hints: Option<&'a str>,
    pub now: i64,
    /// Random component of the uniqueness token, `0..1000`.
    pub nonce: u32,
}

/// Query text for a server-supplied opaque value.
fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn push_param(url: &mut String, name: &str, value: &str) {
    url.push('&');
    url.push_str(name);
    url.push('=');
    url.push_str(&encode(value));
}

fn append_first_party(url: &mut String, record: &FirstPartyRecord) {
    if let Some(pid) = record.pid.as_ref().and_then(value_text) {
        push_param(url, "pid", &pid);
    }
    if let Some(pcid) = record.pcid.as_deref().filter(|p| !p.is_empty()) {
        url.push_str("&iiqidtype=2");
        push_param(url, "iiqpcid", pcid);
    }
    if let Some(date) = record.pcid_date.filter(|d| *d != 0) {
        push_param(url, "iiqpciddate", &date.to_string());
    }
}

fn append_partner_client_id(url: &mut String, config: &IdentityConfig) {
    let id_type = match config.partner_client_id_type {
        Some(t @ (0 | 1 | 3 | 4)) => t,
        _ => return,
    };
    if let Some(id) = config.partner_client_id.as_deref().filter(|id| !id.is_empty()) {
        push_param(url, "pcid", id);
        url.push_str(&format!("&idtype={}", id_type));
    }
}

fn append_consent(url: &mut String, consent: &ConsentSignals) {
    if !consent.usp_string.is_empty() {
        push_param(url, "us_privacy", &consent.usp_string);
    }
    if !consent.gpp_string.is_empty() {
        push_param(url, "gpp", &consent.gpp_string);
    }
    if consent.gdpr_applies {
        push_param(url, "gdpr_consent", &consent.gdpr_string);
        url.push_str("&gdpr=1");
    } else {
        url.push_str("&gdpr=0");
    }
}

fn append_device(url: &mut String, device: &DeviceInfo) {
    let screen = format!(
        "0:{},1:{},2:{},3:{},4:{},5:{}",
        device.window_inner_height,
        device.window_inner_width,
        device.device_pixel_ratio,
        device.window_screen_height,
        device.window_screen_width,
        device.language,
    );
    push_param(url, "cz", &screen);
    url.push_str(&format!(
        "&dw={}&dh={}&dpr={}&lan={}",
        device.window_screen_width,
        device.window_screen_height,
        device.device_pixel_ratio,
        device.language,
    ));
}

fn append_client_hints(url: &mut String, hints: Option<&str>) {
    if let Some(hints) = hints.filter(|h| !h.is_empty()) {
        push_param(url, "uh", hints);
    }
}

fn append_metadata(url: &mut String, config: &IdentityConfig) {
    let fbp = effective_metadata(
        config.source_meta_data_external,
        config.source_meta_data.as_deref(),
    );
    if let Some(fbp) = fbp {
        url.push_str(&format!("&fbp={}", fbp));
    }
}

fn append_server_echo(url: &mut String, record: &FirstPartyRecord) {
    let spd = match record.spd.as_ref() {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Object(_)) | Some(Value::Array(_)) => {
            record.spd.as_ref().map(Value::to_string).unwrap_or_default()
        }
        Some(other) => value_text(other).unwrap_or_default(),
        None => String::new(),
    };
    if !spd.is_empty() {
        push_param(url, "spd", &spd);
    }
}

fn append_uniqueness(url: &mut String, nonce: u32, now: i64) {
    url.push_str(&format!("&tsrnd={}_{}", nonce % 1000, now));
}

/// Build the resolution-service URL.
#[must_use]
pub fn resolution_url(input: &RequestInput<'_>) -> String {
    let config = input.config;
    let consent = &input.context.consent;
    let browser = input.context.browser_lowercase();

    let mut url = format!(
        "{}{}?at=39&mi=10&dpi={}&pt=17&dpn=1",
        config.server_address(consent.gdpr_detected()),
        SERVLET_PATH,
        input.partner,
    );
    if let Some(pai) = config.pai.as_deref().filter(|p| !p.is_empty()) {
        push_param(&mut url, "pai", pai);
    }
    append_first_party(&mut url, input.first_party);
    append_partner_client_id(&mut url, config);

    if let Some(cttl) = input.partner_record.cttl.filter(|v| *v != 0) {
        url.push_str(&format!("&cttl={}", cttl));
    }
    if let Some(rrtt) = input.partner_record.rrtt.filter(|v| *v != 0) {
        url.push_str(&format!("&rrtt={}", rrtt));
    }

    append_consent(&mut url, consent);
    url.push_str(&format!("&japs={}", config.silo_enabled));
    url.push_str(&format!(
        "&jaesc={}&jafc={}&jaensc={}",
        input.counters.call_count, input.counters.fail_count, input.counters.no_data_count,
    ));

    if let Some(ref device) = input.context.device {
        append_device(&mut url, device);
    }
    append_client_hints(&mut url, input.client_hints);

    url.push_str(&format!("&jsver={}", VERSION));
    push_param(&mut url, "testGroup", input.first_party.group.as_str());
    append_metadata(&mut url, config);
    append_additional_params(&mut url, &browser, Destination::Resolution, &config.additional_params);
    append_server_echo(&mut url, input.first_party);
    append_referrer(&mut url, input.context.referrer.as_deref(), config.domain_name.as_deref());
    url.push_str(&format!("&source={}", SOURCE_TAG));
    append_uniqueness(&mut url, input.nonce, input.now);
    url
}

/// Build the lightweight sync-pixel URL. Carries no counters, silo flag or
/// test group.
#[must_use]
pub fn pixel_url(input: &RequestInput<'_>) -> String {
    let config = input.config;
    let consent = &input.context.consent;
    let browser = input.context.browser_lowercase();

    let mut url = format!(
        "{}{}?at=20&mi=10&secure=1&dpi={}",
        config.pixel_address(consent.gdpr_detected()),
        SERVLET_PATH,
        input.partner,
    );
    append_first_party(&mut url, input.first_party);
    append_partner_client_id(&mut url, config);
    append_uniqueness(&mut url, input.nonce, input.now);
    if let Some(client_type) = input.partner_record.client_type.filter(|t| *t != 0) {
        url.push_str(&format!("&idtype={}", client_type));
    }
    if let Some(ref device) = input.context.device {
        append_device(&mut url, device);
    }
    url.push_str(&format!("&jsver={}", VERSION));
    append_client_hints(&mut url, input.client_hints);
    append_referrer(&mut url, input.context.referrer.as_deref(), config.domain_name.as_deref());
    append_consent(&mut url, consent);
    append_metadata(&mut url, config);
    append_additional_params(&mut url, &browser, Destination::Pixel, &config.additional_params);
    append_server_echo(&mut url, input.first_party);
    url.push_str(&format!("&source={}", SOURCE_TAG));
    url
}
