// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Caller-declared extra parameters and the referrer block.

use serde::Deserialize;
use serde_json::Value;
use urlencoding::encode;

/// Which request an additional parameter is meant for (index into `destination`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Pixel = 0,
    Resolution = 1,
    Reporting = 2,
}

/// `{ parameterName, parameterValue, destination: [pixel, resolution, reporting] }`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalParam {
    #[serde(default)]
    pub parameter_name: String,
    #[serde(default)]
    pub parameter_value: Value,
    #[serde(default)]
    pub destination: Vec<Value>,
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl AdditionalParam {
    fn value_text(&self) -> Option<String> {
        match &self.parameter_value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
            Value::Bool(true) => Some("true".to_string()),
            _ => None,
        }
    }

    fn targets(&self, destination: Destination) -> bool {
        self.destination
            .get(destination as usize)
            .is_some_and(truthy)
    }
}

/// Maximum URL length the browser will send, when it is known to be limited.
#[must_use]
pub fn max_request_length(browser: &str) -> Option<usize> {
    match browser {
        "chrome" | "opera" => Some(2_097_152),
        "safari" => Some(80_000),
        "firefox" => Some(65_536),
        "edge" | "ie" => Some(2_048),
        _ => None,
    }
}

/// Append the parameters meant for `destination`. Invalid entries are skipped;
/// if the whole block would push the URL over the browser limit, none of it
/// is appended.
pub fn append_additional_params(
    url: &mut String,
    browser: &str,
    destination: Destination,
    params: &[AdditionalParam],
) {
    let mut query = String::new();
    for param in params {
        if param.parameter_name.is_empty() || !param.targets(destination) {
            continue;
        }
        let Some(value) = param.value_text() else {
            continue;
        };
        query.push('&');
        query.push_str(&encode(&param.parameter_name));
        query.push('=');
        query.push_str(&encode(&value));
    }

    if let Some(max) = max_request_length(browser) {
        if url.len() + query.len() > max {
            tracing::debug!(browser, max, "Additional params dropped, URL too long");
            return;
        }
    }
    url.push_str(&query);
}

/// Append `vrref` (and `fui=1` when the full URL could not be determined).
pub fn append_referrer(url: &mut String, referrer: Option<&str>, domain_name: Option<&str>) {
    let domain = domain_name.unwrap_or_default();
    let full = referrer.filter(|r| !r.is_empty()).map(|r| encode(r).into_owned());

    match full {
        Some(full) => {
            let relevant = if !domain.is_empty() && full.contains(domain) {
                full
            } else if !domain.is_empty() {
                encode(domain).into_owned()
            } else {
                full
            };
            url.push_str("&vrref=");
            url.push_str(&relevant);
        }
        None => {
            url.push_str("&fui=1&vrref=");
            url.push_str(&encode(domain));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Vec<AdditionalParam> {
        serde_json::from_value(json!([
            {"parameterName": "abc", "parameterValue": 123, "destination": [1, 1, 0]},
            {"parameterName": "pixelOnly", "parameterValue": "x y", "destination": [1, 0, 0]},
            {"parameterName": "", "parameterValue": "skip", "destination": [1, 1, 1]},
            {"parameterName": "noValue", "destination": [1, 1, 1]}
        ]))
        .unwrap()
    }

    #[test]
    fn test_resolution_destination() {
        let mut url = String::from("https://x/?a=1");
        append_additional_params(&mut url, "chrome", Destination::Resolution, &params());
        assert_eq!(url, "https://x/?a=1&abc=123");
    }

    #[test]
    fn test_pixel_destination_encodes() {
        let mut url = String::from("https://x/?a=1");
        append_additional_params(&mut url, "chrome", Destination::Pixel, &params());
        assert_eq!(url, "https://x/?a=1&abc=123&pixelOnly=x%20y");
    }

    #[test]
    fn test_block_dropped_over_browser_limit() {
        let long = "v".repeat(2_100);
        let params: Vec<AdditionalParam> = serde_json::from_value(json!([
            {"parameterName": "big", "parameterValue": long, "destination": [0, 1, 0]}
        ]))
        .unwrap();

        let mut edge = String::from("https://x/?a=1");
        append_additional_params(&mut edge, "edge", Destination::Resolution, &params);
        assert_eq!(edge, "https://x/?a=1");

        let mut chrome = String::from("https://x/?a=1");
        append_additional_params(&mut chrome, "chrome", Destination::Resolution, &params);
        assert!(chrome.contains("&big="));
    }

    #[test]
    fn test_referrer_contains_domain() {
        let mut url = String::new();
        append_referrer(&mut url, Some("https://news.example.com/a"), Some("example.com"));
        assert_eq!(url, "&vrref=https%3A%2F%2Fnews.example.com%2Fa");
    }

    #[test]
    fn test_referrer_foreign_uses_domain() {
        let mut url = String::new();
        append_referrer(&mut url, Some("https://other.org/"), Some("example.com"));
        assert_eq!(url, "&vrref=example.com");
    }

    #[test]
    fn test_referrer_missing_sets_fui() {
        let mut url = String::new();
        append_referrer(&mut url, None, Some("example.com"));
        assert_eq!(url, "&fui=1&vrref=example.com");

        let mut url = String::new();
        append_referrer(&mut url, None, None);
        assert_eq!(url, "&fui=1&vrref=");
    }
}
