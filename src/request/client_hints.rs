// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! High-entropy client-hints encoding.
//!
//! Hints are sent as a compact JSON object keyed by a fixed index per hint:
//!
//! | index | hint              | encoding                         |
//! |-------|-------------------|----------------------------------|
//! | 0     | `brands`          | `"Brand";v="1", "Other";v="2"`   |
//! | 1     | `mobile`          | `?1` / `?0`                      |
//! | 2     | `platform`        | quoted string                    |
//! | 3     | `architecture`    | quoted string                    |
//! | 4     | `bitness`         | quoted string                    |
//! | 5     | `model`           | quoted string                    |
//! | 6     | `platformVersion` | quoted string                    |
//! | 7     | `wow64`           | `?1` / `?0`                      |
//! | 8     | `fullVersionList` | same as `brands`                 |

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BrandVersion {
    pub brand: String,
    pub version: String,
}

/// Raw hints as returned by the user-agent data API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHints {
    #[serde(default)]
    pub brands: Option<Vec<BrandVersion>>,
    #[serde(default)]
    pub mobile: Option<bool>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub bitness: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub platform_version: Option<String>,
    #[serde(default)]
    pub wow64: Option<bool>,
    #[serde(default)]
    pub full_version_list: Option<Vec<BrandVersion>>,
}

fn brand_list(list: &[BrandVersion]) -> String {
    list.iter()
        .map(|b| format!("\"{}\";v=\"{}\"", b.brand, b.version))
        .collect::<Vec<_>>()
        .join(", ")
}

fn flag(value: bool) -> String {
    format!("?{}", u8::from(value))
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value)
}

/// Encode hints for the `uh` parameter. Returns an empty string when no hint
/// carries a value.
#[must_use]
pub fn encode_client_hints(hints: &ClientHints) -> String {
    let mut params: BTreeMap<u8, String> = BTreeMap::new();

    let lists = [(0, &hints.brands), (8, &hints.full_version_list)];
    for (index, list) in lists {
        if let Some(list) = list.as_deref().filter(|l| !l.is_empty()) {
            params.insert(index, brand_list(list));
        }
    }

    if let Some(mobile) = hints.mobile {
        params.insert(1, flag(mobile));
    }
    if let Some(wow64) = hints.wow64 {
        params.insert(7, flag(wow64));
    }

    let strings = [
        (2, &hints.platform),
        (3, &hints.architecture),
        (4, &hints.bitness),
        (5, &hints.model),
        (6, &hints.platform_version),
    ];
    for (index, value) in strings {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            params.insert(index, quoted(value));
        }
    }

    if params.is_empty() {
        return String::new();
    }
    serde_json::to_string(&params).unwrap_or_default()
}
