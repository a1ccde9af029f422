// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Source-metadata translation.
//!
//! A dotted four-part version string `a.b.c.d` folds into one integer:
//! `((a * 256 + b) * 256 + c) * 256 + d`. Anything else is not a number and
//! the `fbp` parameter is left out.

use crate::constants::META_DATA_CONSTANT;

/// Fold a dotted version string. `None` means not-a-number.
#[must_use]
pub fn translate_metadata(data: &str) -> Option<u64> {
    let parts: Vec<&str> = data.split('.').collect();
    if parts.len() != 4 {
        return None;
    }

    let mut value: u64 = 0;
    for part in parts {
        let part = part.trim();
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let component: u64 = part.parse().ok()?;
        value = value.checked_mul(META_DATA_CONSTANT)?.checked_add(component)?;
    }
    Some(value)
}

/// Effective `fbp` value: a non-zero external number wins over the
/// translated string.
#[must_use]
pub fn effective_metadata(external: Option<u64>, source: Option<&str>) -> Option<u64> {
    external
        .filter(|v| *v != 0)
        .or_else(|| source.and_then(translate_metadata))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_valid() {
        assert_eq!(translate_metadata("0.0.0.0"), Some(0));
        assert_eq!(translate_metadata("1.2.3.4"), Some(((256 + 2) * 256 + 3) * 256 + 4));
        assert_eq!(translate_metadata("9.3.1.4"), Some(151_191_812));
    }

    #[test]
    fn test_translate_not_a_number() {
        assert_eq!(translate_metadata("1.2.x.4"), None);
        assert_eq!(translate_metadata("1.2.3"), None);
        assert_eq!(translate_metadata("1.2.3.4.5"), None);
        assert_eq!(translate_metadata(""), None);
        assert_eq!(translate_metadata("1..3.4"), None);
        assert_eq!(translate_metadata("-1.2.3.4"), None);
    }

    #[test]
    fn test_effective_metadata_precedence() {
        assert_eq!(effective_metadata(Some(77), Some("1.2.3.4")), Some(77));
        assert_eq!(effective_metadata(Some(0), Some("0.0.0.5")), Some(5));
        assert_eq!(effective_metadata(None, Some("bad")), None);
        assert_eq!(effective_metadata(None, None), None);
    }
}
