//! Realization ids from CMIP variant labels
//!
//! `r1i1p1f1` → `r1`. Patterns are tried in order:
//! 1. `r<digits>` directly followed by `i`
//! 2. `r<digits>` as a whole word
//! 3. any `r<digits>`

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

static REALIZATION_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [r"r(\d+)i", r"\br(\d+)\b", r"r(\d+)"].map(|p| Regex::new(p).expect("realization pattern is valid"))
});

/// Digits of the first matching realization pattern
fn realization_digits(member_id: &str) -> Option<&str> {
    if member_id.is_empty() {
        debug!("no member_id provided for realization extraction");
        return None;
    }

    for pattern in REALIZATION_PATTERNS.iter() {
        if let Some(digits) = pattern.captures(member_id).and_then(|c| c.get(1)) {
            debug!(member_id, pattern = pattern.as_str(), "extracted realization r{}", digits.as_str());
            return Some(digits.as_str());
        }
    }

    warn!(member_id, "no realization found in member_id");
    None
}

/// Realization as `r<N>`, e.g. `r1`
pub fn extract_realization(member_id: &str) -> Option<String> {
    realization_digits(member_id).map(|digits| format!("r{}", digits))
}

/// Realization number, e.g. `1`
pub fn extract_realization_number(member_id: &str) -> Option<u32> {
    realization_digits(member_id).and_then(|digits| digits.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_labels() {
        assert_eq!(extract_realization("r1i1p1f1").as_deref(), Some("r1"));
        assert_eq!(extract_realization("r10i1p1f2").as_deref(), Some("r10"));
        assert_eq!(extract_realization_number("r12i1p1f1"), Some(12));
    }

    #[test]
    fn test_pattern_priority() {
        // "r2" followed by "i" wins over the earlier standalone "r5"
        assert_eq!(extract_realization("tas_r5_r2i1p1f1").as_deref(), Some("r2"));
        // whole word wins over the earlier embedded "r7"
        assert_eq!(extract_realization("xr7y r3").as_deref(), Some("r3"));
        // fallback to any r<digits>
        assert_eq!(extract_realization("ensr4x").as_deref(), Some("r4"));
    }

    #[test]
    fn test_missing_realization() {
        assert_eq!(extract_realization(""), None);
        assert_eq!(extract_realization("historical"), None);
        assert_eq!(extract_realization_number("abc"), None);
    }
}
