//! # Duration strings
//!
//! CRD fields holding TTLs use Kubernetes-style duration strings
//! ("30s", "10m", "1h30m", "90d"). An empty string means unset.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;

fn segment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?P<number>\d+)(?P<unit>[smhd])").expect("duration regex"))
}

/// Parse a Kubernetes duration string into a [`Duration`].
///
/// Supports one or more `<number><unit>` segments with units s, m, h, d.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let trimmed = duration_str.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }

    let mut total_seconds: u64 = 0;
    let mut matched_len = 0;
    for captures in segment_regex().captures_iter(&trimmed) {
        let number: u64 = captures.name("number")?.as_str().parse().ok()?;
        let unit = captures.name("unit")?.as_str();
        let seconds = match unit {
            "s" => number,
            "m" => number * 60,
            "h" => number * 3600,
            "d" => number * 86400,
            _ => return None,
        };
        total_seconds = total_seconds.checked_add(seconds)?;
        matched_len += captures.get(0)?.as_str().len();
    }

    // Reject trailing garbage ("5x", "1h banana").
    if matched_len != trimmed.len() || total_seconds == 0 {
        return None;
    }

    Some(Duration::from_secs(total_seconds))
}

/// A duration represented as a Kubernetes duration string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct DurationString(pub String);

impl DurationString {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// The parsed duration; `None` for unset or malformed values.
    pub fn as_duration(&self) -> Option<Duration> {
        parse_duration(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DurationString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_segment() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("1d"), Some(Duration::from_secs(86400)));
    }

    #[test]
    fn parses_compound_segments() {
        assert_eq!(parse_duration("1h30m"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1d12h"), Some(Duration::from_secs(129_600)));
    }

    #[test]
    fn rejects_invalid_input() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("banana"), None);
        assert_eq!(parse_duration("5x"), None);
        assert_eq!(parse_duration("1h banana"), None);
        assert_eq!(parse_duration("0s"), None);
    }

    #[test]
    fn duration_string_roundtrip() {
        let ttl = DurationString::from("10m");
        assert_eq!(ttl.as_duration(), Some(Duration::from_secs(600)));
        assert!(DurationString::default().is_empty());
    }
}
