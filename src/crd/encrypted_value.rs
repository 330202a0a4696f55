//! # Encrypted Values
//!
//! User-supplied secret fields are never stored in plaintext inside the
//! cluster API. They must be encrypted with the operator-owned transit key
//! and match the transit ciphertext format (`vault:v<N>:<base64>`).

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

fn ciphertext_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^vault:v[0-9]+:[A-Za-z0-9+/=]+$").expect("ciphertext regex must compile")
    })
}

/// Returns true when the value matches the transit ciphertext format.
pub fn is_ciphertext(value: &str) -> bool {
    ciphertext_regex().is_match(value)
}

/// A value encrypted with the managed transit key.
///
/// The wrapper is transparent on the wire; validation happens at admission
/// time, so a value reaching a reconciler is expected to be well-formed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(transparent)]
pub struct EncryptedValue(pub String);

impl EncryptedValue {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        is_ciphertext(&self.0)
    }
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EncryptedValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_transit_ciphertext() {
        assert!(is_ciphertext("vault:v1:aGVsbG8="));
        assert!(is_ciphertext("vault:v2:QUJDREVG"));
        assert!(is_ciphertext("vault:v12:aa+/bb=="));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(!is_ciphertext(""));
        assert!(!is_ciphertext("hello world"));
        assert!(!is_ciphertext("vault:v1:"));
        assert!(!is_ciphertext("vault:vx:aGVsbG8="));
        assert!(!is_ciphertext("vault:v1:with spaces"));
        assert!(!is_ciphertext("prefix vault:v1:aGVsbG8="));
    }

    #[test]
    fn serde_is_transparent() {
        let value = EncryptedValue::from("vault:v1:aGVsbG8=");
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "\"vault:v1:aGVsbG8=\"");
        let back: EncryptedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }
}
