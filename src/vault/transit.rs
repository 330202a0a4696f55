//! # Transit engine entities
//!
//! Key types and configuration for keys inside transit engines.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Supported transit key types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum KeyType {
    #[default]
    #[serde(rename = "aes256-gcm96")]
    Aes256Gcm96,
    #[serde(rename = "aes128-gcm96")]
    Aes128Gcm96,
    #[serde(rename = "chacha20-poly1305")]
    Chacha20Poly1305,
    #[serde(rename = "ed25519")]
    Ed25519,
    #[serde(rename = "ecdsa-p256")]
    EcdsaP256,
    #[serde(rename = "ecdsa-p384")]
    EcdsaP384,
    #[serde(rename = "ecdsa-p521")]
    EcdsaP521,
    #[serde(rename = "rsa-2048")]
    Rsa2048,
    #[serde(rename = "rsa-3072")]
    Rsa3072,
    #[serde(rename = "rsa-4096")]
    Rsa4096,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Aes256Gcm96 => "aes256-gcm96",
            KeyType::Aes128Gcm96 => "aes128-gcm96",
            KeyType::Chacha20Poly1305 => "chacha20-poly1305",
            KeyType::Ed25519 => "ed25519",
            KeyType::EcdsaP256 => "ecdsa-p256",
            KeyType::EcdsaP384 => "ecdsa-p384",
            KeyType::EcdsaP521 => "ecdsa-p521",
            KeyType::Rsa2048 => "rsa-2048",
            KeyType::Rsa3072 => "rsa-3072",
            KeyType::Rsa4096 => "rsa-4096",
        }
    }
}

/// Configuration applied to a transit key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KeyConfig {
    pub minimum_decryption_version: i32,
    pub minimum_encryption_version: i32,
    pub deletion_allowed: bool,
    pub exportable: bool,
    pub allow_plaintext_backup: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_type_serde_matches_vault_names() {
        assert_eq!(
            serde_json::to_string(&KeyType::Aes256Gcm96).unwrap(),
            "\"aes256-gcm96\""
        );
        let parsed: KeyType = serde_json::from_str("\"rsa-2048\"").unwrap();
        assert_eq!(parsed, KeyType::Rsa2048);
        assert_eq!(parsed.as_str(), "rsa-2048");
    }
}
