//! # VaultKVSecret
//!
//! Writes user-supplied, admission-encrypted fields as cleartext into a KV
//! engine. Status records the ciphertext of each field so drift can be
//! detected without decrypting anything.

use super::conditions::Condition;
use super::encrypted_value::EncryptedValue;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretField {
    /// CipherText holds the value of this field, encrypted with the managed
    /// transit key.
    pub cipher_text: EncryptedValue,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultKVSecret",
    plural = "vaultkvsecrets",
    shortname = "vkvs",
    namespaced,
    status = "VaultKVSecretStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretSpec {
    /// Engine is the name of the VaultKVSecretEngine this secret lives in.
    pub engine: String,

    /// Path is the base path of the secret inside the engine. The final
    /// secret path is `{path}/{name}`.
    #[serde(default)]
    pub path: String,

    /// Fields maps field names to their encrypted values.
    #[serde(default)]
    pub fields: BTreeMap<String, VaultKVSecretField>,

    /// DeleteProtection blocks deletion of this secret while set.
    #[serde(default)]
    pub delete_protection: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Mount path of the engine the secret was last written to.
    #[serde(default)]
    pub engine: String,

    /// Path of the secret inside the engine as last written.
    #[serde(default)]
    pub path: String,

    /// Name of the read policy emitted for this secret.
    #[serde(default)]
    pub read_only_policy_name: String,

    /// Ciphertext fingerprint of each field as last applied.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl VaultKVSecret {
    /// Path of this secret inside its engine.
    pub fn secret_path(&self) -> String {
        crate::names::join_path(
            &self.spec.path,
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }
}
