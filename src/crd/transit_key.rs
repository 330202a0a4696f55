//! # VaultTransitKey
//!
//! Creates a named key inside a VaultTransitEngine and emits one policy per
//! key capability. Some spec fields cannot be changed in place; the
//! controller handles those with a delete-then-recreate protocol driven by
//! `status.appliedSpec`.

use super::conditions::Condition;
use crate::vault::transit::{KeyConfig, KeyType};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultTransitKey",
    plural = "vaulttransitkeys",
    shortname = "vtk",
    namespaced,
    status = "VaultTransitKeyStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransitKeySpec {
    /// Engine is the name of the VaultTransitEngine holding this key.
    pub engine: String,

    /// Type configures the transit key type.
    #[serde(default)]
    pub r#type: KeyType,

    /// MinimumDecryptionVersion specifies the minimum key version usable for
    /// decryption and signature verification.
    #[serde(default)]
    pub minimum_decryption_version: i32,

    /// MinimumEncryptionVersion specifies the minimum key version usable for
    /// encryption. Zero uses the latest version.
    #[serde(default)]
    pub minimum_encryption_version: i32,

    /// Exportable enables key export. Once set this cannot be disabled
    /// in place.
    #[serde(default)]
    pub exportable: bool,

    /// AllowPlaintextBackup enables plaintext backups of the key. Once set
    /// this cannot be disabled in place.
    #[serde(default)]
    pub allow_plaintext_backup: bool,

    /// DeleteProtection blocks deletion of this key while set.
    #[serde(default)]
    pub delete_protection: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransitKeyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// AppliedSpec is a copy of the spec that was last written to Vault.
    /// Used to detect changes which require recreating the key.
    #[serde(default)]
    pub applied_spec: Option<VaultTransitKeySpec>,
}

impl VaultTransitKey {
    /// Name of the key inside its engine.
    pub fn transit_key_name(&self) -> String {
        self.metadata.name.clone().unwrap_or_default()
    }

    pub fn key_config(&self) -> KeyConfig {
        KeyConfig {
            minimum_decryption_version: self.spec.minimum_decryption_version,
            minimum_encryption_version: self.spec.minimum_encryption_version,
            deletion_allowed: true,
            exportable: self.spec.exportable,
            allow_plaintext_backup: self.spec.allow_plaintext_backup,
        }
    }

    /// Detects spec changes Vault cannot apply in place. Such changes require
    /// deleting the old key (on the previously applied engine) before
    /// creating the new one.
    pub fn has_incompatible_changes(&self) -> bool {
        let Some(applied) = &self.status.as_ref().and_then(|s| s.applied_spec.clone()) else {
            return false;
        };

        let changed_engine = !applied.engine.is_empty() && applied.engine != self.spec.engine;

        changed_engine
            || applied.r#type != self.spec.r#type
            || applied.exportable != self.spec.exportable
            || applied.allow_plaintext_backup != self.spec.allow_plaintext_backup
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_with_applied(spec: VaultTransitKeySpec, applied: VaultTransitKeySpec) -> VaultTransitKey {
        let mut key = VaultTransitKey::new("signer", spec);
        key.metadata.namespace = Some("default".to_string());
        key.status = Some(VaultTransitKeyStatus {
            conditions: Vec::new(),
            applied_spec: Some(applied),
        });
        key
    }

    fn base_spec() -> VaultTransitKeySpec {
        VaultTransitKeySpec {
            engine: "crypto".to_string(),
            r#type: KeyType::Aes256Gcm96,
            ..VaultTransitKeySpec::default()
        }
    }

    #[test]
    fn no_applied_spec_means_no_incompatible_change() {
        let mut key = VaultTransitKey::new("signer", base_spec());
        key.status = None;
        assert!(!key.has_incompatible_changes());
    }

    #[test]
    fn same_spec_is_compatible() {
        let key = key_with_applied(base_spec(), base_spec());
        assert!(!key.has_incompatible_changes());
    }

    #[test]
    fn type_change_is_incompatible() {
        let mut spec = base_spec();
        spec.r#type = KeyType::Rsa2048;
        let key = key_with_applied(spec, base_spec());
        assert!(key.has_incompatible_changes());
    }

    #[test]
    fn engine_change_is_incompatible() {
        let mut spec = base_spec();
        spec.engine = "other".to_string();
        let key = key_with_applied(spec, base_spec());
        assert!(key.has_incompatible_changes());
    }

    #[test]
    fn exportable_and_backup_changes_are_incompatible() {
        let mut spec = base_spec();
        spec.exportable = true;
        assert!(key_with_applied(spec, base_spec()).has_incompatible_changes());

        let mut spec = base_spec();
        spec.allow_plaintext_backup = true;
        assert!(key_with_applied(spec, base_spec()).has_incompatible_changes());
    }

    #[test]
    fn minimum_version_changes_are_compatible() {
        let mut spec = base_spec();
        spec.minimum_decryption_version = 2;
        spec.minimum_encryption_version = 2;
        assert!(!key_with_applied(spec, base_spec()).has_incompatible_changes());
    }
}
