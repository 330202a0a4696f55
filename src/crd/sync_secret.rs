//! # VaultSyncSecret
//!
//! Materializes selected Vault-held values (decrypted ciphertexts, CA
//! fields, issued certificates, KV fields) into a native cluster Secret the
//! sync owns via the `heist.youniqx.com/sync-from` annotation.

use super::binding::{CertificateFieldType, CertificateTemplate};
use super::conditions::Condition;
use super::encrypted_value::EncryptedValue;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncSecretTarget {
    /// Name of the native Secret to create.
    #[serde(default)]
    pub name: String,

    /// Namespace the Secret should be created in. Empty means the sync's
    /// own namespace; anything else must be on the operator allow-list.
    #[serde(default)]
    pub namespace: String,

    /// Type of the created Secret; defaults to Opaque.
    #[serde(default)]
    pub r#type: String,

    /// Additional annotations merged onto the target Secret.
    #[serde(default)]
    pub additional_annotations: BTreeMap<String, String>,

    /// Additional labels merged onto the target Secret.
    #[serde(default)]
    pub additional_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncCertificateAuthoritySource {
    /// Name of the VaultCertificateAuthority to sync from.
    pub name: String,

    /// Field of the certificate authority to sync.
    #[serde(default)]
    pub field: CertificateFieldType,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncCertificateSource {
    /// Name of the certificate template used to issue the certificate.
    pub name: String,

    /// Field of the issued certificate to sync.
    #[serde(default)]
    pub field: CertificateFieldType,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncKVSecretSource {
    /// Name of the VaultKVSecret to sync from.
    pub name: String,

    /// Field of the VaultKVSecret to sync.
    pub field: String,
}

/// Exactly one variant is expected to be set per data entry.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncSecretSource {
    /// A value encrypted with the managed transit engine; decrypted into
    /// the target Secret.
    #[serde(default)]
    pub cipher_text: EncryptedValue,

    #[serde(default)]
    pub certificate_authority: Option<VaultSyncCertificateAuthoritySource>,

    #[serde(default)]
    pub certificate: Option<VaultSyncCertificateSource>,

    #[serde(default, rename = "kvSecret")]
    pub kv_secret: Option<VaultSyncKVSecretSource>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultSyncSecret",
    plural = "vaultsyncsecrets",
    shortname = "vss",
    namespaced,
    status = "VaultSyncSecretStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncSecretSpec {
    /// Target configures the Secret values are synced to.
    pub target: VaultSyncSecretTarget,

    /// CertificateTemplates configures certificates which may be issued for
    /// `certificate` data sources.
    #[serde(default)]
    pub certificate_templates: Vec<CertificateTemplate>,

    /// Data maps target Secret keys to their Vault sources.
    #[serde(default)]
    pub data: BTreeMap<String, VaultSyncSecretSource>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultSyncSecretStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// AppliedSpec is a copy of the last spec the controller acted on; used
    /// to detect target moves.
    #[serde(default)]
    pub applied_spec: Option<VaultSyncSecretSpec>,
}

impl VaultSyncSecret {
    /// Value of the ownership annotation stamped on the target Secret.
    pub fn sync_from_annotation_value(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }

    /// Find the certificate template addressed by `name` together with its
    /// index (used as the issuance cache key).
    pub fn find_certificate_template(&self, name: &str) -> Option<(usize, &CertificateTemplate)> {
        self.spec
            .certificate_templates
            .iter()
            .enumerate()
            .find(|(_, template)| template.matches(name))
    }

    /// True when the applied target differs from the current spec target,
    /// meaning the previously written Secret may need to be cleaned up.
    pub fn has_moved_target(&self) -> bool {
        let Some(applied) = self.status.as_ref().and_then(|s| s.applied_spec.as_ref()) else {
            return false;
        };
        if applied.target.namespace.is_empty() || applied.target.name.is_empty() {
            return false;
        }

        applied.target.namespace != self.spec.target.namespace
            || applied.target.name != self.spec.target.name
    }
}
