//! # VaultKVSecretEngine
//!
//! Provisions a KV v2 secret engine mount at a deterministic path.

use super::conditions::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultKVSecretEngine",
    plural = "vaultkvsecretengines",
    shortname = "kvse",
    namespaced,
    status = "VaultKVSecretEngineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretEngineSpec {
    /// MaxVersions configures the maximum number of secret versions to keep.
    /// Zero applies the controller default of 10.
    #[serde(default)]
    pub max_versions: i32,

    /// DeleteProtection blocks deletion of this engine while set.
    #[serde(default)]
    pub delete_protection: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretEngineStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VaultKVSecretEngine {
    /// Deterministic Vault mount path for this engine.
    pub fn mount_path(&self) -> String {
        crate::names::kv_engine_mount_path(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    /// Effective engine configuration with defaults applied.
    pub fn kv_engine_config(&self) -> crate::vault::kv::KvEngineConfig {
        let max_versions = if self.spec.max_versions != 0 {
            self.spec.max_versions
        } else {
            crate::constants::DEFAULT_KV_MAX_VERSIONS
        };

        crate::vault::kv::KvEngineConfig {
            max_versions,
            cas_required: true,
            delete_version_after: "0s".to_string(),
        }
    }
}
