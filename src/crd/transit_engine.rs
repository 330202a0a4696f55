//! # VaultTransitEngine
//!
//! Provisions a transit (cryptographic operations) engine mount.

use super::conditions::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_plugin() -> String {
    "transit".to_string()
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultTransitEngine",
    plural = "vaulttransitengines",
    shortname = "vte",
    namespaced,
    status = "VaultTransitEngineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransitEngineSpec {
    /// Plugin configures the plugin backend used for this engine.
    #[serde(default = "default_plugin")]
    pub plugin: String,
}

impl Default for VaultTransitEngineSpec {
    fn default() -> Self {
        Self {
            plugin: default_plugin(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransitEngineStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VaultTransitEngine {
    /// Deterministic Vault mount path for this engine.
    pub fn mount_path(&self) -> String {
        crate::names::transit_engine_mount_path(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }
}
