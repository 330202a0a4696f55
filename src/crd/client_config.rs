//! # VaultClientConfig
//!
//! Passive resource consumed by agent sidecars. The Binding controller is
//! its sole writer; it describes how the agent reaches Vault and which
//! operations it may perform on which mounts.

use super::binding::{
    CertificateAuthorityCapability, CertificateCapability, KvCapability, TransitKeyCapability,
    VaultBindingAgentConfig,
};
use super::conditions::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthorityKVSecretRef {
    /// Mount path of the internal KV engine holding the CA material.
    #[serde(default)]
    pub engine_path: String,

    /// Path of the public metadata secret (certificate, chains, serial).
    #[serde(default, rename = "publicSecret")]
    pub public_secret_path: String,

    /// Path of the private metadata secret (private key and key type).
    #[serde(default, rename = "privateSecret")]
    pub private_secret_path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthorityRef {
    #[serde(default)]
    pub name: String,

    /// Mount path of the CA's PKI engine.
    #[serde(default)]
    pub engine_path: String,

    #[serde(default, rename = "kvSecrets")]
    pub kv_secrets: VaultCertificateAuthorityKVSecretRef,

    #[serde(default)]
    pub capabilities: Vec<CertificateAuthorityCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultKVSecretRef {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub engine_path: String,

    #[serde(default)]
    pub secret_path: String,

    #[serde(default)]
    pub capabilities: Vec<KvCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateRef {
    #[serde(default)]
    pub name: String,

    /// Mount path of the issuer's PKI engine.
    #[serde(default)]
    pub engine_path: String,

    #[serde(default)]
    pub role_name: String,

    #[serde(default)]
    pub capabilities: Vec<CertificateCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultTransitKeyRef {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub engine_path: String,

    #[serde(default)]
    pub key_name: String,

    #[serde(default)]
    pub capabilities: Vec<TransitKeyCapability>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultClientConfig",
    plural = "vaultclientconfigs",
    shortname = "vcc",
    namespaced,
    status = "VaultClientConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultClientConfigSpec {
    /// Address of the Vault the agent should talk to.
    #[serde(default)]
    pub address: String,

    /// Name of the kubernetes-auth role the agent assumes.
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub ca_certs: Vec<String>,

    /// Mount path of the kubernetes auth method.
    #[serde(default)]
    pub auth_mount_path: String,

    #[serde(default)]
    pub certificate_authorities: Vec<VaultCertificateAuthorityRef>,

    #[serde(default)]
    pub kv_secrets: Vec<VaultKVSecretRef>,

    #[serde(default)]
    pub certificates: Vec<VaultCertificateRef>,

    #[serde(default)]
    pub transit_keys: Vec<VaultTransitKeyRef>,

    /// Agent template passthrough from the binding.
    #[serde(default)]
    pub templates: VaultBindingAgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultClientConfigStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}
