//! # VaultCertificateAuthority
//!
//! Provisions a PKI engine mount and issues (or imports) a root or
//! intermediate CA certificate. Derived material (certificate, chain, full
//! chain, private key) is persisted into the internal KV engine where it is
//! gated by per-CA read policies.

use super::conditions::Condition;
use super::duration::DurationString;
use super::encrypted_value::EncryptedValue;
use crate::vault::pki::{CaKeyType, CaMode, CaSettings, CaSubject, TuneConfig};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_plugin() -> String {
    "pki".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthorityImport {
    /// Certificate matching the private key that should be imported,
    /// encrypted with the managed transit key.
    #[serde(default)]
    pub certificate: EncryptedValue,

    /// PrivateKey that should be imported, encrypted with the managed
    /// transit key so no plaintext key material lives in the cluster API.
    #[serde(default)]
    pub private_key: EncryptedValue,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthoritySubject {
    /// CommonName sets the CN field in the certificate subject.
    #[serde(default)]
    pub common_name: String,
    #[serde(default)]
    pub organization: Vec<String>,
    #[serde(default, rename = "ou")]
    pub organizational_unit: Vec<String>,
    #[serde(default)]
    pub country: Vec<String>,
    #[serde(default)]
    pub locality: Vec<String>,
    #[serde(default)]
    pub province: Vec<String>,
    #[serde(default)]
    pub street_address: Vec<String>,
    #[serde(default)]
    pub postal_code: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthorityTuning {
    /// DefaultLeaseTTL sets the default validity of certificates issued by
    /// this mount.
    #[serde(default)]
    pub default_lease_ttl: DurationString,

    /// MaxLeaseTTL sets the maximum validity of any certificate issued by
    /// this mount.
    #[serde(default)]
    pub max_lease_ttl: DurationString,

    /// Description of the PKI engine in Vault.
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthoritySettings {
    #[serde(default)]
    pub subject_alternative_names: Vec<String>,
    #[serde(default)]
    pub ip_sans: Vec<String>,
    #[serde(default)]
    pub uri_sans: Vec<String>,
    #[serde(default)]
    pub other_sans: Vec<String>,

    /// TTL sets the validity period of the CA certificate itself.
    #[serde(default)]
    pub ttl: DurationString,

    /// KeyType sets the key algorithm of the CA certificate (rsa or ec).
    #[serde(default)]
    pub key_type: Option<CaKeyType>,

    /// KeyBits sets the key size; must be valid for the configured KeyType.
    #[serde(default)]
    pub key_bits: i32,

    #[serde(default, rename = "excludeCNFromSans")]
    pub exclude_cn_from_sans: bool,

    /// PermittedDNSDomains restricts which domains certificates may be
    /// issued for under this authority.
    #[serde(default, rename = "permittedDNSDomains")]
    pub permitted_dns_domains: Vec<String>,

    /// Exported controls whether the private key is retained readable in
    /// Vault. Required when downstream bindings request the private key.
    /// Cannot be changed after the PKI engine is created.
    #[serde(default)]
    pub exported: bool,
}

#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultCertificateAuthority",
    plural = "vaultcertificateauthorities",
    shortname = "vca",
    namespaced,
    status = "VaultCertificateAuthorityStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthoritySpec {
    /// Plugin configures the plugin backend used for this engine.
    #[serde(default = "default_plugin")]
    pub plugin: String,

    /// Issuer implicitly defines whether this CA is an intermediate or a
    /// root CA. Empty means root (self-signed); otherwise it names the
    /// parent CA object in the same namespace.
    #[serde(default)]
    pub issuer: String,

    /// Import provides an existing certificate/key pair instead of
    /// generating one.
    #[serde(default)]
    pub import: Option<VaultCertificateAuthorityImport>,

    #[serde(default)]
    pub subject: VaultCertificateAuthoritySubject,

    #[serde(default)]
    pub tuning: VaultCertificateAuthorityTuning,

    #[serde(default)]
    pub settings: VaultCertificateAuthoritySettings,

    /// DeleteProtection blocks deletion of this CA while set.
    #[serde(default)]
    pub delete_protection: bool,
}

impl Default for VaultCertificateAuthoritySpec {
    fn default() -> Self {
        Self {
            plugin: default_plugin(),
            issuer: String::new(),
            import: None,
            subject: VaultCertificateAuthoritySubject::default(),
            tuning: VaultCertificateAuthorityTuning::default(),
            settings: VaultCertificateAuthoritySettings::default(),
            delete_protection: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateAuthorityStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VaultCertificateAuthority {
    /// Deterministic Vault mount path of the PKI engine.
    pub fn mount_path(&self) -> String {
        crate::names::pki_mount_path(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    pub fn is_root(&self) -> bool {
        self.spec.issuer.is_empty()
    }

    pub fn ca_mode(&self) -> CaMode {
        if self.spec.settings.exported {
            CaMode::Exported
        } else {
            CaMode::Internal
        }
    }

    pub fn ca_settings(&self) -> CaSettings {
        CaSettings {
            subject_alternative_names: self.spec.settings.subject_alternative_names.clone(),
            ip_sans: self.spec.settings.ip_sans.clone(),
            uri_sans: self.spec.settings.uri_sans.clone(),
            other_sans: self.spec.settings.other_sans.clone(),
            ttl: self.spec.settings.ttl.as_duration(),
            key_type: self.spec.settings.key_type.unwrap_or_default(),
            key_bits: self.spec.settings.key_bits,
            exclude_cn_from_sans: self.spec.settings.exclude_cn_from_sans,
            permitted_dns_domains: self.spec.settings.permitted_dns_domains.clone(),
        }
    }

    pub fn ca_subject(&self) -> CaSubject {
        CaSubject {
            common_name: self.spec.subject.common_name.clone(),
            organization: self.spec.subject.organization.clone(),
            organizational_unit: self.spec.subject.organizational_unit.clone(),
            country: self.spec.subject.country.clone(),
            locality: self.spec.subject.locality.clone(),
            province: self.spec.subject.province.clone(),
            street_address: self.spec.subject.street_address.clone(),
            postal_code: self.spec.subject.postal_code.clone(),
        }
    }

    /// Mount tuning with the max lease TTL falling back to the CA
    /// certificate TTL when not set explicitly.
    pub fn tune_config(&self) -> TuneConfig {
        let max_lease_ttl = if !self.spec.settings.ttl.is_empty()
            && self.spec.tuning.max_lease_ttl.is_empty()
        {
            self.spec.settings.ttl.as_duration()
        } else {
            self.spec.tuning.max_lease_ttl.as_duration()
        };

        TuneConfig {
            default_lease_ttl: self.spec.tuning.default_lease_ttl.as_duration(),
            max_lease_ttl,
            description: self.spec.tuning.description.clone(),
        }
    }
}
