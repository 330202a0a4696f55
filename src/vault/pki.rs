//! # PKI engine entities
//!
//! Typed settings for certificate authorities, certificate roles, and
//! issued certificates.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Key algorithm of a CA certificate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CaKeyType {
    #[default]
    Rsa,
    Ec,
}

impl CaKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaKeyType::Rsa => "rsa",
            CaKeyType::Ec => "ec",
        }
    }
}

/// Whether the CA private key stays readable inside Vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaMode {
    /// Private key is kept inside Vault and cannot be read back.
    Internal,
    /// Private key is retained readable so bindings may expose it.
    Exported,
}

/// Key pair and SAN settings of a certificate authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaSettings {
    pub subject_alternative_names: Vec<String>,
    pub ip_sans: Vec<String>,
    pub uri_sans: Vec<String>,
    pub other_sans: Vec<String>,
    pub ttl: Option<Duration>,
    pub key_type: CaKeyType,
    pub key_bits: i32,
    pub exclude_cn_from_sans: bool,
    pub permitted_dns_domains: Vec<String>,
}

/// Subject fields of a certificate authority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaSubject {
    pub common_name: String,
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub locality: Vec<String>,
    pub province: Vec<String>,
    pub street_address: Vec<String>,
    pub postal_code: Vec<String>,
}

/// Mount tuning applied to a PKI engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuneConfig {
    pub default_lease_ttl: Option<Duration>,
    pub max_lease_ttl: Option<Duration>,
    pub description: String,
}

/// An imported certificate/key pair replacing generated CA material.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportedCert {
    pub certificate: String,
    pub private_key: String,
}

/// Everything needed to create or update a CA on a PKI mount.
#[derive(Debug, Clone, Default)]
pub struct CaEntity {
    pub path: String,
    pub plugin: String,
    pub settings: CaSettings,
    pub subject: CaSubject,
    pub tune: TuneConfig,
    pub imported_cert: Option<ImportedCert>,
}

/// Material derived from CA creation, persisted into the internal KV.
#[derive(Debug, Clone, Default)]
pub struct CaInfo {
    pub certificate: String,
    pub certificate_chain: String,
    pub private_key: String,
    pub private_key_type: String,
    pub issuing_certificate_authority: String,
    pub serial_number: String,
}

/// Issuance constraints of a certificate role on a PKI mount.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSettings {
    pub ttl: Option<Duration>,
    pub max_ttl: Option<Duration>,
    pub allow_localhost: bool,
    pub allowed_domains: Vec<String>,
    pub allowed_domains_template: bool,
    pub allow_bare_domains: bool,
    pub allow_subdomains: bool,
    pub allow_glob_domains: bool,
    pub allow_any_name: bool,
    pub enforce_host_names: bool,
    pub allow_ip_sans: bool,
    pub allowed_uri_sans: Vec<String>,
    pub allowed_other_sans: Vec<String>,
    pub server_flag: bool,
    pub client_flag: bool,
    pub code_signing_flag: bool,
    pub email_protection_flag: bool,
    pub key_type: String,
    pub key_bits: i32,
    pub key_usage: Vec<String>,
    pub extended_key_usage: Vec<String>,
    pub extended_key_usage_oids: Vec<String>,
    pub use_csr_common_name: bool,
    pub use_csr_sans: bool,
    pub generate_lease: bool,
    pub no_store: bool,
    pub require_common_name: bool,
    pub policy_identifiers: Vec<String>,
    pub basic_constraints_valid_for_non_ca: bool,
    pub not_before_duration: Option<Duration>,
}

/// Subject defaults applied to certificates issued through a role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSubject {
    pub organization: Vec<String>,
    pub organizational_unit: Vec<String>,
    pub country: Vec<String>,
    pub locality: Vec<String>,
    pub province: Vec<String>,
    pub street_address: Vec<String>,
    pub postal_code: Vec<String>,
}

/// Per-request options for issuing a certificate.
#[derive(Debug, Clone, Default)]
pub struct IssueCertOptions {
    pub common_name: String,
    pub dns_sans: Vec<String>,
    pub other_sans: Vec<String>,
    pub ip_sans: Vec<String>,
    pub uri_sans: Vec<String>,
    pub ttl: Option<Duration>,
    pub exclude_cn_from_sans: bool,
}

/// A certificate issued through the `issue` endpoint.
#[derive(Debug, Clone, Default)]
pub struct IssuedCertificate {
    pub certificate: String,
    pub private_key: String,
    /// Chain of the issuing CA in leaf-to-root order.
    pub ca_chain: Vec<String>,
    pub serial_number: String,
}
