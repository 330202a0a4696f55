//! # VaultCertificateRole
//!
//! Defines issuance constraints for leaf certificates under a
//! VaultCertificateAuthority and emits the issue/sign-csr/sign-verbatim
//! policies on the role's sub-paths.

use super::conditions::Condition;
use super::duration::DurationString;
use crate::vault::pki::{RoleSettings, RoleSubject};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateRoleSubject {
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
pub struct VaultCertificateRoleSettings {
    /// TTL configures the validity of issued certificates.
    #[serde(default)]
    pub ttl: DurationString,

    /// MaxTTL configures the maximum validity of issued certificates.
    #[serde(default, rename = "maxTTL")]
    pub max_ttl: DurationString,

    #[serde(default)]
    pub allow_localhost: bool,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allowed_domains_template: bool,
    #[serde(default)]
    pub allow_bare_domains: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub allow_glob_domains: bool,
    #[serde(default)]
    pub allow_any_name: bool,
    #[serde(default)]
    pub enforce_host_names: bool,
    #[serde(default, rename = "allowIPSans")]
    pub allow_ip_sans: bool,
    #[serde(default, rename = "allowedURISans")]
    pub allowed_uri_sans: Vec<String>,
    #[serde(default)]
    pub allowed_other_sans: Vec<String>,
    #[serde(default)]
    pub server_flag: bool,
    #[serde(default)]
    pub client_flag: bool,
    #[serde(default)]
    pub code_signing_flag: bool,
    #[serde(default)]
    pub email_protection_flag: bool,
    #[serde(default)]
    pub key_type: String,
    #[serde(default)]
    pub key_bits: i32,
    #[serde(default)]
    pub key_usage: Vec<String>,
    #[serde(default)]
    pub extended_key_usage: Vec<String>,
    #[serde(default, rename = "extendedKeyUsageOIDS")]
    pub extended_key_usage_oids: Vec<String>,
    #[serde(default, rename = "useCSRCommonName")]
    pub use_csr_common_name: bool,
    #[serde(default, rename = "useCSRSans")]
    pub use_csr_sans: bool,
    #[serde(default)]
    pub require_common_name: bool,
    #[serde(default)]
    pub policy_identifiers: Vec<String>,
    #[serde(default, rename = "basicConstraintsValidForNonCA")]
    pub basic_constraints_valid_for_non_ca: bool,
    #[serde(default)]
    pub not_before_duration: DurationString,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultCertificateRole",
    plural = "vaultcertificateroles",
    shortname = "vcr",
    namespaced,
    status = "VaultCertificateRoleStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateRoleSpec {
    /// Issuer names the VaultCertificateAuthority used to issue
    /// certificates for this role.
    #[serde(default)]
    pub issuer: String,

    #[serde(default)]
    pub subject: VaultCertificateRoleSubject,

    #[serde(default)]
    pub settings: VaultCertificateRoleSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultCertificateRoleStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl VaultCertificateRole {
    /// Deterministic name of the role on the issuer's PKI mount.
    pub fn role_name(&self) -> String {
        crate::names::certificate_role_name(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default(),
        )
    }

    pub fn role_settings(&self) -> RoleSettings {
        let settings = &self.spec.settings;
        RoleSettings {
            ttl: settings.ttl.as_duration(),
            max_ttl: settings.max_ttl.as_duration(),
            allow_localhost: settings.allow_localhost,
            allowed_domains: settings.allowed_domains.clone(),
            allowed_domains_template: settings.allowed_domains_template,
            allow_bare_domains: settings.allow_bare_domains,
            allow_subdomains: settings.allow_subdomains,
            allow_glob_domains: settings.allow_glob_domains,
            allow_any_name: settings.allow_any_name,
            enforce_host_names: settings.enforce_host_names,
            allow_ip_sans: settings.allow_ip_sans,
            allowed_uri_sans: settings.allowed_uri_sans.clone(),
            allowed_other_sans: settings.allowed_other_sans.clone(),
            server_flag: settings.server_flag,
            client_flag: settings.client_flag,
            code_signing_flag: settings.code_signing_flag,
            email_protection_flag: settings.email_protection_flag,
            key_type: settings.key_type.clone(),
            key_bits: settings.key_bits,
            key_usage: settings.key_usage.clone(),
            extended_key_usage: settings.extended_key_usage.clone(),
            extended_key_usage_oids: settings.extended_key_usage_oids.clone(),
            use_csr_common_name: settings.use_csr_common_name,
            use_csr_sans: settings.use_csr_sans,
            generate_lease: true,
            no_store: false,
            require_common_name: settings.require_common_name,
            policy_identifiers: settings.policy_identifiers.clone(),
            basic_constraints_valid_for_non_ca: settings.basic_constraints_valid_for_non_ca,
            not_before_duration: settings.not_before_duration.as_duration(),
        }
    }

    pub fn role_subject(&self) -> RoleSubject {
        RoleSubject {
            organization: self.spec.subject.organization.clone(),
            organizational_unit: self.spec.subject.organizational_unit.clone(),
            country: self.spec.subject.country.clone(),
            locality: self.spec.subject.locality.clone(),
            province: self.spec.subject.province.clone(),
            street_address: self.spec.subject.street_address.clone(),
            postal_code: self.spec.subject.postal_code.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_is_deterministic() {
        let mut role = VaultCertificateRole::new("web-server", VaultCertificateRoleSpec::default());
        role.metadata.namespace = Some("team-a".to_string());
        assert_eq!(role.role_name(), "managed.pki.cert.team-a.web-server");
    }

    #[test]
    fn settings_always_generate_leases_and_store_certs() {
        let role = VaultCertificateRole::new("web-server", VaultCertificateRoleSpec::default());
        let settings = role.role_settings();
        assert!(settings.generate_lease);
        assert!(!settings.no_store);
    }
}
