//! # VaultBinding
//!
//! Grants a service account access to managed resources. The reconciler
//! merges all grants of the dominant binding for a subject into a single
//! Vault kubernetes-auth role, a VaultClientConfig consumed by agents, and
//! cluster RBAC on that config.

use super::conditions::Condition;
use super::duration::DurationString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Field of a certificate or certificate authority that can be bound or
/// synced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateFieldType {
    #[default]
    Certificate,
    CertChain,
    FullCertChain,
    PrivateKey,
}

/// Settings for certificates issued on behalf of an agent or sync secret.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertificateTemplate {
    /// Alias is the name of this certificate template. When empty, the
    /// template is addressed by its certificate role name instead.
    #[serde(default)]
    pub alias: String,

    /// CertificateRole names the VaultCertificateRole used for issuing.
    pub certificate_role: String,

    /// CommonName is the CN of the issued certificate.
    #[serde(default)]
    pub common_name: String,

    #[serde(default)]
    pub dns_sans: Vec<String>,

    /// OtherSans entries use the format `<oid>;<type>:<value>`.
    #[serde(default)]
    pub other_sans: Vec<String>,

    #[serde(default)]
    pub ip_sans: Vec<String>,

    #[serde(default)]
    pub uri_sans: Vec<String>,

    /// TTL requested for issued certificates.
    #[serde(default)]
    pub ttl: DurationString,

    #[serde(default, rename = "excludeCNFromSans")]
    pub exclude_cn_from_sans: bool,
}

impl CertificateTemplate {
    /// The name this template is addressed by: alias when set, otherwise
    /// the certificate role name.
    pub fn matches(&self, name: &str) -> bool {
        if self.alias.is_empty() {
            self.certificate_role == name
        } else {
            self.alias == name
        }
    }
}

/// General capabilities not tied to a specific resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BindingCapability {
    /// Allows using the managed transit engine to encrypt values.
    Encrypt,
}

/// Capabilities grantable on a VaultKVSecret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum KvCapability {
    Read,
}

/// Capabilities grantable on a VaultCertificateAuthority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateAuthorityCapability {
    ReadPublic,
    ReadPrivate,
}

/// Capabilities grantable on a VaultCertificateRole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CertificateCapability {
    /// Issue new certificates through the role. The minimum capability when
    /// issuing via a binding; filled in when no capability is configured.
    Issue,
    /// Sign user provided CSRs with the fields configured on the role.
    SignCsr,
    /// Sign user provided CSRs verbatim, without field validation.
    SignVerbatim,
}

/// Capabilities grantable on a VaultTransitKey.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransitKeyCapability {
    Encrypt,
    Decrypt,
    Datakey,
    Rewrap,
    Sign,
    Hmac,
    Verify,
    Read,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingSubject {
    /// Name of the service account access is granted to.
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingKV {
    /// Name of the VaultKVSecret.
    pub name: String,

    /// Granted capabilities; defaults to `read`.
    #[serde(default)]
    pub capabilities: Vec<KvCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingCertificateAuthority {
    /// Name of the VaultCertificateAuthority in the binding's namespace.
    pub name: String,

    /// Granted capabilities; defaults to `read_public`.
    #[serde(default)]
    pub capabilities: Vec<CertificateAuthorityCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingCertificate {
    /// Name of the VaultCertificateRole.
    pub name: String,

    /// Granted capabilities; defaults to `issue`.
    #[serde(default)]
    pub capabilities: Vec<CertificateCapability>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingTransitKey {
    /// Name of the VaultTransitKey.
    pub name: String,

    /// Granted capabilities.
    #[serde(default)]
    pub capabilities: Vec<TransitKeyCapability>,
}

/// A file rendered into relevant pods by the agent.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingValueTemplate {
    /// Output path for this value. Relative paths are interpreted relative
    /// to the default agent secret directory.
    #[serde(default)]
    pub path: String,

    /// File mode of the output file as octal; defaults to 0640.
    #[serde(default)]
    pub mode: String,

    /// Template for this value, rendered by the agent with access to all
    /// bound secrets.
    #[serde(default)]
    pub template: String,
}

/// Agent sidecar configuration passed through to the client config.
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingAgentConfig {
    #[serde(default)]
    pub certificate_templates: Vec<CertificateTemplate>,

    #[serde(default)]
    pub templates: Vec<VaultBindingValueTemplate>,
}

#[derive(CustomResource, Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "heist.youniqx.com",
    version = "v1alpha1",
    kind = "VaultBinding",
    plural = "vaultbindings",
    shortname = "vb",
    namespaced,
    status = "VaultBindingStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingSpec {
    /// Subject configures the service account access is granted to.
    pub subject: VaultBindingSubject,

    /// General capabilities not tied to a specific resource.
    #[serde(default)]
    pub capabilities: Vec<BindingCapability>,

    #[serde(default, rename = "kvSecrets")]
    pub kv_secrets: Vec<VaultBindingKV>,

    #[serde(default)]
    pub certificate_authorities: Vec<VaultBindingCertificateAuthority>,

    #[serde(default)]
    pub certificate_roles: Vec<VaultBindingCertificate>,

    #[serde(default)]
    pub transit_keys: Vec<VaultBindingTransitKey>,

    /// Agent configures the agent sidecar for the subject's workloads.
    #[serde(default)]
    pub agent: VaultBindingAgentConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VaultBindingStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// AppliedSpec is a copy of the last spec the controller acted on.
    #[serde(default)]
    pub applied_spec: Option<VaultBindingSpec>,
}

impl VaultBinding {
    /// Name of the Vault kubernetes-auth role backing this binding's
    /// subject.
    pub fn vault_role_name(&self) -> String {
        crate::names::vault_auth_role_name(
            self.metadata.namespace.as_deref().unwrap_or_default(),
            &self.spec.subject.name,
        )
    }

    /// Effective spec with template modes and per-resource default
    /// capabilities filled in.
    pub fn effective_spec(&self) -> VaultBindingSpec {
        let mut spec = self.spec.clone();

        for template in &mut spec.agent.templates {
            if template.mode.is_empty() {
                template.mode = crate::constants::DEFAULT_TEMPLATE_MODE.to_string();
            }
        }

        for secret in &mut spec.kv_secrets {
            if secret.capabilities.is_empty() {
                secret.capabilities = vec![KvCapability::Read];
            }
        }

        for cert in &mut spec.certificate_roles {
            if cert.capabilities.is_empty() {
                cert.capabilities = vec![CertificateCapability::Issue];
            }
        }

        for ca in &mut spec.certificate_authorities {
            if ca.capabilities.is_empty() {
                ca.capabilities = vec![CertificateAuthorityCapability::ReadPublic];
            }
        }

        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> VaultBinding {
        let mut binding = VaultBinding::new(
            "backend-grants",
            VaultBindingSpec {
                subject: VaultBindingSubject {
                    name: "backend".to_string(),
                },
                kv_secrets: vec![VaultBindingKV {
                    name: "db-credentials".to_string(),
                    capabilities: Vec::new(),
                }],
                certificate_roles: vec![VaultBindingCertificate {
                    name: "web-server".to_string(),
                    capabilities: Vec::new(),
                }],
                certificate_authorities: vec![VaultBindingCertificateAuthority {
                    name: "intermediate".to_string(),
                    capabilities: vec![CertificateAuthorityCapability::ReadPrivate],
                }],
                agent: VaultBindingAgentConfig {
                    templates: vec![VaultBindingValueTemplate {
                        path: "creds".to_string(),
                        mode: String::new(),
                        template: "{{ kvSecret \"db-credentials\" \"password\" }}".to_string(),
                    }],
                    ..VaultBindingAgentConfig::default()
                },
                ..VaultBindingSpec::default()
            },
        );
        binding.metadata.namespace = Some("default".to_string());
        binding
    }

    #[test]
    fn vault_role_name_uses_subject() {
        assert_eq!(binding().vault_role_name(), "managed.k8s.default.backend");
    }

    #[test]
    fn effective_spec_fills_default_capabilities() {
        let spec = binding().effective_spec();
        assert_eq!(spec.kv_secrets[0].capabilities, vec![KvCapability::Read]);
        assert_eq!(
            spec.certificate_roles[0].capabilities,
            vec![CertificateCapability::Issue]
        );
        // Explicit capabilities are not overwritten.
        assert_eq!(
            spec.certificate_authorities[0].capabilities,
            vec![CertificateAuthorityCapability::ReadPrivate]
        );
    }

    #[test]
    fn effective_spec_fills_template_mode() {
        let spec = binding().effective_spec();
        assert_eq!(spec.agent.templates[0].mode, "0640");
    }

    #[test]
    fn template_matches_alias_before_role() {
        let template = CertificateTemplate {
            alias: "tls".to_string(),
            certificate_role: "web-server".to_string(),
            ..CertificateTemplate::default()
        };
        assert!(template.matches("tls"));
        assert!(!template.matches("web-server"));

        let unaliased = CertificateTemplate {
            certificate_role: "web-server".to_string(),
            ..CertificateTemplate::default()
        };
        assert!(unaliased.matches("web-server"));
    }

    #[test]
    fn capability_serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&CertificateCapability::SignVerbatim).unwrap(),
            "\"sign_verbatim\""
        );
        assert_eq!(
            serde_json::to_string(&CertificateAuthorityCapability::ReadPublic).unwrap(),
            "\"read_public\""
        );
        assert_eq!(
            serde_json::to_string(&CertificateFieldType::FullCertChain).unwrap(),
            "\"full_cert_chain\""
        );
    }
}
