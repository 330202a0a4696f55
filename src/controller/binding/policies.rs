//! # Policy assembly
//!
//! The dominant binding walks its grants and collects the deterministic
//! policy names previously emitted by the granted resources. The list is
//! never partially applied: any missing reference fails the whole
//! reconciliation.

use crate::constants::MANAGED_ENCRYPT_POLICY_NAME;
use crate::controller::{Ctx, Error};
use crate::crd::{
    BindingCapability, CertificateAuthorityCapability, CertificateCapability, KvCapability,
    TransitKeyCapability, VaultBindingSpec, VaultCertificateAuthority, VaultCertificateRole,
    VaultKVSecret, VaultTransitKey,
};
use crate::names;
use kube::api::Api;

/// Derive the policy names granted by an (effective) binding spec.
///
/// Pure: reference existence is checked separately so the mapping can be
/// tested without a cluster.
pub fn assemble_policy_names(namespace: &str, spec: &VaultBindingSpec) -> Vec<String> {
    let mut policies = Vec::new();

    for capability in &spec.capabilities {
        match capability {
            BindingCapability::Encrypt => {
                policies.push(MANAGED_ENCRYPT_POLICY_NAME.to_string());
            }
        }
    }

    for kv in &spec.kv_secrets {
        for capability in &kv.capabilities {
            match capability {
                KvCapability::Read => {
                    policies.push(names::kv_secret_policy_name(namespace, &kv.name));
                }
            }
        }
    }

    for authority in &spec.certificate_authorities {
        for capability in &authority.capabilities {
            match capability {
                CertificateAuthorityCapability::ReadPublic => {
                    policies.push(names::ca_public_policy_name(namespace, &authority.name));
                }
                CertificateAuthorityCapability::ReadPrivate => {
                    policies.push(names::ca_private_policy_name(namespace, &authority.name));
                }
            }
        }
    }

    for certificate in &spec.certificate_roles {
        for capability in &certificate.capabilities {
            match capability {
                CertificateCapability::Issue => {
                    policies.push(names::certificate_issue_policy_name(
                        namespace,
                        &certificate.name,
                    ));
                }
                CertificateCapability::SignCsr => {
                    policies.push(names::certificate_sign_csr_policy_name(
                        namespace,
                        &certificate.name,
                    ));
                }
                CertificateCapability::SignVerbatim => {
                    policies.push(names::certificate_sign_verbatim_policy_name(
                        namespace,
                        &certificate.name,
                    ));
                }
            }
        }
    }

    for key in &spec.transit_keys {
        for capability in &key.capabilities {
            let verb = match capability {
                TransitKeyCapability::Encrypt => "encrypt",
                TransitKeyCapability::Decrypt => "decrypt",
                TransitKeyCapability::Rewrap => "rewrap",
                TransitKeyCapability::Datakey => "datakey",
                TransitKeyCapability::Hmac => "hmac",
                TransitKeyCapability::Sign => "sign",
                TransitKeyCapability::Verify => "verify",
                TransitKeyCapability::Read => "read",
            };
            policies.push(names::transit_key_policy_name(verb, namespace, &key.name));
        }
    }

    policies
}

/// Verify every referenced object exists; a dangling reference yields a
/// configuration error and nothing is applied.
pub async fn verify_references(
    ctx: &Ctx,
    namespace: &str,
    spec: &VaultBindingSpec,
) -> Result<(), Error> {
    let kv_api: Api<VaultKVSecret> = Api::namespaced(ctx.client.clone(), namespace);
    for kv in &spec.kv_secrets {
        kv_api.get(&kv.name).await.map_err(|error| {
            Error::Config(format!("referenced VaultKVSecret {} not found: {error}", kv.name))
        })?;
    }

    let ca_api: Api<VaultCertificateAuthority> = Api::namespaced(ctx.client.clone(), namespace);
    for authority in &spec.certificate_authorities {
        ca_api.get(&authority.name).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultCertificateAuthority {} not found: {error}",
                authority.name
            ))
        })?;
    }

    let role_api: Api<VaultCertificateRole> = Api::namespaced(ctx.client.clone(), namespace);
    for certificate in &spec.certificate_roles {
        role_api.get(&certificate.name).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultCertificateRole {} not found: {error}",
                certificate.name
            ))
        })?;
    }

    let key_api: Api<VaultTransitKey> = Api::namespaced(ctx.client.clone(), namespace);
    for key in &spec.transit_keys {
        key_api.get(&key.name).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultTransitKey {} not found: {error}",
                key.name
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{
        VaultBindingCertificate, VaultBindingCertificateAuthority, VaultBindingKV,
        VaultBindingSubject, VaultBindingTransitKey,
    };

    fn spec() -> VaultBindingSpec {
        VaultBindingSpec {
            subject: VaultBindingSubject {
                name: "backend".to_string(),
            },
            capabilities: vec![BindingCapability::Encrypt],
            kv_secrets: vec![VaultBindingKV {
                name: "db".to_string(),
                capabilities: vec![KvCapability::Read],
            }],
            certificate_authorities: vec![VaultBindingCertificateAuthority {
                name: "intermediate".to_string(),
                capabilities: vec![
                    CertificateAuthorityCapability::ReadPublic,
                    CertificateAuthorityCapability::ReadPrivate,
                ],
            }],
            certificate_roles: vec![VaultBindingCertificate {
                name: "web".to_string(),
                capabilities: vec![
                    CertificateCapability::Issue,
                    CertificateCapability::SignCsr,
                    CertificateCapability::SignVerbatim,
                ],
            }],
            transit_keys: vec![VaultBindingTransitKey {
                name: "signer".to_string(),
                capabilities: vec![TransitKeyCapability::Sign, TransitKeyCapability::Verify],
            }],
            ..VaultBindingSpec::default()
        }
    }

    #[test]
    fn assembles_policies_in_grant_order() {
        let policies = assemble_policy_names("ns", &spec());
        assert_eq!(
            policies,
            vec![
                "managed.encrypt",
                "managed.kv.ns.db",
                "managed.pki.ca.public.ns.intermediate",
                "managed.pki.ca.private.ns.intermediate",
                "managed.pki.cert.issue.ns.web",
                "managed.pki.cert.sign-csr.ns.web",
                "managed.pki.cert.sign-verbatim.ns.web",
                "managed.transit.key.sign.ns.signer",
                "managed.transit.key.verify.ns.signer",
            ]
        );
    }

    #[test]
    fn empty_grants_assemble_no_policies() {
        let spec = VaultBindingSpec {
            subject: VaultBindingSubject {
                name: "backend".to_string(),
            },
            ..VaultBindingSpec::default()
        };
        assert!(assemble_policy_names("ns", &spec).is_empty());
    }

    #[test]
    fn capabilities_without_grants_emit_nothing() {
        let spec = VaultBindingSpec {
            subject: VaultBindingSubject {
                name: "backend".to_string(),
            },
            kv_secrets: vec![VaultBindingKV {
                name: "db".to_string(),
                capabilities: Vec::new(),
            }],
            ..VaultBindingSpec::default()
        };
        // Defaulting happens in effective_spec; raw assembly maps only
        // what is present.
        assert!(assemble_policy_names("ns", &spec).is_empty());
    }
}
