//! # Binding artifacts
//!
//! The dominant binding produces three artifacts: the Vault
//! kubernetes-auth role, the VaultClientConfig consumed by agents, and the
//! cluster Role/RoleBinding granting the subject read access to that
//! config.

use crate::constants::{INTERNAL_KV_ENGINE_PATH, KUBERNETES_AUTH_PATH};
use crate::controller::{Ctx, Error};
use crate::crd::{
    VaultBinding, VaultBindingSpec, VaultCertificateAuthority, VaultCertificateAuthorityKVSecretRef,
    VaultCertificateAuthorityRef, VaultCertificateRef, VaultCertificateRole, VaultClientConfig,
    VaultClientConfigSpec, VaultKVSecret, VaultKVSecretEngine, VaultKVSecretRef, VaultTransitEngine,
    VaultTransitKey, VaultTransitKeyRef,
};
use crate::names;
use crate::vault::kubernetes_auth::AuthRole;
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// Upsert the auth role carrying the assembled policy set. An empty policy
/// list deletes the role instead, so a binding with nothing granted does
/// not leave a callable empty role behind.
pub async fn apply_vault_role(
    ctx: &Ctx,
    binding: &VaultBinding,
    policies: Vec<String>,
) -> Result<(), Error> {
    let role = AuthRole {
        name: binding.vault_role_name(),
        bound_namespaces: vec![binding.namespace().unwrap_or_default()],
        bound_service_accounts: vec![binding.spec.subject.name.clone()],
        policies,
    };

    if role.policies.is_empty() {
        ctx.vault
            .delete_kubernetes_auth_role(KUBERNETES_AUTH_PATH, &role.name)
            .await?;
    } else {
        ctx.vault
            .update_kubernetes_auth_role(KUBERNETES_AUTH_PATH, &role)
            .await?;
    }

    Ok(())
}

pub async fn delete_vault_role(ctx: &Ctx, binding: &VaultBinding) -> Result<(), Error> {
    ctx.vault
        .delete_kubernetes_auth_role(KUBERNETES_AUTH_PATH, &binding.vault_role_name())
        .await?;
    Ok(())
}

/// Server-side-apply an owned artifact object.
async fn apply_owned<K>(ctx: &Ctx, namespace: &str, object: &K) -> Result<(), Error>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Serialize
        + DeserializeOwned
        + Clone
        + Debug,
{
    let api: Api<K> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch(
        &object.name_any(),
        &PatchParams::apply("heist-controller").force(),
        &Patch::Apply(object),
    )
    .await?;
    Ok(())
}

/// Build and apply the client config describing every granted resource for
/// the agent.
pub async fn apply_client_config(
    ctx: &Ctx,
    binding: &VaultBinding,
    spec: &VaultBindingSpec,
) -> Result<(), Error> {
    let namespace = binding.namespace().unwrap_or_default();

    let mut kv_secrets = Vec::with_capacity(spec.kv_secrets.len());
    let kv_api: Api<VaultKVSecret> = Api::namespaced(ctx.client.clone(), &namespace);
    let kv_engine_api: Api<VaultKVSecretEngine> = Api::namespaced(ctx.client.clone(), &namespace);
    for kv in &spec.kv_secrets {
        let secret = kv_api.get(&kv.name).await?;
        let engine = kv_engine_api.get(&secret.spec.engine).await?;
        kv_secrets.push(VaultKVSecretRef {
            name: kv.name.clone(),
            engine_path: engine.mount_path(),
            secret_path: secret.secret_path(),
            capabilities: kv.capabilities.clone(),
        });
    }

    let mut certificate_authorities = Vec::with_capacity(spec.certificate_authorities.len());
    let ca_api: Api<VaultCertificateAuthority> = Api::namespaced(ctx.client.clone(), &namespace);
    for authority in &spec.certificate_authorities {
        let ca = ca_api.get(&authority.name).await?;
        certificate_authorities.push(VaultCertificateAuthorityRef {
            name: authority.name.clone(),
            engine_path: ca.mount_path(),
            kv_secrets: VaultCertificateAuthorityKVSecretRef {
                engine_path: INTERNAL_KV_ENGINE_PATH.to_string(),
                public_secret_path: names::ca_public_info_path(&namespace, &authority.name),
                private_secret_path: names::ca_private_info_path(&namespace, &authority.name),
            },
            capabilities: authority.capabilities.clone(),
        });
    }

    let mut certificates = Vec::with_capacity(spec.certificate_roles.len());
    let role_api: Api<VaultCertificateRole> = Api::namespaced(ctx.client.clone(), &namespace);
    for certificate in &spec.certificate_roles {
        let role = role_api.get(&certificate.name).await?;
        let issuer = ca_api.get(&role.spec.issuer).await?;
        certificates.push(VaultCertificateRef {
            name: certificate.name.clone(),
            engine_path: issuer.mount_path(),
            role_name: role.role_name(),
            capabilities: certificate.capabilities.clone(),
        });
    }

    let mut transit_keys = Vec::with_capacity(spec.transit_keys.len());
    let key_api: Api<VaultTransitKey> = Api::namespaced(ctx.client.clone(), &namespace);
    let transit_engine_api: Api<VaultTransitEngine> =
        Api::namespaced(ctx.client.clone(), &namespace);
    for key in &spec.transit_keys {
        let transit_key = key_api.get(&key.name).await?;
        let engine = transit_engine_api.get(&transit_key.spec.engine).await?;
        transit_keys.push(VaultTransitKeyRef {
            name: key.name.clone(),
            engine_path: engine.mount_path(),
            key_name: transit_key.transit_key_name(),
            capabilities: key.capabilities.clone(),
        });
    }

    let mut config = VaultClientConfig::new(
        &binding.spec.subject.name,
        VaultClientConfigSpec {
            address: ctx.vault.address(),
            role: binding.vault_role_name(),
            ca_certs: ctx.vault.ca_certs(),
            auth_mount_path: KUBERNETES_AUTH_PATH.to_string(),
            certificate_authorities,
            kv_secrets,
            certificates,
            transit_keys,
            templates: spec.agent.clone(),
        },
    );
    config.metadata.namespace = Some(namespace.clone());
    config.metadata.owner_references =
        binding.controller_owner_ref(&()).map(|reference| vec![reference]);

    apply_owned(ctx, &namespace, &config).await
}

/// The cluster Role granting read on client configs.
pub fn build_rbac_role(binding: &VaultBinding) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(names::client_config_rbac_name(&binding.spec.subject.name)),
            namespace: binding.namespace(),
            owner_references: binding.controller_owner_ref(&()).map(|r| vec![r]),
            ..ObjectMeta::default()
        },
        rules: Some(vec![PolicyRule {
            verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
            api_groups: Some(vec!["heist.youniqx.com".to_string()]),
            resources: Some(vec!["vaultclientconfigs".to_string()]),
            ..PolicyRule::default()
        }]),
    }
}

/// The RoleBinding wiring the subject's service account to that Role.
pub fn build_rbac_role_binding(binding: &VaultBinding) -> RoleBinding {
    let rbac_name = names::client_config_rbac_name(&binding.spec.subject.name);
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(rbac_name.clone()),
            namespace: binding.namespace(),
            owner_references: binding.controller_owner_ref(&()).map(|r| vec![r]),
            ..ObjectMeta::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "Role".to_string(),
            name: rbac_name,
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: binding.spec.subject.name.clone(),
            namespace: binding.namespace(),
            ..Subject::default()
        }]),
    }
}

pub async fn apply_rbac(ctx: &Ctx, binding: &VaultBinding) -> Result<(), Error> {
    let namespace = binding.namespace().unwrap_or_default();
    apply_owned(ctx, &namespace, &build_rbac_role(binding)).await?;
    apply_owned(ctx, &namespace, &build_rbac_role_binding(binding)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::VaultBindingSubject;

    fn binding() -> VaultBinding {
        let mut binding = VaultBinding::new(
            "grants",
            VaultBindingSpec {
                subject: VaultBindingSubject {
                    name: "backend".to_string(),
                },
                ..VaultBindingSpec::default()
            },
        );
        binding.metadata.namespace = Some("team-a".to_string());
        binding.metadata.uid = Some("uid-1".to_string());
        binding
    }

    #[test]
    fn rbac_role_grants_read_on_client_configs() {
        let role = build_rbac_role(&binding());
        assert_eq!(role.metadata.name.as_deref(), Some("backend-client-config"));
        let rules = role.rules.unwrap();
        assert_eq!(rules[0].verbs, vec!["get", "list", "watch"]);
        assert_eq!(
            rules[0].resources.as_ref().unwrap(),
            &vec!["vaultclientconfigs".to_string()]
        );
    }

    #[test]
    fn rbac_role_binding_targets_service_account() {
        let role_binding = build_rbac_role_binding(&binding());
        assert_eq!(role_binding.role_ref.name, "backend-client-config");
        let subjects = role_binding.subjects.unwrap();
        assert_eq!(subjects[0].kind, "ServiceAccount");
        assert_eq!(subjects[0].name, "backend");
        assert_eq!(subjects[0].namespace.as_deref(), Some("team-a"));
    }

    #[test]
    fn artifacts_carry_owner_references() {
        let role = build_rbac_role(&binding());
        let owners = role.metadata.owner_references.unwrap();
        assert_eq!(owners[0].kind, "VaultBinding");
        assert_eq!(owners[0].controller, Some(true));
    }

    #[tokio::test]
    async fn empty_policy_list_deletes_the_role() {
        use crate::testutil;
        use crate::vault::mem::InMemoryVault;
        use std::sync::Arc;

        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());
        let binding = binding();

        // Seed a role, then apply with no policies.
        apply_vault_role(&ctx, &binding, vec!["managed.kv.team-a.db".to_string()])
            .await
            .unwrap();
        assert!(vault
            .auth_role(KUBERNETES_AUTH_PATH, "managed.k8s.team-a.backend")
            .is_some());

        apply_vault_role(&ctx, &binding, Vec::new()).await.unwrap();
        assert!(vault
            .auth_role(KUBERNETES_AUTH_PATH, "managed.k8s.team-a.backend")
            .is_none());
    }

    #[tokio::test]
    async fn vault_role_binds_subject_identity() {
        use crate::testutil;
        use crate::vault::mem::InMemoryVault;
        use std::sync::Arc;

        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        apply_vault_role(&ctx, &binding(), vec!["managed.kv.team-a.db".to_string()])
            .await
            .unwrap();

        let role = vault
            .auth_role(KUBERNETES_AUTH_PATH, "managed.k8s.team-a.backend")
            .unwrap();
        assert_eq!(role.bound_namespaces, vec!["team-a"]);
        assert_eq!(role.bound_service_accounts, vec!["backend"]);
        assert_eq!(role.policies, vec!["managed.kv.team-a.db"]);
    }
}
