//! Scenario tests driving the Vault-facing half of the controllers through
//! the in-memory backend: managed bootstrap, KV round-trips, CA chains,
//! and policy assembly for bindings.

use heist_controller::constants::{
    CA_CERTIFICATE_CHAIN_FIELD, CA_CERTIFICATE_FIELD, CA_CERTIFICATE_FULL_CHAIN_FIELD,
    INTERNAL_KV_ENGINE_PATH, KUBERNETES_AUTH_PATH,
};
use heist_controller::controller::binding::policies::assemble_policy_names;
use heist_controller::controller::certificate_authority::chain_fields;
use heist_controller::controller::transit_key::key_policies;
use heist_controller::crd::{
    KvCapability, VaultBindingKV, VaultBindingSpec, VaultBindingSubject,
};
use heist_controller::managed;
use heist_controller::names;
use heist_controller::vault::kubernetes_auth::AuthRole;
use heist_controller::vault::kv::{KvEngineConfig, KvSecret};
use heist_controller::vault::mem::InMemoryVault;
use heist_controller::vault::pki::{CaEntity, CaMode, CaSubject, IssueCertOptions, RoleSettings, RoleSubject};
use heist_controller::vault::transit::{KeyConfig, KeyType};
use heist_controller::vault::Api;
use std::collections::BTreeMap;

fn ca_entity(path: &str, common_name: &str) -> CaEntity {
    CaEntity {
        path: path.to_string(),
        plugin: "pki".to_string(),
        subject: CaSubject {
            common_name: common_name.to_string(),
            ..CaSubject::default()
        },
        ..CaEntity::default()
    }
}

/// The KvSecret round-trip of the end-to-end flow: a user field encrypted
/// with the managed transit key lands as cleartext at the secret's KV path
/// and is readable back for materialization.
#[tokio::test]
async fn kv_secret_round_trip() {
    let vault = InMemoryVault::new();
    managed::ensure_managed_components(&vault).await.unwrap();

    // Admission-time encryption of the user value.
    let ciphertext = managed::encrypt(&vault, b"ASDF ASDF").await.unwrap();
    assert!(ciphertext.starts_with("vault:v"));

    // Engine controller: mount at the deterministic path.
    let engine_path = names::kv_engine_mount_path("ns", "e");
    vault
        .update_kv_engine(&engine_path, &KvEngineConfig::default())
        .await
        .unwrap();

    // KvSecret controller: decrypt and write cleartext plus read policy.
    let plaintext = managed::decrypt(&vault, &ciphertext).await.unwrap();
    let mut fields = BTreeMap::new();
    fields.insert(
        "some_field".to_string(),
        String::from_utf8(plaintext).unwrap(),
    );
    vault
        .update_kv_secret(&engine_path, &KvSecret::new("s", fields))
        .await
        .unwrap();

    // SyncSecret data fetch: the stored field holds the original value.
    let stored = vault.read_kv_secret(&engine_path, "s").await.unwrap();
    assert_eq!(stored.fields.get("some_field").unwrap(), "ASDF ASDF");
}

/// Intermediate chain: the persisted full chain is chain + root and ends
/// with the root certificate.
#[tokio::test]
async fn intermediate_ca_full_chain_ends_with_root() {
    let vault = InMemoryVault::new();

    let root_path = names::pki_mount_path("ns", "root");
    let root = vault
        .create_root_ca(CaMode::Internal, &ca_entity(&root_path, "Root"))
        .await
        .unwrap();

    let intermediate_path = names::pki_mount_path("ns", "intermediate");
    let intermediate = vault
        .create_intermediate_ca(
            CaMode::Internal,
            &root_path,
            &ca_entity(&intermediate_path, "Intermediate"),
        )
        .await
        .unwrap();

    let root_pem = vault.read_ca_certificate_pem(&root_path).await.unwrap();
    assert_eq!(root_pem, root.certificate);

    let (chain, full_chain) = chain_fields(&intermediate, Some(root_pem.as_str()));
    assert_eq!(chain, intermediate.certificate_chain);
    assert!(full_chain.starts_with(intermediate.certificate.trim_end()));
    assert!(full_chain.ends_with(&root_pem));
    assert_eq!(full_chain, format!("{}\n{root_pem}", chain.trim_end()));
}

/// Certificate issuance through a role returns leaf material whose chain
/// composes the same way the sync-secret fetch does.
#[tokio::test]
async fn issued_certificate_full_chain() {
    let vault = InMemoryVault::new();

    let root_path = names::pki_mount_path("ns", "root");
    vault
        .create_root_ca(CaMode::Internal, &ca_entity(&root_path, "Root"))
        .await
        .unwrap();

    let intermediate_path = names::pki_mount_path("ns", "intermediate");
    vault
        .create_intermediate_ca(
            CaMode::Internal,
            &root_path,
            &ca_entity(&intermediate_path, "Intermediate"),
        )
        .await
        .unwrap();

    let role_name = names::certificate_role_name("ns", "web");
    vault
        .update_certificate_role(
            &intermediate_path,
            &role_name,
            &RoleSettings::default(),
            &RoleSubject::default(),
        )
        .await
        .unwrap();

    let issued = vault
        .issue_certificate(
            &intermediate_path,
            &role_name,
            &IssueCertOptions {
                common_name: "svc.example.com".to_string(),
                ..IssueCertOptions::default()
            },
        )
        .await
        .unwrap();

    let root_pem = vault.read_ca_certificate_pem(&root_path).await.unwrap();
    let chain = issued.ca_chain.join("\n");
    let full_chain = format!("{}\n{root_pem}", chain.trim());
    assert!(full_chain.ends_with(&root_pem));
    assert_ne!(issued.certificate, root_pem);
    assert!(!issued.private_key.is_empty());
}

/// CA teardown leaves nothing behind: mount, internal secrets and both
/// policies are gone, and a re-created CA lands on identical paths.
#[tokio::test]
async fn ca_teardown_and_recreation_is_stable() {
    let vault = InMemoryVault::new();
    managed::ensure_managed_components(&vault).await.unwrap();

    let path = names::pki_mount_path("ns", "root");
    vault
        .create_root_ca(CaMode::Internal, &ca_entity(&path, "Root"))
        .await
        .unwrap();

    let mut public = BTreeMap::new();
    public.insert(CA_CERTIFICATE_FIELD.to_string(), "cert".to_string());
    public.insert(CA_CERTIFICATE_CHAIN_FIELD.to_string(), String::new());
    public.insert(CA_CERTIFICATE_FULL_CHAIN_FIELD.to_string(), "cert".to_string());
    vault
        .update_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &KvSecret::new(names::ca_public_info_path("ns", "root"), public),
        )
        .await
        .unwrap();

    // Teardown as the finalizer does.
    vault.delete_engine(&path).await.unwrap();
    vault
        .delete_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &names::ca_public_info_path("ns", "root"),
        )
        .await
        .unwrap();

    assert!(!vault.engine_exists(&path));
    assert!(vault
        .kv_secret_fields(INTERNAL_KV_ENGINE_PATH, "ns/pki/ca/public/root")
        .is_none());

    // Re-creation yields the same deterministic path.
    vault
        .create_root_ca(CaMode::Internal, &ca_entity(&path, "Root"))
        .await
        .unwrap();
    assert!(vault.engine_exists(&path));
}

/// Incompatible transit key change at the Vault level: delete on the old
/// engine, create on the new, policies re-emitted with identical contents.
#[tokio::test]
async fn transit_key_recreation_keeps_policy_contents() {
    let vault = InMemoryVault::new();

    let engine_path = names::transit_engine_mount_path("ns", "crypto");
    vault.update_transit_engine(&engine_path, "transit").await.unwrap();
    vault
        .update_transit_key(&engine_path, "k", KeyType::Aes256Gcm96, &KeyConfig::default())
        .await
        .unwrap();
    assert_eq!(
        vault.transit_key_type(&engine_path, "k"),
        Some(KeyType::Aes256Gcm96)
    );

    let policies_before = key_policies(&engine_path, "k", "ns", "k");
    for policy in &policies_before {
        vault.update_policy(policy).await.unwrap();
    }
    let hcl_before = vault
        .policy_hcl("managed.transit.key.encrypt.ns.k")
        .unwrap();

    // Type change: delete old key, create anew, re-emit policies.
    vault.delete_transit_key(&engine_path, "k").await.unwrap();
    assert!(!vault.has_transit_key(&engine_path, "k"));
    vault
        .update_transit_key(&engine_path, "k", KeyType::Rsa2048, &KeyConfig::default())
        .await
        .unwrap();
    for policy in key_policies(&engine_path, "k", "ns", "k") {
        vault.update_policy(&policy).await.unwrap();
    }

    assert_eq!(
        vault.transit_key_type(&engine_path, "k"),
        Some(KeyType::Rsa2048)
    );
    assert_eq!(
        vault.policy_hcl("managed.transit.key.encrypt.ns.k").unwrap(),
        hcl_before
    );
}

/// Dominant-binding artifacts at the Vault level: the auth role carries
/// exactly the assembled policy set, and rebinding after deletion swaps
/// the policies.
#[tokio::test]
async fn auth_role_follows_dominant_policy_set() {
    let vault = InMemoryVault::new();

    let spec_b1 = VaultBindingSpec {
        subject: VaultBindingSubject {
            name: "sa".to_string(),
        },
        kv_secrets: vec![VaultBindingKV {
            name: "first".to_string(),
            capabilities: vec![KvCapability::Read],
        }],
        ..VaultBindingSpec::default()
    };
    let spec_b2 = VaultBindingSpec {
        subject: VaultBindingSubject {
            name: "sa".to_string(),
        },
        kv_secrets: vec![VaultBindingKV {
            name: "second".to_string(),
            capabilities: vec![KvCapability::Read],
        }],
        ..VaultBindingSpec::default()
    };

    let role_name = names::vault_auth_role_name("ns", "sa");

    // b1 dominant.
    vault
        .update_kubernetes_auth_role(
            KUBERNETES_AUTH_PATH,
            &AuthRole {
                name: role_name.clone(),
                policies: assemble_policy_names("ns", &spec_b1),
                bound_namespaces: vec!["ns".to_string()],
                bound_service_accounts: vec!["sa".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(
        vault.auth_role(KUBERNETES_AUTH_PATH, &role_name).unwrap().policies,
        vec!["managed.kv.ns.first"]
    );

    // b1 deleted, b2 takes over within the next reconciliation.
    vault
        .update_kubernetes_auth_role(
            KUBERNETES_AUTH_PATH,
            &AuthRole {
                name: role_name.clone(),
                policies: assemble_policy_names("ns", &spec_b2),
                bound_namespaces: vec!["ns".to_string()],
                bound_service_accounts: vec!["sa".to_string()],
            },
        )
        .await
        .unwrap();
    assert_eq!(
        vault.auth_role(KUBERNETES_AUTH_PATH, &role_name).unwrap().policies,
        vec!["managed.kv.ns.second"]
    );
}
