//! # Managed components
//!
//! Vault objects owned by the operator itself rather than any custom
//! resource: the transit engine and key used to encrypt user-supplied
//! fields, the singleton encrypt policy, the kubernetes auth method, and
//! the internal KV engine holding CA material.

use crate::constants::{
    INTERNAL_KV_ENGINE_PATH, KUBERNETES_AUTH_PATH, MANAGED_ENCRYPT_POLICY_NAME,
    MANAGED_TRANSIT_ENGINE_PATH, MANAGED_TRANSIT_KEY_NAME,
};
use crate::vault;
use crate::vault::kv::KvEngineConfig;
use crate::vault::policy::{Policy, Rule};
use crate::vault::transit::{KeyConfig, KeyType};
use tracing::info;

/// Configuration of the internal KV engine. CAS is required so concurrent
/// writers cannot silently overwrite CA material.
pub fn internal_kv_engine_config() -> KvEngineConfig {
    KvEngineConfig {
        max_versions: 0,
        cas_required: true,
        delete_version_after: String::new(),
    }
}

/// The singleton policy granting encrypt access on the managed transit key.
pub fn encrypt_policy() -> Policy {
    Policy::new(
        MANAGED_ENCRYPT_POLICY_NAME,
        vec![Rule::update(format!(
            "{MANAGED_TRANSIT_ENGINE_PATH}/encrypt/{MANAGED_TRANSIT_KEY_NAME}"
        ))],
    )
}

/// Bring all operator-owned Vault objects into their desired state.
///
/// Runs once at startup before any controller processes events; every
/// reconciler may assume these objects exist.
pub async fn ensure_managed_components(api: &dyn vault::Api) -> vault::Result<()> {
    api.update_transit_engine(MANAGED_TRANSIT_ENGINE_PATH, "transit")
        .await?;

    api.update_transit_key(
        MANAGED_TRANSIT_ENGINE_PATH,
        MANAGED_TRANSIT_KEY_NAME,
        KeyType::Aes256Gcm96,
        &KeyConfig {
            minimum_decryption_version: 1,
            minimum_encryption_version: 1,
            deletion_allowed: false,
            exportable: false,
            allow_plaintext_backup: false,
        },
    )
    .await?;

    api.update_policy(&encrypt_policy()).await?;

    api.update_kubernetes_auth_method(KUBERNETES_AUTH_PATH).await?;

    api.update_kv_engine(INTERNAL_KV_ENGINE_PATH, &internal_kv_engine_config())
        .await?;

    info!("managed vault components are up to date");
    Ok(())
}

/// Decrypt a value encrypted with the managed transit key.
pub async fn decrypt(api: &dyn vault::Api, ciphertext: &str) -> vault::Result<Vec<u8>> {
    api.transit_decrypt(
        MANAGED_TRANSIT_ENGINE_PATH,
        MANAGED_TRANSIT_KEY_NAME,
        ciphertext,
    )
    .await
}

/// Encrypt a value with the managed transit key.
pub async fn encrypt(api: &dyn vault::Api, plaintext: &[u8]) -> vault::Result<String> {
    api.transit_encrypt(
        MANAGED_TRANSIT_ENGINE_PATH,
        MANAGED_TRANSIT_KEY_NAME,
        plaintext,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::mem::InMemoryVault;

    #[tokio::test]
    async fn bootstrap_creates_all_components() {
        let vault = InMemoryVault::new();
        ensure_managed_components(&vault).await.unwrap();

        assert!(vault.engine_exists(MANAGED_TRANSIT_ENGINE_PATH));
        assert!(vault.engine_exists(INTERNAL_KV_ENGINE_PATH));
        assert!(vault.has_transit_key(MANAGED_TRANSIT_ENGINE_PATH, MANAGED_TRANSIT_KEY_NAME));

        let policy = vault.policy(MANAGED_ENCRYPT_POLICY_NAME).unwrap();
        assert_eq!(
            policy.rules[0].path,
            "managed/transit/encrypt/encryption-key"
        );
    }

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let vault = InMemoryVault::new();
        ensure_managed_components(&vault).await.unwrap();
        ensure_managed_components(&vault).await.unwrap();
    }

    #[tokio::test]
    async fn managed_encrypt_round_trip() {
        let vault = InMemoryVault::new();
        ensure_managed_components(&vault).await.unwrap();

        let ciphertext = encrypt(&vault, b"ASDF ASDF").await.unwrap();
        let plaintext = decrypt(&vault, &ciphertext).await.unwrap();
        assert_eq!(plaintext, b"ASDF ASDF");
    }
}
