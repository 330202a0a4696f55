//! # Vault client contract
//!
//! The operator drives a remote Vault exclusively through the [`Api`]
//! trait. The production HTTP implementation is an external collaborator;
//! this crate ships [`mem::InMemoryVault`], a complete in-memory backend
//! with the same observable semantics, used by the test suite and the
//! `--vault-backend memory` development mode.

pub mod kubernetes_auth;
pub mod kv;
pub mod mem;
pub mod pki;
pub mod policy;
pub mod transit;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by the Vault backend.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A ciphertext could not be decrypted.
    #[error("decryption failed: {0}")]
    Decrypt(String),

    /// The backend rejected the request or is unavailable.
    #[error("vault api error: {0}")]
    Api(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The full set of Vault operations the reconcilers require.
///
/// Deletion operations are best-effort idempotent: deleting an object that
/// does not exist succeeds.
#[async_trait]
pub trait Api: Send + Sync {
    // --- engine mounts ---

    /// Mount a KV v2 engine at `path` if absent and apply its config.
    async fn update_kv_engine(&self, path: &str, config: &kv::KvEngineConfig) -> Result<()>;

    /// Mount a transit engine at `path` if absent.
    async fn update_transit_engine(&self, path: &str, plugin: &str) -> Result<()>;

    async fn has_engine(&self, path: &str) -> Result<bool>;

    async fn delete_engine(&self, path: &str) -> Result<()>;

    // --- kv secrets ---

    async fn read_kv_secret(&self, engine_path: &str, secret_path: &str) -> Result<kv::KvSecret>;

    async fn update_kv_secret(&self, engine_path: &str, secret: &kv::KvSecret) -> Result<()>;

    async fn delete_kv_secret(&self, engine_path: &str, secret_path: &str) -> Result<()>;

    // --- transit ---

    async fn transit_encrypt(
        &self,
        engine_path: &str,
        key_name: &str,
        plaintext: &[u8],
    ) -> Result<String>;

    async fn transit_decrypt(
        &self,
        engine_path: &str,
        key_name: &str,
        ciphertext: &str,
    ) -> Result<Vec<u8>>;

    async fn update_transit_key(
        &self,
        engine_path: &str,
        key_name: &str,
        key_type: transit::KeyType,
        config: &transit::KeyConfig,
    ) -> Result<()>;

    async fn delete_transit_key(&self, engine_path: &str, key_name: &str) -> Result<()>;

    // --- pki ---

    /// True once the mount exists and CA material has been generated or
    /// imported for it.
    async fn is_pki_engine_initialized(&self, path: &str) -> Result<bool>;

    async fn create_root_ca(&self, mode: pki::CaMode, ca: &pki::CaEntity) -> Result<pki::CaInfo>;

    /// Push updated tuning and subject without regenerating the CA.
    async fn update_root_ca(&self, ca: &pki::CaEntity) -> Result<()>;

    async fn create_intermediate_ca(
        &self,
        mode: pki::CaMode,
        issuer_path: &str,
        ca: &pki::CaEntity,
    ) -> Result<pki::CaInfo>;

    async fn update_intermediate_ca(&self, issuer_path: &str, ca: &pki::CaEntity) -> Result<()>;

    /// Read the CA certificate PEM of the mount at `path`.
    async fn read_ca_certificate_pem(&self, path: &str) -> Result<String>;

    async fn update_certificate_role(
        &self,
        issuer_path: &str,
        role_name: &str,
        settings: &pki::RoleSettings,
        subject: &pki::RoleSubject,
    ) -> Result<()>;

    async fn delete_certificate_role(&self, issuer_path: &str, role_name: &str) -> Result<()>;

    async fn issue_certificate(
        &self,
        issuer_path: &str,
        role_name: &str,
        options: &pki::IssueCertOptions,
    ) -> Result<pki::IssuedCertificate>;

    // --- policies ---

    async fn update_policy(&self, policy: &policy::Policy) -> Result<()>;

    async fn delete_policy(&self, name: &str) -> Result<()>;

    // --- kubernetes auth ---

    async fn update_kubernetes_auth_method(&self, path: &str) -> Result<()>;

    async fn update_kubernetes_auth_role(
        &self,
        mount_path: &str,
        role: &kubernetes_auth::AuthRole,
    ) -> Result<()>;

    async fn delete_kubernetes_auth_role(&self, mount_path: &str, role_name: &str) -> Result<()>;

    // --- connection metadata ---

    /// Address of the Vault, exposed to agents via client configs.
    fn address(&self) -> String;

    /// CA certificates agents need to trust the Vault endpoint.
    fn ca_certs(&self) -> Vec<String>;
}
