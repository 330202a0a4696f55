//! # In-memory Vault backend
//!
//! A complete [`Api`](super::Api) implementation backed by process memory.
//! Used by the test suite and by `--vault-backend memory` during local
//! development. Transit ciphertexts use the real wire format
//! (`vault:v1:<base64>`); PKI material is deterministic placeholder PEM so
//! chain composition can be asserted in tests.

use super::kubernetes_auth::AuthRole;
use super::kv::{KvEngineConfig, KvSecret};
use super::pki::{CaEntity, CaInfo, CaMode, IssueCertOptions, IssuedCertificate, RoleSettings, RoleSubject};
use super::policy::Policy;
use super::transit::{KeyConfig, KeyType};
use super::{Api, Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
enum EngineKind {
    Kv(KvEngineConfig),
    Transit { plugin: String },
    Pki,
}

#[derive(Debug, Clone, Default)]
struct PkiState {
    initialized: bool,
    certificate: String,
    /// Chain of this CA in leaf-to-root order, excluding the root itself
    /// for intermediates.
    chain: Vec<String>,
    private_key: String,
    roles: HashMap<String, (RoleSettings, RoleSubject)>,
}

#[derive(Debug, Default)]
struct State {
    engines: HashMap<String, EngineKind>,
    kv_secrets: HashMap<String, BTreeMap<String, String>>,
    transit_keys: HashMap<String, (KeyType, KeyConfig)>,
    pki: HashMap<String, PkiState>,
    policies: HashMap<String, (Policy, String)>,
    auth_methods: Vec<String>,
    auth_roles: HashMap<String, AuthRole>,
    serial_counter: u64,
}

/// In-memory Vault. Cloneable handles share state via `Arc` externally; the
/// struct itself owns its state behind a mutex and is safe for concurrent
/// use by all controllers.
#[derive(Debug, Default)]
pub struct InMemoryVault {
    state: Mutex<State>,
}

fn kv_key(engine: &str, path: &str) -> String {
    format!("{engine}\u{0}{path}")
}

fn next_serial(state: &mut State) -> String {
    state.serial_counter += 1;
    let bytes = state.serial_counter.to_be_bytes();
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn pem_block(kind: &str, payload: &str) -> String {
    let body = BASE64.encode(payload.as_bytes());
    format!("-----BEGIN {kind}-----\n{body}\n-----END {kind}-----")
}

fn certificate_pem(path: &str, common_name: &str, serial: &str) -> String {
    pem_block("CERTIFICATE", &format!("cert:{path}:{common_name}:{serial}"))
}

fn private_key_pem(path: &str, serial: &str) -> String {
    pem_block("PRIVATE KEY", &format!("key:{path}:{serial}"))
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    // Inspection helpers for tests and debugging.

    pub fn engine_exists(&self, path: &str) -> bool {
        self.state.lock().unwrap().engines.contains_key(path)
    }

    pub fn kv_engine_config(&self, path: &str) -> Option<KvEngineConfig> {
        match self.state.lock().unwrap().engines.get(path) {
            Some(EngineKind::Kv(config)) => Some(config.clone()),
            _ => None,
        }
    }

    pub fn transit_engine_plugin(&self, path: &str) -> Option<String> {
        match self.state.lock().unwrap().engines.get(path) {
            Some(EngineKind::Transit { plugin }) => Some(plugin.clone()),
            _ => None,
        }
    }

    pub fn kv_secret_fields(&self, engine: &str, path: &str) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .unwrap()
            .kv_secrets
            .get(&kv_key(engine, path))
            .cloned()
    }

    pub fn policy(&self, name: &str) -> Option<Policy> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(name)
            .map(|(p, _)| p.clone())
    }

    pub fn policy_hcl(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .policies
            .get(name)
            .map(|(_, hcl)| hcl.clone())
    }

    pub fn auth_role(&self, mount: &str, name: &str) -> Option<AuthRole> {
        self.state
            .lock()
            .unwrap()
            .auth_roles
            .get(&kv_key(mount, name))
            .cloned()
    }

    pub fn has_transit_key(&self, engine: &str, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .transit_keys
            .contains_key(&kv_key(engine, name))
    }

    pub fn transit_key_type(&self, engine: &str, name: &str) -> Option<KeyType> {
        self.state
            .lock()
            .unwrap()
            .transit_keys
            .get(&kv_key(engine, name))
            .map(|(key_type, _)| *key_type)
    }

    pub fn pki_private_key(&self, mount: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .pki
            .get(mount)
            .map(|pki| pki.private_key.clone())
    }

    pub fn pki_role_exists(&self, mount: &str, role: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .pki
            .get(mount)
            .is_some_and(|pki| pki.roles.contains_key(role))
    }

    fn generate_ca(
        state: &mut State,
        path: &str,
        ca: &CaEntity,
        chain: Vec<String>,
        issuing_certificate: String,
    ) -> CaInfo {
        let serial = next_serial(state);
        let (certificate, private_key) = match &ca.imported_cert {
            Some(imported) => (imported.certificate.clone(), imported.private_key.clone()),
            None => (
                certificate_pem(path, &ca.subject.common_name, &serial),
                private_key_pem(path, &serial),
            ),
        };

        let pki = PkiState {
            initialized: true,
            certificate: certificate.clone(),
            chain: if chain.is_empty() {
                vec![certificate.clone()]
            } else {
                chain
            },
            private_key: private_key.clone(),
            roles: HashMap::new(),
        };
        let certificate_chain = pki.chain.join("\n");
        state.pki.insert(path.to_string(), pki);
        state.engines.insert(path.to_string(), EngineKind::Pki);

        CaInfo {
            certificate,
            certificate_chain,
            private_key,
            private_key_type: ca.settings.key_type.as_str().to_string(),
            issuing_certificate_authority: issuing_certificate,
            serial_number: serial,
        }
    }
}

#[async_trait]
impl Api for InMemoryVault {
    async fn update_kv_engine(&self, path: &str, config: &KvEngineConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .engines
            .insert(path.to_string(), EngineKind::Kv(config.clone()));
        Ok(())
    }

    async fn update_transit_engine(&self, path: &str, plugin: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.engines.insert(
            path.to_string(),
            EngineKind::Transit {
                plugin: plugin.to_string(),
            },
        );
        Ok(())
    }

    async fn has_engine(&self, path: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().engines.contains_key(path))
    }

    async fn delete_engine(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.engines.remove(path);
        state.pki.remove(path);
        let prefix = kv_key(path, "");
        state.kv_secrets.retain(|key, _| !key.starts_with(&prefix));
        state
            .transit_keys
            .retain(|key, _| !key.starts_with(&prefix));
        Ok(())
    }

    async fn read_kv_secret(&self, engine_path: &str, secret_path: &str) -> Result<KvSecret> {
        let state = self.state.lock().unwrap();
        let fields = state
            .kv_secrets
            .get(&kv_key(engine_path, secret_path))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("kv secret {engine_path}/{secret_path}")))?;
        Ok(KvSecret::new(secret_path, fields))
    }

    async fn update_kv_secret(&self, engine_path: &str, secret: &KvSecret) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.engines.contains_key(engine_path) {
            return Err(Error::NotFound(format!("engine {engine_path}")));
        }
        state
            .kv_secrets
            .insert(kv_key(engine_path, &secret.path), secret.fields.clone());
        Ok(())
    }

    async fn delete_kv_secret(&self, engine_path: &str, secret_path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.kv_secrets.remove(&kv_key(engine_path, secret_path));
        Ok(())
    }

    async fn transit_encrypt(
        &self,
        engine_path: &str,
        key_name: &str,
        plaintext: &[u8],
    ) -> Result<String> {
        let state = self.state.lock().unwrap();
        if !state.transit_keys.contains_key(&kv_key(engine_path, key_name)) {
            return Err(Error::NotFound(format!(
                "transit key {engine_path}/{key_name}"
            )));
        }
        Ok(format!("vault:v1:{}", BASE64.encode(plaintext)))
    }

    async fn transit_decrypt(
        &self,
        engine_path: &str,
        key_name: &str,
        ciphertext: &str,
    ) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap();
        if !state.transit_keys.contains_key(&kv_key(engine_path, key_name)) {
            return Err(Error::NotFound(format!(
                "transit key {engine_path}/{key_name}"
            )));
        }
        let payload = ciphertext
            .strip_prefix("vault:v1:")
            .ok_or_else(|| Error::Decrypt("invalid ciphertext format".to_string()))?;
        BASE64
            .decode(payload)
            .map_err(|e| Error::Decrypt(format!("invalid ciphertext payload: {e}")))
    }

    async fn update_transit_key(
        &self,
        engine_path: &str,
        key_name: &str,
        key_type: KeyType,
        config: &KeyConfig,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.engines.contains_key(engine_path) {
            return Err(Error::NotFound(format!("engine {engine_path}")));
        }
        state
            .transit_keys
            .insert(kv_key(engine_path, key_name), (key_type, config.clone()));
        Ok(())
    }

    async fn delete_transit_key(&self, engine_path: &str, key_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.transit_keys.remove(&kv_key(engine_path, key_name));
        Ok(())
    }

    async fn is_pki_engine_initialized(&self, path: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.pki.get(path).is_some_and(|pki| pki.initialized))
    }

    async fn create_root_ca(&self, _mode: CaMode, ca: &CaEntity) -> Result<CaInfo> {
        let mut state = self.state.lock().unwrap();
        let mut info = Self::generate_ca(&mut state, &ca.path, ca, Vec::new(), String::new());
        // A root is its own issuer and carries no chain beyond itself.
        info.issuing_certificate_authority = info.certificate.clone();
        info.certificate_chain = String::new();
        if let Some(pki) = state.pki.get_mut(&ca.path) {
            pki.chain = vec![info.certificate.clone()];
        }
        Ok(info)
    }

    async fn update_root_ca(&self, ca: &CaEntity) -> Result<()> {
        let state = self.state.lock().unwrap();
        if !state.pki.contains_key(&ca.path) {
            return Err(Error::NotFound(format!("pki engine {}", ca.path)));
        }
        Ok(())
    }

    async fn create_intermediate_ca(
        &self,
        _mode: CaMode,
        issuer_path: &str,
        ca: &CaEntity,
    ) -> Result<CaInfo> {
        let mut state = self.state.lock().unwrap();
        let issuer = state
            .pki
            .get(issuer_path)
            .ok_or_else(|| Error::NotFound(format!("pki engine {issuer_path}")))?
            .clone();
        if !issuer.initialized {
            return Err(Error::Api(format!(
                "issuer {issuer_path} has no CA material"
            )));
        }

        let info = Self::generate_ca(&mut state, &ca.path, ca, Vec::new(), issuer.certificate);
        Ok(info)
    }

    async fn update_intermediate_ca(&self, issuer_path: &str, ca: &CaEntity) -> Result<()> {
        let state = self.state.lock().unwrap();
        if !state.pki.contains_key(issuer_path) {
            return Err(Error::NotFound(format!("pki engine {issuer_path}")));
        }
        if !state.pki.contains_key(&ca.path) {
            return Err(Error::NotFound(format!("pki engine {}", ca.path)));
        }
        Ok(())
    }

    async fn read_ca_certificate_pem(&self, path: &str) -> Result<String> {
        let state = self.state.lock().unwrap();
        let pki = state
            .pki
            .get(path)
            .ok_or_else(|| Error::NotFound(format!("pki engine {path}")))?;
        Ok(pki.certificate.clone())
    }

    async fn update_certificate_role(
        &self,
        issuer_path: &str,
        role_name: &str,
        settings: &RoleSettings,
        subject: &RoleSubject,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let pki = state
            .pki
            .get_mut(issuer_path)
            .ok_or_else(|| Error::NotFound(format!("pki engine {issuer_path}")))?;
        pki.roles
            .insert(role_name.to_string(), (settings.clone(), subject.clone()));
        Ok(())
    }

    async fn delete_certificate_role(&self, issuer_path: &str, role_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(pki) = state.pki.get_mut(issuer_path) {
            pki.roles.remove(role_name);
        }
        Ok(())
    }

    async fn issue_certificate(
        &self,
        issuer_path: &str,
        role_name: &str,
        options: &IssueCertOptions,
    ) -> Result<IssuedCertificate> {
        let mut state = self.state.lock().unwrap();
        let issuer = state
            .pki
            .get(issuer_path)
            .ok_or_else(|| Error::NotFound(format!("pki engine {issuer_path}")))?
            .clone();
        if !issuer.roles.contains_key(role_name) {
            return Err(Error::NotFound(format!(
                "role {role_name} on {issuer_path}"
            )));
        }

        let serial = next_serial(&mut state);
        Ok(IssuedCertificate {
            certificate: certificate_pem(issuer_path, &options.common_name, &serial),
            private_key: private_key_pem(issuer_path, &serial),
            ca_chain: issuer.chain,
            serial_number: serial,
        })
    }

    async fn update_policy(&self, policy: &Policy) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let hcl = policy.to_hcl();
        state
            .policies
            .insert(policy.name.clone(), (policy.clone(), hcl));
        Ok(())
    }

    async fn delete_policy(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.policies.remove(name);
        Ok(())
    }

    async fn update_kubernetes_auth_method(&self, path: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.auth_methods.iter().any(|p| p == path) {
            state.auth_methods.push(path.to_string());
        }
        Ok(())
    }

    async fn update_kubernetes_auth_role(&self, mount_path: &str, role: &AuthRole) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state
            .auth_roles
            .insert(kv_key(mount_path, &role.name), role.clone());
        Ok(())
    }

    async fn delete_kubernetes_auth_role(&self, mount_path: &str, role_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.auth_roles.remove(&kv_key(mount_path, role_name));
        Ok(())
    }

    fn address(&self) -> String {
        "memory://vault".to_string()
    }

    fn ca_certs(&self) -> Vec<String> {
        Vec::new()
    }
}
