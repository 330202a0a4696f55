//! # Data fetch
//!
//! Resolves every entry of a sync secret's data map against Vault:
//! ciphertexts decrypt through the managed transit key, CA fields read
//! from the internal KV, certificate fields issue through the issuer's
//! `issue` endpoint (at most once per template and reconciliation), and KV
//! fields read from their engine.

use crate::constants::{
    CA_CERTIFICATE_CHAIN_FIELD, CA_CERTIFICATE_FIELD, CA_CERTIFICATE_FULL_CHAIN_FIELD,
    CA_PRIVATE_KEY_FIELD, INTERNAL_KV_ENGINE_PATH,
};
use crate::controller::certificate_authority::find_root_ca;
use crate::controller::{Ctx, Error};
use crate::crd::conditions::{self, is_condition_false};
use crate::crd::{
    CertificateFieldType, CertificateTemplate, VaultCertificateAuthority, VaultCertificateRole,
    VaultKVSecret, VaultKVSecretEngine, VaultSyncCertificateAuthoritySource,
    VaultSyncCertificateSource, VaultSyncKVSecretSource, VaultSyncSecret,
};
use crate::managed;
use crate::names;
use crate::vault::pki::{IssueCertOptions, IssuedCertificate};
use kube::api::Api;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Fetched data plus the smallest renewal deadline observed while issuing
/// certificates. `None` disables requeueing.
pub struct FetchedData {
    pub renew_interval: Option<Duration>,
    pub data: BTreeMap<String, Vec<u8>>,
}

impl std::fmt::Debug for FetchedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values are secret material; only shape is printed.
        f.debug_struct("FetchedData")
            .field("renew_interval", &self.renew_interval)
            .field("keys", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Keep the smallest renewal deadline seen so far.
pub fn shrink_renew_interval(
    current: Option<Duration>,
    candidate: Duration,
) -> Option<Duration> {
    match current {
        Some(current) if current <= candidate => Some(current),
        _ => Some(candidate),
    }
}

struct DataFetcher<'a> {
    ctx: &'a Ctx,
    sync: &'a VaultSyncSecret,
    namespace: String,
    /// Issued certificates by template index; every data key referencing
    /// the same template reuses one issuance.
    cert_cache: HashMap<usize, IssuedCertificate>,
    renew_interval: Option<Duration>,
}

pub async fn fetch_data(ctx: &Ctx, sync: &VaultSyncSecret) -> Result<FetchedData, Error> {
    let mut fetcher = DataFetcher {
        ctx,
        sync,
        namespace: sync.namespace().unwrap_or_default(),
        cert_cache: HashMap::new(),
        renew_interval: None,
    };

    let mut data = BTreeMap::new();
    for (key, source) in &sync.spec.data {
        let value = if !source.cipher_text.is_empty() {
            managed::decrypt(ctx.vault.as_ref(), source.cipher_text.as_str()).await?
        } else if let Some(authority) = &source.certificate_authority {
            fetcher.fetch_certificate_authority(authority).await?
        } else if let Some(certificate) = &source.certificate {
            fetcher.fetch_certificate(certificate).await?
        } else if let Some(kv_secret) = &source.kv_secret {
            fetcher.fetch_kv_secret(kv_secret).await?
        } else {
            return Err(Error::Config(format!("data key {key} has no source")));
        };
        data.insert(key.clone(), value);
    }

    Ok(FetchedData {
        renew_interval: fetcher.renew_interval,
        data,
    })
}

fn provisioned(conditions_list: &[crate::crd::Condition]) -> bool {
    !is_condition_false(conditions_list, conditions::TYPE_PROVISIONED)
}

impl DataFetcher<'_> {
    async fn fetch_certificate_authority(
        &mut self,
        source: &VaultSyncCertificateAuthoritySource,
    ) -> Result<Vec<u8>, Error> {
        let api: Api<VaultCertificateAuthority> =
            Api::namespaced(self.ctx.client.clone(), &self.namespace);
        let ca = api.get(&source.name).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultCertificateAuthority {} not found: {error}",
                source.name
            ))
        })?;

        let ca_conditions = ca
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(ca_conditions) {
            return Err(Error::Waiting(format!(
                "certificate authority {} is not provisioned yet",
                source.name
            )));
        }

        let (path, field) = match source.field {
            CertificateFieldType::Certificate => (
                names::ca_public_info_path(&self.namespace, &source.name),
                CA_CERTIFICATE_FIELD,
            ),
            CertificateFieldType::CertChain => (
                names::ca_public_info_path(&self.namespace, &source.name),
                CA_CERTIFICATE_CHAIN_FIELD,
            ),
            CertificateFieldType::FullCertChain => (
                names::ca_public_info_path(&self.namespace, &source.name),
                CA_CERTIFICATE_FULL_CHAIN_FIELD,
            ),
            CertificateFieldType::PrivateKey => (
                names::ca_private_info_path(&self.namespace, &source.name),
                CA_PRIVATE_KEY_FIELD,
            ),
        };

        let secret = self
            .ctx
            .vault
            .read_kv_secret(INTERNAL_KV_ENGINE_PATH, &path)
            .await?;
        let value = secret.fields.get(field).cloned().unwrap_or_default();
        Ok(value.into_bytes())
    }

    async fn fetch_certificate(
        &mut self,
        source: &VaultSyncCertificateSource,
    ) -> Result<Vec<u8>, Error> {
        let (index, template) = self
            .sync
            .find_certificate_template(&source.name)
            .map(|(index, template)| (index, template.clone()))
            .ok_or_else(|| {
                Error::Config(format!("certificate template {} not found", source.name))
            })?;

        let role_api: Api<VaultCertificateRole> =
            Api::namespaced(self.ctx.client.clone(), &self.namespace);
        let role = role_api
            .get(&template.certificate_role)
            .await
            .map_err(|error| {
                Error::Config(format!(
                    "referenced VaultCertificateRole {} not found: {error}",
                    template.certificate_role
                ))
            })?;
        let role_conditions = role
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(role_conditions) {
            return Err(Error::Waiting(format!(
                "certificate role {} is not provisioned yet",
                template.certificate_role
            )));
        }

        let ca_api: Api<VaultCertificateAuthority> =
            Api::namespaced(self.ctx.client.clone(), &self.namespace);
        let issuer = ca_api.get(&role.spec.issuer).await.map_err(|error| {
            Error::Config(format!(
                "issuer {} of certificate role {} not found: {error}",
                role.spec.issuer, template.certificate_role
            ))
        })?;
        let issuer_conditions = issuer
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(issuer_conditions) {
            return Err(Error::Waiting(format!(
                "issuer {} is not provisioned yet",
                role.spec.issuer
            )));
        }

        let root_ca = find_root_ca(self.ctx, &issuer).await?;
        let root_conditions = root_ca
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(root_conditions) {
            return Err(Error::Waiting(format!(
                "root authority {} is not provisioned yet",
                root_ca.name_any()
            )));
        }

        let root_pem = self
            .ctx
            .vault
            .read_ca_certificate_pem(&root_ca.mount_path())
            .await?;

        let issued = self
            .issued_certificate(index, &template, &issuer, &role)
            .await?;

        // Half the certificate lifetime drives the reconciliation-wide
        // renewal deadline; the smallest one wins.
        if let Some(ttl) = role.spec.settings.ttl.as_duration() {
            self.renew_interval = shrink_renew_interval(self.renew_interval, ttl / 2);
        }

        let chain = issued.ca_chain.join("\n");
        let value = match source.field {
            CertificateFieldType::Certificate => issued.certificate.clone(),
            CertificateFieldType::PrivateKey => issued.private_key.clone(),
            CertificateFieldType::CertChain => chain.trim().to_string(),
            CertificateFieldType::FullCertChain => {
                format!("{}\n{root_pem}", chain.trim()).trim().to_string()
            }
        };

        Ok(value.into_bytes())
    }

    async fn issued_certificate(
        &mut self,
        index: usize,
        template: &CertificateTemplate,
        issuer: &VaultCertificateAuthority,
        role: &VaultCertificateRole,
    ) -> Result<IssuedCertificate, Error> {
        if let Some(existing) = self.cert_cache.get(&index) {
            return Ok(existing.clone());
        }

        let issued = self
            .ctx
            .vault
            .issue_certificate(
                &issuer.mount_path(),
                &role.role_name(),
                &IssueCertOptions {
                    common_name: template.common_name.clone(),
                    dns_sans: template.dns_sans.clone(),
                    other_sans: template.other_sans.clone(),
                    ip_sans: template.ip_sans.clone(),
                    uri_sans: template.uri_sans.clone(),
                    ttl: template.ttl.as_duration(),
                    exclude_cn_from_sans: template.exclude_cn_from_sans,
                },
            )
            .await?;

        self.cert_cache.insert(index, issued.clone());
        Ok(issued)
    }

    async fn fetch_kv_secret(
        &mut self,
        source: &VaultSyncKVSecretSource,
    ) -> Result<Vec<u8>, Error> {
        let secret_api: Api<VaultKVSecret> =
            Api::namespaced(self.ctx.client.clone(), &self.namespace);
        let secret = secret_api.get(&source.name).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultKVSecret {} not found: {error}",
                source.name
            ))
        })?;
        let secret_conditions = secret
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(secret_conditions) {
            return Err(Error::Waiting(format!(
                "kv secret {} is not provisioned yet",
                source.name
            )));
        }

        let engine_api: Api<VaultKVSecretEngine> =
            Api::namespaced(self.ctx.client.clone(), &self.namespace);
        let engine = engine_api.get(&secret.spec.engine).await.map_err(|error| {
            Error::Config(format!(
                "referenced VaultKVSecretEngine {} not found: {error}",
                secret.spec.engine
            ))
        })?;
        let engine_conditions = engine
            .status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default();
        if !provisioned(engine_conditions) {
            return Err(Error::Waiting(format!(
                "kv engine {} is not provisioned yet",
                secret.spec.engine
            )));
        }

        let stored = self
            .ctx
            .vault
            .read_kv_secret(&engine.mount_path(), &secret.secret_path())
            .await?;

        Ok(stored
            .fields
            .get(&source.field)
            .cloned()
            .unwrap_or_default()
            .into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renew_interval_keeps_the_smallest_deadline() {
        let interval = shrink_renew_interval(None, Duration::from_secs(300));
        assert_eq!(interval, Some(Duration::from_secs(300)));

        let interval = shrink_renew_interval(interval, Duration::from_secs(600));
        assert_eq!(interval, Some(Duration::from_secs(300)));

        let interval = shrink_renew_interval(interval, Duration::from_secs(60));
        assert_eq!(interval, Some(Duration::from_secs(60)));
    }

    #[test]
    fn ten_minute_ttl_renews_within_five_minutes() {
        let ttl = crate::crd::duration::parse_duration("10m").unwrap();
        let interval = shrink_renew_interval(None, ttl / 2).unwrap();
        assert!(interval <= Duration::from_secs(300));
    }
}
