//! # VaultCertificateAuthority controller
//!
//! Provisions PKI mounts and their CA material. Root CAs self-sign;
//! intermediates are signed by their issuer's mount. Derived material is
//! persisted into the internal KV engine and gated by per-CA read
//! policies. A CA that was generated but whose metadata could not be
//! persisted is rolled back by deleting the freshly created mount.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::constants::{
    CA_CERTIFICATE_CHAIN_FIELD, CA_CERTIFICATE_FIELD, CA_CERTIFICATE_FULL_CHAIN_FIELD,
    CA_ISSUER_FIELD, CA_PRIVATE_KEY_FIELD, CA_PRIVATE_KEY_TYPE_FIELD, CA_SERIAL_NUMBER_FIELD,
    INTERNAL_KV_ENGINE_PATH,
};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ERROR_VAULT,
    REASON_PROVISIONED, REASON_TERMINATING, REASON_WAITING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::VaultCertificateAuthority;
use crate::managed;
use crate::names;
use crate::vault::kv::KvSecret;
use crate::vault::pki::{CaEntity, CaInfo, ImportedCert};
use crate::vault::policy::{Policy, Rule};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Walk the issuer chain up to the root CA.
///
/// Chain walking is bounded to guard against issuer cycles, which the
/// admission layer does not prevent.
pub async fn find_root_ca(
    ctx: &Ctx,
    ca: &VaultCertificateAuthority,
) -> Result<VaultCertificateAuthority, Error> {
    const MAX_CHAIN_DEPTH: usize = 16;

    let namespace = ca.namespace().unwrap_or_default();
    let api: Api<VaultCertificateAuthority> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut current = ca.clone();
    for _ in 0..MAX_CHAIN_DEPTH {
        if current.spec.issuer.is_empty() {
            return Ok(current);
        }
        current = api
            .get(&current.spec.issuer)
            .await
            .map_err(|error| Error::Config(format!("failed to find root ca: {error}")))?;
    }

    Err(Error::Config(format!(
        "issuer chain of {} exceeds {MAX_CHAIN_DEPTH} links",
        ca.name_any()
    )))
}

/// The two per-CA policies granting read on the internal KV paths.
pub fn ca_policies(namespace: &str, name: &str) -> (Policy, Policy) {
    let public = Policy::new(
        names::ca_public_policy_name(namespace, name),
        vec![Rule::read(format!(
            "{INTERNAL_KV_ENGINE_PATH}/data/{}",
            names::ca_public_info_path(namespace, name)
        ))],
    );
    let private = Policy::new(
        names::ca_private_policy_name(namespace, name),
        vec![Rule::read(format!(
            "{INTERNAL_KV_ENGINE_PATH}/data/{}",
            names::ca_private_info_path(namespace, name)
        ))],
    );
    (public, private)
}

/// Compose the chain fields persisted for a CA.
///
/// For a root the full chain is just its own certificate; for an
/// intermediate it is the chain followed by the root certificate.
pub fn chain_fields(info: &CaInfo, root_pem: Option<&str>) -> (String, String) {
    match root_pem {
        Some(root_pem) => {
            let chain = info.certificate_chain.clone();
            let full = format!("{}\n{root_pem}", chain.trim_end());
            (chain, full)
        }
        None => (String::new(), info.certificate.clone()),
    }
}

pub async fn reconcile(
    obj: Arc<VaultCertificateAuthority>,
    ctx: Arc<Ctx>,
) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultCertificateAuthority> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut ca = (*obj).clone();
    let previous = ca.clone();

    let status = ca.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if ca.metadata.deletion_timestamp.is_some() {
        finalize_ca(&ctx, &mut ca).await
    } else {
        update_ca(&ctx, &mut ca).await
    };

    persist_changes(&api, &previous, &ca).await?;

    result
}

async fn to_ca_entity(ctx: &Ctx, ca: &VaultCertificateAuthority) -> Result<CaEntity, Error> {
    let imported_cert = match &ca.spec.import {
        Some(import) => {
            let certificate = managed::decrypt(ctx.vault.as_ref(), import.certificate.as_str())
                .await
                .map_err(Error::Vault)?;
            let private_key = managed::decrypt(ctx.vault.as_ref(), import.private_key.as_str())
                .await
                .map_err(Error::Vault)?;
            Some(ImportedCert {
                certificate: String::from_utf8_lossy(&certificate).into_owned(),
                private_key: String::from_utf8_lossy(&private_key).into_owned(),
            })
        }
        None => None,
    };

    Ok(CaEntity {
        path: ca.mount_path(),
        plugin: ca.spec.plugin.clone(),
        settings: ca.ca_settings(),
        subject: ca.ca_subject(),
        tune: ca.tune_config(),
        imported_cert,
    })
}

async fn update_ca(ctx: &Ctx, ca: &mut VaultCertificateAuthority) -> Result<Action, Error> {
    add_finalizer(ca);

    // An unresolvable issuer chain keeps the CA pending; dependents report
    // their own config errors.
    let root_ca = match find_root_ca(ctx, ca).await {
        Ok(root_ca) => root_ca,
        Err(error) => {
            let status = ca.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_WAITING,
                &format!("Failed to find root ca: {error}"),
            );
            return Err(error);
        }
    };

    let info = match apply_ca(ctx, ca).await {
        Ok(info) => info,
        Err(error) => {
            let status = ca.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_VAULT,
                &format!("Could not update CA to desired config: {error}"),
            );
            return Err(error);
        }
    };

    if let Err(error) = persist_ca_data(ctx, ca, &root_ca, info.as_ref()).await {
        let status = ca.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to persist ca data: {error}"),
        );
        return Err(error);
    }

    let namespace = ca.namespace().unwrap_or_default();
    let (public_policy, private_policy) = ca_policies(&namespace, &ca.name_any());
    for policy in [&public_policy, &private_policy] {
        if let Err(error) = ctx.vault.update_policy(policy).await {
            let status = ca.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_VAULT,
                &format!("Failed to update policies: {error}"),
            );
            return Err(error.into());
        }
    }

    let status = ca.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "CertificateAuthority has been provisioned",
    );

    Ok(Action::await_change())
}

/// Create the CA when the mount is uninitialized; otherwise push updated
/// tuning and subject without regenerating. Returns derived material only
/// on fresh creation.
async fn apply_ca(ctx: &Ctx, ca: &VaultCertificateAuthority) -> Result<Option<CaInfo>, Error> {
    let entity = to_ca_entity(ctx, ca).await?;
    let initialized = ctx.vault.is_pki_engine_initialized(&entity.path).await?;

    if ca.is_root() {
        if initialized {
            ctx.vault.update_root_ca(&entity).await?;
            return Ok(None);
        }
        let info = ctx.vault.create_root_ca(ca.ca_mode(), &entity).await?;
        return Ok(Some(info));
    }

    let namespace = ca.namespace().unwrap_or_default();
    let issuer_path = names::pki_mount_path(&namespace, &ca.spec.issuer);

    if initialized {
        ctx.vault.update_intermediate_ca(&issuer_path, &entity).await?;
        return Ok(None);
    }

    let info = ctx
        .vault
        .create_intermediate_ca(ca.ca_mode(), &issuer_path, &entity)
        .await?;
    Ok(Some(info))
}

async fn persist_ca_data(
    ctx: &Ctx,
    ca: &VaultCertificateAuthority,
    root_ca: &VaultCertificateAuthority,
    info: Option<&CaInfo>,
) -> Result<(), Error> {
    let Some(info) = info else {
        // Nothing was regenerated; the persisted material is still valid.
        return Ok(());
    };

    if let Err(error) = try_persist_ca_data(ctx, ca, root_ca, info).await {
        warn!(
            ca = %ca.name_any(),
            "failed to persist CA data, rolling back the freshly created mount"
        );
        ctx.vault.delete_engine(&ca.mount_path()).await?;
        return Err(error);
    }

    Ok(())
}

async fn try_persist_ca_data(
    ctx: &Ctx,
    ca: &VaultCertificateAuthority,
    root_ca: &VaultCertificateAuthority,
    info: &CaInfo,
) -> Result<(), Error> {
    ctx.vault
        .update_kv_engine(
            INTERNAL_KV_ENGINE_PATH,
            &managed::internal_kv_engine_config(),
        )
        .await?;

    let root_pem = if ca.name_any() == root_ca.name_any() {
        None
    } else {
        Some(
            ctx.vault
                .read_ca_certificate_pem(&root_ca.mount_path())
                .await?,
        )
    };
    let (chain, full_chain) = chain_fields(info, root_pem.as_deref());

    let namespace = ca.namespace().unwrap_or_default();
    let name = ca.name_any();

    let mut public_fields = BTreeMap::new();
    public_fields.insert(
        CA_ISSUER_FIELD.to_string(),
        info.issuing_certificate_authority.clone(),
    );
    public_fields.insert(CA_CERTIFICATE_FIELD.to_string(), info.certificate.clone());
    public_fields.insert(CA_CERTIFICATE_CHAIN_FIELD.to_string(), chain);
    public_fields.insert(CA_CERTIFICATE_FULL_CHAIN_FIELD.to_string(), full_chain);
    public_fields.insert(CA_SERIAL_NUMBER_FIELD.to_string(), info.serial_number.clone());

    ctx.vault
        .update_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &KvSecret::new(names::ca_public_info_path(&namespace, &name), public_fields),
        )
        .await?;

    let mut private_fields = BTreeMap::new();
    private_fields.insert(CA_PRIVATE_KEY_FIELD.to_string(), info.private_key.clone());
    private_fields.insert(
        CA_PRIVATE_KEY_TYPE_FIELD.to_string(),
        info.private_key_type.clone(),
    );

    ctx.vault
        .update_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &KvSecret::new(
                names::ca_private_info_path(&namespace, &name),
                private_fields,
            ),
        )
        .await?;

    Ok(())
}

async fn finalize_ca(ctx: &Ctx, ca: &mut VaultCertificateAuthority) -> Result<Action, Error> {
    let status = ca.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "VaultCertificateAuthority is in the process of being deleted from Vault",
    );

    if !has_finalizer(ca) {
        return Ok(Action::await_change());
    }

    let namespace = ca.namespace().unwrap_or_default();
    let name = ca.name_any();

    if let Err(error) = teardown_ca(ctx, &namespace, &name).await {
        let status = ca.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to delete VaultCertificateAuthority from Vault: {error}"),
        );
        return Err(error);
    }

    remove_finalizer(ca);

    let status = ca.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "VaultCertificateAuthority was successfully deleted from Vault",
    );

    Ok(Action::await_change())
}

/// Delete the PKI mount, both internal KV secrets and both policies.
async fn teardown_ca(ctx: &Ctx, namespace: &str, name: &str) -> Result<(), Error> {
    ctx.vault
        .delete_engine(&names::pki_mount_path(namespace, name))
        .await?;
    ctx.vault
        .delete_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &names::ca_public_info_path(namespace, name),
        )
        .await?;
    ctx.vault
        .delete_kv_secret(
            INTERNAL_KV_ENGINE_PATH,
            &names::ca_private_info_path(namespace, name),
        )
        .await?;
    ctx.vault
        .delete_policy(&names::ca_public_policy_name(namespace, name))
        .await?;
    ctx.vault
        .delete_policy(&names::ca_private_policy_name(namespace, name))
        .await?;
    Ok(())
}

/// A delete event whose CA object is already gone still checks Vault for a
/// stale PKI mount and tears it down, the same recovery path the KV and
/// transit engines have.
pub async fn cleanup_stale_ca(ctx: &Ctx, namespace: &str, name: &str) -> Result<(), Error> {
    let path = names::pki_mount_path(namespace, name);

    if !ctx.vault.has_engine(&path).await? {
        return Ok(());
    }

    warn!(%path, "deleting stale pki mount left behind in vault");
    teardown_ca(ctx, namespace, name).await
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultCertificateAuthority>::all(ctx.client.clone());

    let cleanup_ctx = ctx.clone();
    let cleanup_api = api.clone();
    tokio::spawn(async move {
        let stream = watcher(cleanup_api, watcher::Config::default());
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let Ok(watcher::Event::Delete(ca)) = event {
                let namespace = ca.namespace().unwrap_or_default();
                let name = ca.name_any();
                if let Err(error) = cleanup_stale_ca(&cleanup_ctx, &namespace, &name).await {
                    warn!(%error, %namespace, %name, "stale pki mount cleanup failed");
                }
            }
        }
    });

    let controller = Controller::new(api.clone(), watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1));
    let store = controller.store();

    // A CA change re-enqueues every CA in the namespace that has it as
    // issuer so intermediate chains rebuild.
    controller
        .watches(api, watcher::Config::default(), move |changed| {
            let namespace = changed.namespace().unwrap_or_default();
            let changed_name = changed.name_any();
            store
                .state()
                .into_iter()
                .filter(|ca| {
                    ca.namespace().as_deref() == Some(namespace.as_str())
                        && ca.spec.issuer == changed_name
                })
                .map(|ca| ObjectRef::from_obj(&*ca))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { super::log_reconcile_result(result) })
        .await;

    info!("certificate authority controller stopped");
}
