//! # VaultSyncSecret controller
//!
//! Materializes Vault-held values into a native cluster Secret the sync
//! owns through the `heist.youniqx.com/sync-from` annotation. A
//! pre-existing Secret without that annotation is never overwritten.

pub mod data;

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, requeue, Ctx,
    Error,
};
use crate::constants::{DEPRECATED_SYNC_FROM_ANNOTATION, SYNC_FROM_ANNOTATION};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ERROR_CONFIG,
    REASON_ERROR_KUBERNETES, REASON_PROVISIONED, REASON_TERMINATING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::VaultSyncSecret;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{Api, PostParams};
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Where the target Secret may be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetNamespace {
    Allowed(String),
    Denied(String),
}

/// Decide the effective target namespace: the sync's own namespace when the
/// target namespace is empty or equal to it, otherwise only namespaces on
/// the operator allow-list.
pub fn resolve_target_namespace(
    sync_namespace: &str,
    target_namespace: &str,
    allow_list: &[String],
) -> TargetNamespace {
    if target_namespace.is_empty() || target_namespace == sync_namespace {
        return TargetNamespace::Allowed(sync_namespace.to_string());
    }
    if allow_list.iter().any(|allowed| allowed == target_namespace) {
        return TargetNamespace::Allowed(target_namespace.to_string());
    }
    TargetNamespace::Denied(target_namespace.to_string())
}

/// Read the ownership annotation, honoring the deprecated alias.
pub fn sync_from_annotation(secret: &Secret) -> Option<String> {
    let annotations = secret.metadata.annotations.as_ref()?;
    annotations
        .get(DEPRECATED_SYNC_FROM_ANNOTATION)
        .or_else(|| annotations.get(SYNC_FROM_ANNOTATION))
        .cloned()
}

pub async fn reconcile(obj: Arc<VaultSyncSecret>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultSyncSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut sync = (*obj).clone();
    let previous = sync.clone();

    let status = sync.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if sync.metadata.deletion_timestamp.is_some() {
        finalize_sync(&ctx, &mut sync).await
    } else {
        update_sync(&ctx, &mut sync).await
    };

    persist_changes(&api, &previous, &sync).await?;

    result
}

async fn update_sync(ctx: &Ctx, sync: &mut VaultSyncSecret) -> Result<Action, Error> {
    add_finalizer(sync);

    let sync_namespace = sync.namespace().unwrap_or_default();

    let secret_namespace = match resolve_target_namespace(
        &sync_namespace,
        &sync.spec.target.namespace,
        &ctx.sync_target_namespace_allow_list,
    ) {
        TargetNamespace::Allowed(namespace) => namespace,
        TargetNamespace::Denied(namespace) => {
            let status = sync.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_CONFIG,
                &format!("Namespace {namespace} of secret is not allowed"),
            );
            return Ok(requeue());
        }
    };

    if sync.has_moved_target() {
        delete_outdated_secret(ctx, sync).await?;
    }

    {
        let spec = sync.spec.clone();
        let status = sync.status.get_or_insert_with(Default::default);
        status.applied_spec = Some(spec);
    }

    let fetched = match data::fetch_data(ctx, sync).await {
        Ok(fetched) => fetched,
        Err(error) => {
            let status = sync.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                error.reason(),
                &format!("Failed to fetch requested values: {error}"),
            );
            return Err(error);
        }
    };

    if let Err(error) = upsert_target_secret(ctx, sync, &secret_namespace, fetched.data).await {
        let status = sync.status.get_or_insert_with(Default::default);
        let (reason, message) = match &error {
            Error::Config(message) => (REASON_ERROR_CONFIG, message.clone()),
            other => (
                REASON_ERROR_KUBERNETES,
                format!("Failed to create target secret: {other}"),
            ),
        };
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            reason,
            &message,
        );
        return Err(error);
    }

    let status = sync.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "Secret has been synced",
    );

    // Certificate-bearing syncs re-reconcile before the shortest-lived
    // certificate reaches half its lifetime.
    match fetched.renew_interval {
        Some(interval) => Ok(Action::requeue(interval)),
        None => Ok(Action::await_change()),
    }
}

async fn upsert_target_secret(
    ctx: &Ctx,
    sync: &VaultSyncSecret,
    secret_namespace: &str,
    data: BTreeMap<String, Vec<u8>>,
) -> Result<(), Error> {
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), secret_namespace);
    let target_name = &sync.spec.target.name;
    let expected_owner = sync.sync_from_annotation_value();

    let existing = api.get_opt(target_name).await?;
    if let Some(existing) = &existing {
        let foreign = existing.metadata.uid.is_some()
            && sync_from_annotation(existing).as_deref() != Some(expected_owner.as_str());
        if foreign {
            return Err(Error::Config(
                "Secret already exists or is managed by someone else".to_string(),
            ));
        }
    }

    let mut secret = existing.clone().unwrap_or_default();
    secret.metadata.name = Some(target_name.clone());
    secret.metadata.namespace = Some(secret_namespace.to_string());

    secret.type_ = Some(if sync.spec.target.r#type.is_empty() {
        "Opaque".to_string()
    } else {
        sync.spec.target.r#type.clone()
    });

    let annotations = secret.metadata.annotations.get_or_insert_with(BTreeMap::new);
    annotations.remove(DEPRECATED_SYNC_FROM_ANNOTATION);
    annotations.insert(SYNC_FROM_ANNOTATION.to_string(), expected_owner);
    for (key, value) in &sync.spec.target.additional_annotations {
        annotations.insert(key.clone(), value.clone());
    }

    if !sync.spec.target.additional_labels.is_empty() {
        let labels = secret.metadata.labels.get_or_insert_with(BTreeMap::new);
        for (key, value) in &sync.spec.target.additional_labels {
            labels.insert(key.clone(), value.clone());
        }
    }

    secret.data = Some(
        data.into_iter()
            .map(|(key, value)| (key, ByteString(value)))
            .collect(),
    );
    secret.string_data = None;

    secret.metadata.owner_references = sync
        .controller_owner_ref(&())
        .map(|reference| vec![reference]);

    match existing {
        Some(_) => {
            api.replace(target_name, &PostParams::default(), &secret)
                .await?;
        }
        None => {
            api.create(&PostParams::default(), &secret).await?;
            info!(
                namespace = secret_namespace,
                name = %target_name,
                "target secret created"
            );
        }
    }

    Ok(())
}

/// The spec target moved: delete the previously written Secret, but only
/// when it still carries this sync's ownership annotation.
async fn delete_outdated_secret(ctx: &Ctx, sync: &VaultSyncSecret) -> Result<(), Error> {
    let Some(applied) = sync.status.as_ref().and_then(|s| s.applied_spec.as_ref()) else {
        return Ok(());
    };

    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &applied.target.namespace);
    let Some(outdated) = api.get_opt(&applied.target.name).await? else {
        return Ok(());
    };

    let expected_owner = sync.sync_from_annotation_value();
    if sync_from_annotation(&outdated).as_deref() != Some(expected_owner.as_str()) {
        return Ok(());
    }

    api.delete(&applied.target.name, &Default::default()).await?;
    Ok(())
}

async fn finalize_sync(ctx: &Ctx, sync: &mut VaultSyncSecret) -> Result<Action, Error> {
    let status = sync.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "VaultSyncSecret is being deleted",
    );

    if !has_finalizer(sync) {
        return Ok(Action::await_change());
    }

    let sync_namespace = sync.namespace().unwrap_or_default();

    let deletable_namespace = match resolve_target_namespace(
        &sync_namespace,
        &sync.spec.target.namespace,
        &ctx.sync_target_namespace_allow_list,
    ) {
        TargetNamespace::Allowed(namespace) => Some(namespace),
        // The target was never reachable; there is nothing of ours there.
        TargetNamespace::Denied(_) => None,
    };

    if let Some(secret_namespace) = deletable_namespace {
        let api: Api<Secret> = Api::namespaced(ctx.client.clone(), &secret_namespace);
        if let Some(target) = api.get_opt(&sync.spec.target.name).await? {
            let expected_owner = sync.sync_from_annotation_value();
            if sync_from_annotation(&target).as_deref() == Some(expected_owner.as_str()) {
                match api.delete(&sync.spec.target.name, &Default::default()).await {
                    Ok(_) => {}
                    Err(kube::Error::Api(response)) if response.code == 404 => {}
                    Err(error) => return Err(error.into()),
                }
            }
        }
    }

    remove_finalizer(sync);

    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultSyncSecret>::all(ctx.client.clone());
    let secrets = Api::<Secret>::all(ctx.client.clone());

    Controller::new(api, watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1))
        .owns(secrets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { super::log_reconcile_result(result) })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_target_namespace_is_the_syncs_own() {
        assert_eq!(
            resolve_target_namespace("default", "", &[]),
            TargetNamespace::Allowed("default".to_string())
        );
        assert_eq!(
            resolve_target_namespace("default", "default", &[]),
            TargetNamespace::Allowed("default".to_string())
        );
    }

    #[test]
    fn foreign_namespace_requires_allow_list() {
        assert_eq!(
            resolve_target_namespace("default", "other", &[]),
            TargetNamespace::Denied("other".to_string())
        );
        assert_eq!(
            resolve_target_namespace("default", "other", &["other".to_string()]),
            TargetNamespace::Allowed("other".to_string())
        );
    }

    #[test]
    fn annotation_lookup_honors_deprecated_alias() {
        let mut secret = Secret::default();
        assert_eq!(sync_from_annotation(&secret), None);

        let mut annotations = BTreeMap::new();
        annotations.insert(
            SYNC_FROM_ANNOTATION.to_string(),
            "default/app-secrets".to_string(),
        );
        secret.metadata.annotations = Some(annotations.clone());
        assert_eq!(
            sync_from_annotation(&secret).as_deref(),
            Some("default/app-secrets")
        );

        // The deprecated alias is still recognized, and wins when both are
        // present (it is removed on every write).
        annotations.insert(
            DEPRECATED_SYNC_FROM_ANNOTATION.to_string(),
            "default/legacy".to_string(),
        );
        secret.metadata.annotations = Some(annotations);
        assert_eq!(sync_from_annotation(&secret).as_deref(), Some("default/legacy"));
    }
}
