//! # VaultTransitEngine controller
//!
//! Provisions transit engine mounts. Shares the orphan-cleanup behavior of
//! the KV engine controller: a delete event whose object is already gone
//! still verifies no stale mount remains in Vault.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ERROR_VAULT,
    REASON_PROVISIONED, REASON_TERMINATING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::VaultTransitEngine;
use crate::names;
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn reconcile(obj: Arc<VaultTransitEngine>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultTransitEngine> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut engine = (*obj).clone();
    let previous = engine.clone();

    let status = engine.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if engine.metadata.deletion_timestamp.is_some() {
        finalize_engine(&ctx, &mut engine).await
    } else {
        update_engine(&ctx, &mut engine).await
    };

    persist_changes(&api, &previous, &engine).await?;

    result
}

async fn update_engine(ctx: &Ctx, engine: &mut VaultTransitEngine) -> Result<Action, Error> {
    add_finalizer(engine);

    let path = engine.mount_path();

    if let Err(error) = ctx
        .vault
        .update_transit_engine(&path, &engine.spec.plugin)
        .await
    {
        let status = engine.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to update transit engine: {error}"),
        );
        return Err(error.into());
    }

    let status = engine.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "Engine has been provisioned",
    );

    Ok(Action::await_change())
}

async fn finalize_engine(ctx: &Ctx, engine: &mut VaultTransitEngine) -> Result<Action, Error> {
    let status = engine.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "Engine is being deleted",
    );

    if !has_finalizer(engine) {
        return Ok(Action::await_change());
    }

    let path = engine.mount_path();

    if let Err(error) = ctx.vault.delete_engine(&path).await {
        let status = engine.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to delete transit engine from Vault: {error}"),
        );
        return Err(error.into());
    }

    if ctx.vault.has_engine(&path).await? {
        let status = engine.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            "Engine still exists after deletion",
        );
        return Err(Error::Vault(crate::vault::Error::Api(format!(
            "engine {path} still exists after deletion"
        ))));
    }

    info!(%path, "transit engine deleted");
    remove_finalizer(engine);

    Ok(Action::await_change())
}

/// Delete a stale transit mount whose cluster object is already gone.
pub async fn cleanup_stale_engine(ctx: &Ctx, namespace: &str, name: &str) -> Result<(), Error> {
    let path = names::transit_engine_mount_path(namespace, name);

    if !ctx.vault.has_engine(&path).await? {
        return Ok(());
    }

    warn!(%path, "deleting stale transit engine left behind in vault");
    ctx.vault.delete_engine(&path).await?;
    Ok(())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultTransitEngine>::all(ctx.client.clone());

    let cleanup_ctx = ctx.clone();
    let cleanup_api = api.clone();
    tokio::spawn(async move {
        let stream = watcher(cleanup_api, watcher::Config::default());
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let Ok(watcher::Event::Delete(engine)) = event {
                let namespace = engine.namespace().unwrap_or_default();
                let name = engine.name_any();
                if let Err(error) = cleanup_stale_engine(&cleanup_ctx, &namespace, &name).await {
                    warn!(%error, %namespace, %name, "stale transit engine cleanup failed");
                }
            }
        }
    });

    Controller::new(api, watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { super::log_reconcile_result(result) })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::VaultTransitEngineSpec;
    use crate::testutil;
    use crate::vault::mem::InMemoryVault;

    fn engine(name: &str) -> VaultTransitEngine {
        let mut engine = VaultTransitEngine::new(name, VaultTransitEngineSpec::default());
        engine.metadata.namespace = Some("default".to_string());
        engine
    }

    #[tokio::test]
    async fn update_mounts_engine() {
        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        let mut engine = engine("crypto");
        update_engine(&ctx, &mut engine).await.unwrap();

        assert!(vault.engine_exists("managed/transit_engine/default/crypto"));
        assert_eq!(
            vault
                .transit_engine_plugin("managed/transit_engine/default/crypto")
                .as_deref(),
            Some("transit")
        );
        assert!(has_finalizer(&engine));
    }

    #[tokio::test]
    async fn repeated_updates_are_idempotent() {
        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        let mut engine = engine("crypto");
        update_engine(&ctx, &mut engine).await.unwrap();
        update_engine(&ctx, &mut engine).await.unwrap();

        let conditions_list = &engine.status.as_ref().unwrap().conditions;
        assert!(conditions::is_condition_true(
            conditions_list,
            conditions::TYPE_PROVISIONED
        ));
        assert_eq!(engine.metadata.finalizers.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn finalize_deletes_mount() {
        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        let mut engine = engine("crypto");
        update_engine(&ctx, &mut engine).await.unwrap();
        finalize_engine(&ctx, &mut engine).await.unwrap();

        assert!(!vault.engine_exists("managed/transit_engine/default/crypto"));
        assert!(!has_finalizer(&engine));
        assert!(conditions::is_condition_false(
            &engine.status.as_ref().unwrap().conditions,
            conditions::TYPE_PROVISIONED
        ));
    }

    #[tokio::test]
    async fn stale_engine_cleanup() {
        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        let mut engine = engine("crypto");
        update_engine(&ctx, &mut engine).await.unwrap();

        cleanup_stale_engine(&ctx, "default", "crypto").await.unwrap();
        assert!(!vault.engine_exists("managed/transit_engine/default/crypto"));
    }
}
