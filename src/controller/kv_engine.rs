//! # VaultKVSecretEngine controller
//!
//! Provisions KV v2 engine mounts at deterministic paths. Deletion verifies
//! the mount is actually gone before releasing the finalizer, and a delete
//! event for an already-removed object still checks Vault for a stale mount
//! left behind by an earlier reconciliation.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ERROR_VAULT,
    REASON_PROVISIONED, REASON_TERMINATING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::VaultKVSecretEngine;
use crate::names;
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn reconcile(obj: Arc<VaultKVSecretEngine>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultKVSecretEngine> = Api::namespaced(ctx.client.clone(), &namespace);

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

async fn update_engine(ctx: &Ctx, engine: &mut VaultKVSecretEngine) -> Result<Action, Error> {
    add_finalizer(engine);

    let path = engine.mount_path();
    let config = engine.kv_engine_config();

    if let Err(error) = ctx.vault.update_kv_engine(&path, &config).await {
        let status = engine.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to provision engine: {error}"),
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

async fn finalize_engine(ctx: &Ctx, engine: &mut VaultKVSecretEngine) -> Result<Action, Error> {
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
            &format!("Failed to delete engine from Vault: {error}"),
        );
        return Err(error.into());
    }

    // A silent backend failure would leave the mount behind; verify before
    // releasing the finalizer.
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

    info!(%path, "kv engine deleted");
    remove_finalizer(engine);

    Ok(Action::await_change())
}

/// A not-found object event may still correspond to a live Vault mount left
/// over from a previous reconciliation. Delete it if so.
pub async fn cleanup_stale_engine(ctx: &Ctx, namespace: &str, name: &str) -> Result<(), Error> {
    let path = names::kv_engine_mount_path(namespace, name);

    if !ctx.vault.has_engine(&path).await? {
        return Ok(());
    }

    warn!(%path, "deleting stale kv engine left behind in vault");
    ctx.vault.delete_engine(&path).await?;
    Ok(())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultKVSecretEngine>::all(ctx.client.clone());

    // Watch deletions separately so orphaned mounts are cleaned up even when
    // the cluster object is already gone.
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
                    warn!(%error, %namespace, %name, "stale kv engine cleanup failed");
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
    use crate::crd::VaultKVSecretEngineSpec;
    use crate::testutil;
    use crate::vault::mem::InMemoryVault;

    fn engine(name: &str, max_versions: i32) -> VaultKVSecretEngine {
        let mut engine = VaultKVSecretEngine::new(
            name,
            VaultKVSecretEngineSpec {
                max_versions,
                delete_protection: false,
            },
        );
        engine.metadata.namespace = Some("default".to_string());
        engine
    }

    fn harness() -> (Ctx, Arc<InMemoryVault>) {
        let vault = Arc::new(InMemoryVault::new());
        (testutil::vault_only_ctx(vault.clone()), vault)
    }

    #[tokio::test]
    async fn update_mounts_engine_and_sets_condition() {
        let (ctx, vault) = harness();

        let mut engine = engine("main", 0);
        update_engine(&ctx, &mut engine).await.unwrap();

        assert!(vault.engine_exists("managed/kv/default/main"));
        let config = vault.kv_engine_config("managed/kv/default/main").unwrap();
        assert_eq!(config.max_versions, 10);
        assert!(config.cas_required);
        assert!(has_finalizer(&engine));
        let conditions = &engine.status.as_ref().unwrap().conditions;
        assert!(conditions::is_condition_true(
            conditions,
            conditions::TYPE_PROVISIONED
        ));
    }

    #[tokio::test]
    async fn finalize_deletes_mount_and_drops_finalizer() {
        let (ctx, vault) = harness();

        let mut engine = engine("main", 0);
        update_engine(&ctx, &mut engine).await.unwrap();
        assert!(vault.engine_exists("managed/kv/default/main"));

        engine.metadata.deletion_timestamp = Some(testutil::now());
        finalize_engine(&ctx, &mut engine).await.unwrap();

        assert!(!vault.engine_exists("managed/kv/default/main"));
        assert!(!has_finalizer(&engine));
    }

    #[tokio::test]
    async fn finalize_without_finalizer_skips_vault_teardown() {
        let (ctx, vault) = harness();

        let mut engine = engine("main", 0);
        finalize_engine(&ctx, &mut engine).await.unwrap();
        assert!(!vault.engine_exists("managed/kv/default/main"));
    }

    #[tokio::test]
    async fn stale_engine_cleanup_removes_leftover_mounts() {
        let (ctx, vault) = harness();

        let mut engine = engine("main", 0);
        update_engine(&ctx, &mut engine).await.unwrap();

        cleanup_stale_engine(&ctx, "default", "main").await.unwrap();
        assert!(!vault.engine_exists("managed/kv/default/main"));

        // No mount, nothing to do.
        cleanup_stale_engine(&ctx, "default", "main").await.unwrap();
    }
}
