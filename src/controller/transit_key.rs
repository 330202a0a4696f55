//! # VaultTransitKey controller
//!
//! Creates keys inside transit engines and emits one policy per key
//! capability. Changes to `engine`, `type`, `exportable` or
//! `allowPlaintextBackup` cannot be applied in place: the old key is
//! deleted (on the previously applied engine) before the new one is
//! created, and `status.appliedSpec` is only advanced once the new key
//! exists.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::crd::conditions::{
    self, is_condition_false, set_condition, set_default_provisioned_condition,
    REASON_ERROR_CONFIG, REASON_ERROR_VAULT, REASON_PROVISIONED, REASON_TERMINATING,
    REASON_WAITING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::{VaultTransitEngine, VaultTransitKey};
use crate::names;
use crate::vault::policy::{Policy, Rule};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::info;

pub async fn reconcile(obj: Arc<VaultTransitKey>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultTransitKey> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut key = (*obj).clone();
    let previous = key.clone();

    let status = key.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if key.metadata.deletion_timestamp.is_some() {
        finalize_key(&ctx, &mut key).await
    } else {
        update_key(&ctx, &mut key).await
    };

    persist_changes(&api, &previous, &key).await?;

    result
}

async fn get_engine(
    ctx: &Ctx,
    namespace: &str,
    name: &str,
) -> Result<VaultTransitEngine, kube::Error> {
    let api: Api<VaultTransitEngine> = Api::namespaced(ctx.client.clone(), namespace);
    api.get(name).await
}

async fn update_key(ctx: &Ctx, key: &mut VaultTransitKey) -> Result<Action, Error> {
    add_finalizer(key);

    let namespace = key.namespace().unwrap_or_default();

    let engine = match get_engine(ctx, &namespace, &key.spec.engine).await {
        Ok(engine) => engine,
        Err(error) => {
            let status = key.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_CONFIG,
                &format!("Referenced TransitEngine not found: {error}"),
            );
            return Err(Error::Config(format!(
                "transit engine {} not found: {error}",
                key.spec.engine
            )));
        }
    };

    let engine_conditions = engine
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    if is_condition_false(engine_conditions, conditions::TYPE_PROVISIONED) {
        let status = key.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_WAITING,
            "Referenced engine is not provisioned yet",
        );
        return Err(Error::Waiting(format!(
            "transit engine {} is not provisioned yet",
            key.spec.engine
        )));
    }

    if key.has_incompatible_changes() {
        delete_previously_applied_key(ctx, key, &namespace).await?;
    }

    let engine_path = engine.mount_path();
    let key_name = key.transit_key_name();

    if let Err(error) = ctx
        .vault
        .update_transit_key(&engine_path, &key_name, key.spec.r#type, &key.key_config())
        .await
    {
        let status = key.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to provision transit key: {error}"),
        );
        return Err(error.into());
    }

    // The applied spec only advances after the Vault write succeeded, so a
    // failed recreation retries the delete-then-create protocol.
    let spec = key.spec.clone();
    let status = key.status.get_or_insert_with(Default::default);
    status.applied_spec = Some(spec);

    for policy in key_policies(&engine_path, &key_name, &namespace, &key.name_any()) {
        if let Err(error) = ctx.vault.update_policy(&policy).await {
            let status = key.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_VAULT,
                &format!("Failed to provision policies: {error}"),
            );
            return Err(error.into());
        }
    }

    let status = key.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "TransitKey has been provisioned",
    );

    Ok(Action::await_change())
}

/// Delete the key as recorded in the applied spec, using the engine it was
/// created on back then.
async fn delete_previously_applied_key(
    ctx: &Ctx,
    key: &mut VaultTransitKey,
    namespace: &str,
) -> Result<(), Error> {
    let applied = key
        .status
        .as_ref()
        .and_then(|s| s.applied_spec.clone())
        .unwrap_or_default();

    let old_engine_path = match get_engine(ctx, namespace, &applied.engine).await {
        Ok(engine) => engine.mount_path(),
        // The old engine object may already be gone; its mount path is
        // still deterministic.
        Err(_) => names::transit_engine_mount_path(namespace, &applied.engine),
    };

    let key_name = key.transit_key_name();
    info!(
        key = %key_name,
        engine = %old_engine_path,
        "deleting transit key before recreation with incompatible spec"
    );

    if let Err(error) = ctx.vault.delete_transit_key(&old_engine_path, &key_name).await {
        let status = key.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            "Failed to update transit key to newest spec",
        );
        return Err(error.into());
    }

    Ok(())
}

/// The eight per-capability policies for a transit key. The hmac, sign and
/// verify policies additionally cover the four SHA-2 algorithm sub-paths.
pub fn key_policies(
    engine_path: &str,
    key_name: &str,
    namespace: &str,
    resource_name: &str,
) -> Vec<Policy> {
    let sha2_paths = |operation: &str| -> Vec<Rule> {
        let mut rules = vec![Rule::update(format!("{engine_path}/{operation}/{key_name}"))];
        for algorithm in ["sha2-224", "sha2-256", "sha2-384", "sha2-512"] {
            rules.push(Rule::update(format!(
                "{engine_path}/{operation}/{key_name}/{algorithm}"
            )));
        }
        rules
    };

    vec![
        Policy::new(
            names::transit_key_policy_name("read", namespace, resource_name),
            vec![Rule::read(format!("{engine_path}/keys/{key_name}"))],
        ),
        Policy::new(
            names::transit_key_policy_name("encrypt", namespace, resource_name),
            vec![Rule::update(format!("{engine_path}/encrypt/{key_name}"))],
        ),
        Policy::new(
            names::transit_key_policy_name("decrypt", namespace, resource_name),
            vec![Rule::update(format!("{engine_path}/decrypt/{key_name}"))],
        ),
        Policy::new(
            names::transit_key_policy_name("rewrap", namespace, resource_name),
            vec![Rule::update(format!("{engine_path}/rewrap/{key_name}"))],
        ),
        Policy::new(
            names::transit_key_policy_name("datakey", namespace, resource_name),
            vec![
                Rule::update(format!("{engine_path}/datakey/plaintext/{key_name}")),
                Rule::update(format!("{engine_path}/datakey/wrapped/{key_name}")),
            ],
        ),
        Policy::new(
            names::transit_key_policy_name("hmac", namespace, resource_name),
            sha2_paths("hmac"),
        ),
        Policy::new(
            names::transit_key_policy_name("sign", namespace, resource_name),
            sha2_paths("sign"),
        ),
        Policy::new(
            names::transit_key_policy_name("verify", namespace, resource_name),
            sha2_paths("verify"),
        ),
    ]
}

async fn finalize_key(ctx: &Ctx, key: &mut VaultTransitKey) -> Result<Action, Error> {
    let status = key.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "transit key is being deleted",
    );

    if !has_finalizer(key) {
        return Ok(Action::await_change());
    }

    let namespace = key.namespace().unwrap_or_default();

    // Deletion is permitted even when the engine object is gone; the mount
    // path stays derivable from the recorded engine name.
    let engine_path = match get_engine(ctx, &namespace, &key.spec.engine).await {
        Ok(engine) => engine.mount_path(),
        Err(_) => names::transit_engine_mount_path(&namespace, &key.spec.engine),
    };

    let key_name = key.transit_key_name();
    ctx.vault.delete_transit_key(&engine_path, &key_name).await?;

    for policy in key_policies(&engine_path, &key_name, &namespace, &key.name_any()) {
        ctx.vault.delete_policy(&policy.name).await?;
    }

    remove_finalizer(key);

    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultTransitKey>::all(ctx.client.clone());
    let engines = Api::<VaultTransitEngine>::all(ctx.client.clone());

    let controller = Controller::new(api, watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1));
    let store = controller.store();

    controller
        .watches(engines, watcher::Config::default(), move |engine| {
            let namespace = engine.namespace().unwrap_or_default();
            let engine_name = engine.name_any();
            store
                .state()
                .into_iter()
                .filter(|key| {
                    key.namespace().as_deref() == Some(namespace.as_str())
                        && key.spec.engine == engine_name
                })
                .map(|key| ObjectRef::from_obj(&*key))
                .collect::<Vec<_>>()
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { super::log_reconcile_result(result) })
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_eight_policies_with_expected_names() {
        let policies = key_policies("managed/transit_engine/ns/e", "signer", "ns", "signer");
        let policy_names: Vec<_> = policies.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            policy_names,
            vec![
                "managed.transit.key.read.ns.signer",
                "managed.transit.key.encrypt.ns.signer",
                "managed.transit.key.decrypt.ns.signer",
                "managed.transit.key.rewrap.ns.signer",
                "managed.transit.key.datakey.ns.signer",
                "managed.transit.key.hmac.ns.signer",
                "managed.transit.key.sign.ns.signer",
                "managed.transit.key.verify.ns.signer",
            ]
        );
    }

    #[test]
    fn read_policy_targets_key_path() {
        let policies = key_policies("managed/transit_engine/ns/e", "signer", "ns", "signer");
        assert_eq!(
            policies[0].rules[0].path,
            "managed/transit_engine/ns/e/keys/signer"
        );
        assert_eq!(
            policies[0].rules[0].capabilities,
            vec![crate::vault::policy::Capability::Read]
        );
    }

    #[test]
    fn datakey_policy_covers_plaintext_and_wrapped() {
        let policies = key_policies("managed/transit_engine/ns/e", "signer", "ns", "signer");
        let datakey = &policies[4];
        let paths: Vec<_> = datakey.rules.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "managed/transit_engine/ns/e/datakey/plaintext/signer",
                "managed/transit_engine/ns/e/datakey/wrapped/signer",
            ]
        );
    }

    #[test]
    fn sign_policy_covers_sha2_sub_paths() {
        let policies = key_policies("managed/transit_engine/ns/e", "signer", "ns", "signer");
        let sign = &policies[6];
        assert_eq!(sign.rules.len(), 5);
        assert!(sign
            .rules
            .iter()
            .any(|r| r.path == "managed/transit_engine/ns/e/sign/signer/sha2-512"));
    }
}
