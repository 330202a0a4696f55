//! # VaultKVSecret controller
//!
//! Decrypts the admission-encrypted spec fields through the managed transit
//! key, writes the cleartext map to the secret's KV path, and emits a
//! single read policy. Engine or path moves delete the old Vault secret
//! (and policy) before the new one is written.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::crd::conditions::{
    self, is_condition_false, set_condition, set_default_provisioned_condition,
    REASON_ERROR_CONFIG, REASON_ERROR_VAULT, REASON_PROVISIONED, REASON_TERMINATING,
    REASON_WAITING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::{VaultKVSecret, VaultKVSecretEngine};
use crate::managed;
use crate::names;
use crate::vault::kv::KvSecret;
use crate::vault::policy::{Policy, Rule};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::collections::BTreeMap;
use std::sync::Arc;
use zeroize::Zeroizing;

/// One side of the diff between desired and deployed state.
#[derive(Debug, Clone)]
pub struct DeployedSecret {
    pub engine_path: String,
    pub secret_path: String,
    pub policy_name: String,
    pub provisioned: bool,
}

/// The read policy for a KV secret: read on the engine's data path.
pub fn read_policy(engine_path: &str, secret_path: &str, namespace: &str, name: &str) -> Policy {
    Policy::new(
        names::kv_secret_policy_name(namespace, name),
        vec![Rule::read(format!("{engine_path}/data/{secret_path}"))],
    )
}

/// State the secret should be in, derived from the spec.
pub fn desired_state(secret: &VaultKVSecret, engine: &VaultKVSecretEngine) -> DeployedSecret {
    DeployedSecret {
        engine_path: engine.mount_path(),
        secret_path: secret.secret_path(),
        policy_name: names::kv_secret_policy_name(
            secret.namespace().as_deref().unwrap_or_default(),
            &secret.name_any(),
        ),
        provisioned: true,
    }
}

/// State the secret is currently in, reconstructed from status.
pub fn current_state(secret: &VaultKVSecret) -> DeployedSecret {
    let status = secret.status.clone().unwrap_or_default();
    DeployedSecret {
        provisioned: !status.engine.is_empty() && !status.path.is_empty(),
        engine_path: status.engine,
        secret_path: status.path,
        policy_name: status.read_only_policy_name,
    }
}

/// Whether the deployed Vault secret must be removed before writing the
/// desired one (engine or path moved).
pub fn must_delete_current_secret(desired: &DeployedSecret, current: &DeployedSecret) -> bool {
    current.provisioned
        && (desired.engine_path != current.engine_path
            || desired.secret_path != current.secret_path)
}

/// Whether the deployed policy must be removed before writing the desired
/// one (policy renamed).
pub fn must_delete_current_policy(desired: &DeployedSecret, current: &DeployedSecret) -> bool {
    current.provisioned && desired.policy_name != current.policy_name
}

pub async fn reconcile(obj: Arc<VaultKVSecret>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultKVSecret> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut secret = (*obj).clone();
    let previous = secret.clone();

    let status = secret.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if secret.metadata.deletion_timestamp.is_some() {
        finalize_secret(&ctx, &mut secret).await
    } else {
        update_secret(&ctx, &mut secret).await
    };

    persist_changes(&api, &previous, &secret).await?;

    result
}

async fn update_secret(ctx: &Ctx, secret: &mut VaultKVSecret) -> Result<Action, Error> {
    let namespace = secret.namespace().unwrap_or_default();

    let engine_api: Api<VaultKVSecretEngine> = Api::namespaced(ctx.client.clone(), &namespace);
    let engine = match engine_api.get(&secret.spec.engine).await {
        Ok(engine) => engine,
        Err(error) => {
            let status = secret.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_CONFIG,
                &format!("Referenced engine not found: {error}"),
            );
            return Err(Error::Config(format!(
                "kv engine {} not found: {error}",
                secret.spec.engine
            )));
        }
    };

    let engine_conditions = engine
        .status
        .as_ref()
        .map(|s| s.conditions.as_slice())
        .unwrap_or_default();
    if is_condition_false(engine_conditions, conditions::TYPE_PROVISIONED) {
        let status = secret.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_WAITING,
            "Referenced engine is not provisioned yet",
        );
        return Err(Error::Waiting(format!(
            "kv engine {} is not provisioned yet",
            secret.spec.engine
        )));
    }

    add_finalizer(secret);

    let desired = desired_state(secret, &engine);
    let current = current_state(secret);

    // Decrypt the spec fields into the cleartext map written to Vault.
    let mut fields = BTreeMap::new();
    for (field_name, field) in &secret.spec.fields {
        match managed::decrypt(ctx.vault.as_ref(), field.cipher_text.as_str()).await {
            Ok(plaintext) => {
                let plaintext = Zeroizing::new(plaintext);
                let value = String::from_utf8_lossy(&plaintext).into_owned();
                fields.insert(field_name.clone(), value);
            }
            Err(error) => {
                let status = secret.status.get_or_insert_with(Default::default);
                set_condition(
                    &mut status.conditions,
                    conditions::TYPE_PROVISIONED,
                    STATUS_FALSE,
                    REASON_ERROR_VAULT,
                    &format!("Failed to decrypt field {field_name}: {error}"),
                );
                return Err(error.into());
            }
        }
    }

    if let Err(error) = apply_vault_state(ctx, &desired, &current, fields).await {
        let status = secret.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to apply changes in Vault: {error}"),
        );
        return Err(error);
    }

    // Record ciphertext fingerprints, never plaintext.
    let encrypted_fields: BTreeMap<String, String> = secret
        .spec
        .fields
        .iter()
        .map(|(name, field)| (name.clone(), field.cipher_text.as_str().to_string()))
        .collect();

    let status = secret.status.get_or_insert_with(Default::default);
    status.engine = desired.engine_path;
    status.path = desired.secret_path;
    status.read_only_policy_name = desired.policy_name;
    status.fields = encrypted_fields;
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "Secret has been provisioned",
    );

    Ok(Action::await_change())
}

/// Apply the policy first, then the secret: delete-then-create on renames,
/// plain upsert otherwise.
async fn apply_vault_state(
    ctx: &Ctx,
    desired: &DeployedSecret,
    current: &DeployedSecret,
    fields: BTreeMap<String, String>,
) -> Result<(), Error> {
    if must_delete_current_policy(desired, current) {
        ctx.vault.delete_policy(&current.policy_name).await?;
    }

    let policy = Policy::new(
        desired.policy_name.clone(),
        vec![Rule::read(format!(
            "{}/data/{}",
            desired.engine_path, desired.secret_path
        ))],
    );
    ctx.vault.update_policy(&policy).await?;

    if must_delete_current_secret(desired, current) {
        ctx.vault
            .delete_kv_secret(&current.engine_path, &current.secret_path)
            .await?;
    }

    ctx.vault
        .update_kv_secret(
            &desired.engine_path,
            &KvSecret::new(desired.secret_path.clone(), fields),
        )
        .await?;

    Ok(())
}

async fn finalize_secret(ctx: &Ctx, secret: &mut VaultKVSecret) -> Result<Action, Error> {
    let status = secret.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "secret is being deleted",
    );

    if !has_finalizer(secret) {
        return Ok(Action::await_change());
    }

    let namespace = secret.namespace().unwrap_or_default();

    // Prefer the deployed state from status; fall back to the deterministic
    // derivation when the secret never reached Vault.
    let current = current_state(secret);
    let (engine_path, secret_path, policy_name) = if current.provisioned {
        (
            current.engine_path,
            current.secret_path,
            current.policy_name,
        )
    } else {
        (
            names::kv_engine_mount_path(&namespace, &secret.spec.engine),
            secret.secret_path(),
            names::kv_secret_policy_name(&namespace, &secret.name_any()),
        )
    };

    if let Err(error) = ctx.vault.delete_policy(&policy_name).await {
        let status = secret.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to delete policy for secret from Vault: {error}"),
        );
        return Err(error.into());
    }

    if let Err(error) = ctx.vault.delete_kv_secret(&engine_path, &secret_path).await {
        let status = secret.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Failed to delete the secret: {error}"),
        );
        return Err(error.into());
    }

    remove_finalizer(secret);

    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultKVSecret>::all(ctx.client.clone());
    let engines = Api::<VaultKVSecretEngine>::all(ctx.client.clone());

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
                .filter(|secret| {
                    secret.namespace().as_deref() == Some(namespace.as_str())
                        && secret.spec.engine == engine_name
                })
                .map(|secret| ObjectRef::from_obj(&*secret))
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
    use crate::crd::{VaultKVSecretSpec, VaultKVSecretStatus};

    fn deployed(engine: &str, path: &str, policy: &str, provisioned: bool) -> DeployedSecret {
        DeployedSecret {
            engine_path: engine.to_string(),
            secret_path: path.to_string(),
            policy_name: policy.to_string(),
            provisioned,
        }
    }

    #[test]
    fn unprovisioned_current_state_never_triggers_deletes() {
        let desired = deployed("managed/kv/ns/e", "apps/db", "managed.kv.ns.db", true);
        let current = deployed("", "", "", false);
        assert!(!must_delete_current_secret(&desired, &current));
        assert!(!must_delete_current_policy(&desired, &current));
    }

    #[test]
    fn engine_move_deletes_old_secret() {
        let desired = deployed("managed/kv/ns/new", "apps/db", "managed.kv.ns.db", true);
        let current = deployed("managed/kv/ns/old", "apps/db", "managed.kv.ns.db", true);
        assert!(must_delete_current_secret(&desired, &current));
        assert!(!must_delete_current_policy(&desired, &current));
    }

    #[test]
    fn path_move_deletes_old_secret() {
        let desired = deployed("managed/kv/ns/e", "apps/new", "managed.kv.ns.db", true);
        let current = deployed("managed/kv/ns/e", "apps/old", "managed.kv.ns.db", true);
        assert!(must_delete_current_secret(&desired, &current));
    }

    #[test]
    fn policy_rename_deletes_old_policy() {
        let desired = deployed("managed/kv/ns/e", "apps/db", "managed.kv.ns.new", true);
        let current = deployed("managed/kv/ns/e", "apps/db", "managed.kv.ns.old", true);
        assert!(must_delete_current_policy(&desired, &current));
        assert!(!must_delete_current_secret(&desired, &current));
    }

    #[test]
    fn current_state_reads_status() {
        let mut secret = VaultKVSecret::new(
            "db",
            VaultKVSecretSpec {
                engine: "main".to_string(),
                ..VaultKVSecretSpec::default()
            },
        );
        secret.status = Some(VaultKVSecretStatus {
            engine: "managed/kv/ns/main".to_string(),
            path: "db".to_string(),
            read_only_policy_name: "managed.kv.ns.db".to_string(),
            ..VaultKVSecretStatus::default()
        });

        let current = current_state(&secret);
        assert!(current.provisioned);
        assert_eq!(current.engine_path, "managed/kv/ns/main");

        secret.status = None;
        assert!(!current_state(&secret).provisioned);
    }

    #[test]
    fn read_policy_grants_read_on_data_path() {
        let policy = read_policy("managed/kv/ns/e", "apps/db", "ns", "db");
        assert_eq!(policy.name, "managed.kv.ns.db");
        assert_eq!(policy.rules[0].path, "managed/kv/ns/e/data/apps/db");
    }
}
