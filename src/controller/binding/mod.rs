//! # VaultBinding controller
//!
//! Translates a subject's grants into the Vault auth role, the client
//! config, and cluster RBAC. When several bindings share a subject, only
//! the dominant one (oldest non-terminating) applies changes; rivals mark
//! themselves inactive and wait.

pub mod artifacts;
pub mod dominance;
pub mod policies;

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, requeue, Ctx,
    Error,
};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ACTIVE, REASON_ERROR_KUBERNETES,
    REASON_ERROR_VAULT, REASON_INACTIVE, REASON_PROVISIONED, REASON_RIVAL_ACTIVE,
    REASON_TERMINATING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::VaultBinding;
use futures::StreamExt;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;

fn set_default_active_condition(binding: &mut VaultBinding) {
    let status = binding.status.get_or_insert_with(Default::default);
    if conditions::find_condition(&status.conditions, conditions::TYPE_ACTIVE).is_none() {
        set_condition(
            &mut status.conditions,
            conditions::TYPE_ACTIVE,
            STATUS_FALSE,
            conditions::REASON_INITIALIZING,
            "provisioning is about to start",
        );
    }
}

pub async fn reconcile(obj: Arc<VaultBinding>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultBinding> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut binding = (*obj).clone();
    let previous = binding.clone();

    {
        let status = binding.status.get_or_insert_with(Default::default);
        set_default_provisioned_condition(&mut status.conditions);
    }
    set_default_active_condition(&mut binding);

    let result = if binding.metadata.deletion_timestamp.is_some() {
        finalize_binding(&ctx, &mut binding).await
    } else {
        let effective = binding.effective_spec();
        let status = binding.status.get_or_insert_with(Default::default);
        status.applied_spec = Some(effective.clone());
        update_binding(&ctx, &mut binding, &effective).await
    };

    persist_changes(&api, &previous, &binding).await?;

    result
}

async fn update_binding(
    ctx: &Ctx,
    binding: &mut VaultBinding,
    spec: &crate::crd::VaultBindingSpec,
) -> Result<Action, Error> {
    add_finalizer(binding);

    let namespace = binding.namespace().unwrap_or_default();
    let api: Api<VaultBinding> = Api::namespaced(ctx.client.clone(), &namespace);

    let rivals = match api.list(&ListParams::default()).await {
        Ok(list) => list.items,
        Err(error) => {
            let status = binding.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_KUBERNETES,
                &format!("Failed to check for rival status: {error}"),
            );
            return Err(error.into());
        }
    };

    if !dominance::is_dominant(binding, &rivals) {
        let dominant_name = dominance::find_dominant_binding(&rivals, &spec.subject.name)
            .map(|dominant| dominant.name_any())
            .unwrap_or_default();
        let message = format!(
            "Another binding is active for subject {}: {dominant_name}",
            spec.subject.name
        );
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_INACTIVE,
            &message,
        );
        set_condition(
            &mut status.conditions,
            conditions::TYPE_ACTIVE,
            STATUS_FALSE,
            REASON_RIVAL_ACTIVE,
            &message,
        );
        return Ok(requeue());
    }

    {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_ACTIVE,
            STATUS_TRUE,
            REASON_ACTIVE,
            &format!("This binding is active for subject: {}", spec.subject.name),
        );
    }

    // The policy list is all-or-nothing: a dangling reference applies no
    // Vault changes at all.
    if let Err(error) = policies::verify_references(ctx, &namespace, spec).await {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            error.reason(),
            &format!("Failed to collect policy information: {error}"),
        );
        return Err(error);
    }
    let policy_names = policies::assemble_policy_names(&namespace, spec);

    if let Err(error) = artifacts::apply_vault_role(ctx, binding, policy_names).await {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            &format!("Could not create role: {error}"),
        );
        return Err(error);
    }

    if let Err(error) = artifacts::apply_client_config(ctx, binding, spec).await {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            error.reason(),
            &format!("Could not create client config: {error}"),
        );
        return Err(error);
    }

    if let Err(error) = artifacts::apply_rbac(ctx, binding).await {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_KUBERNETES,
            &format!("Could not create role binding: {error}"),
        );
        return Err(error);
    }

    let status = binding.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "Binding has been provisioned",
    );

    Ok(Action::await_change())
}

async fn finalize_binding(ctx: &Ctx, binding: &mut VaultBinding) -> Result<Action, Error> {
    {
        let status = binding.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_TERMINATING,
            "Binding is being deleted",
        );
        set_condition(
            &mut status.conditions,
            conditions::TYPE_ACTIVE,
            STATUS_FALSE,
            REASON_TERMINATING,
            "Binding is being deleted",
        );
    }

    if !has_finalizer(binding) {
        return Ok(Action::await_change());
    }

    // The owned ClientConfig, Role and RoleBinding are garbage-collected
    // through their owner references; only the Vault role needs explicit
    // teardown.
    artifacts::delete_vault_role(ctx, binding).await?;

    remove_finalizer(binding);

    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultBinding>::all(ctx.client.clone());

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
    use crate::crd::{VaultBindingSpec, VaultBindingSubject};
    use crate::testutil;
    use crate::vault::mem::InMemoryVault;

    #[tokio::test]
    async fn finalize_deletes_vault_role_and_finalizer() {
        let vault = Arc::new(InMemoryVault::new());
        let ctx = testutil::vault_only_ctx(vault.clone());

        let mut binding = VaultBinding::new(
            "grants",
            VaultBindingSpec {
                subject: VaultBindingSubject {
                    name: "backend".to_string(),
                },
                ..VaultBindingSpec::default()
            },
        );
        binding.metadata.namespace = Some("team-a".to_string());
        add_finalizer(&mut binding);

        artifacts::apply_vault_role(&ctx, &binding, vec!["managed.kv.team-a.db".to_string()])
            .await
            .unwrap();
        assert!(vault
            .auth_role(
                crate::constants::KUBERNETES_AUTH_PATH,
                "managed.k8s.team-a.backend"
            )
            .is_some());

        binding.metadata.deletion_timestamp = Some(testutil::now());
        finalize_binding(&ctx, &mut binding).await.unwrap();

        assert!(vault
            .auth_role(
                crate::constants::KUBERNETES_AUTH_PATH,
                "managed.k8s.team-a.backend"
            )
            .is_none());
        assert!(!has_finalizer(&binding));

        let status = binding.status.as_ref().unwrap();
        assert!(conditions::is_condition_false(
            &status.conditions,
            conditions::TYPE_ACTIVE
        ));
    }
}
