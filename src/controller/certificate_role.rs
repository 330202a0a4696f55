//! # VaultCertificateRole controller
//!
//! Upserts a named role on the issuer's PKI mount and the three policies
//! granting the issue, sign-csr and sign-verbatim verbs on the role's
//! sub-paths.

use super::{
    add_finalizer, error_policy, has_finalizer, persist_changes, remove_finalizer, Ctx, Error,
};
use crate::crd::conditions::{
    self, set_condition, set_default_provisioned_condition, REASON_ERROR_CONFIG,
    REASON_ERROR_VAULT, REASON_PROVISIONED, REASON_TERMINATING, STATUS_FALSE, STATUS_TRUE,
};
use crate::crd::{VaultCertificateAuthority, VaultCertificateRole};
use crate::names;
use crate::vault::policy::{Policy, Rule};
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;

/// The three per-role policies on the issuer mount.
pub fn role_policies(issuer_path: &str, role_name: &str, namespace: &str, name: &str) -> Vec<Policy> {
    vec![
        Policy::new(
            names::certificate_issue_policy_name(namespace, name),
            vec![Rule::update(format!("{issuer_path}/issue/{role_name}"))],
        ),
        Policy::new(
            names::certificate_sign_csr_policy_name(namespace, name),
            vec![Rule::update(format!("{issuer_path}/sign/{role_name}"))],
        ),
        Policy::new(
            names::certificate_sign_verbatim_policy_name(namespace, name),
            vec![Rule::update(format!(
                "{issuer_path}/sign-verbatim/{role_name}"
            ))],
        ),
    ]
}

pub async fn reconcile(obj: Arc<VaultCertificateRole>, ctx: Arc<Ctx>) -> Result<Action, Error> {
    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<VaultCertificateRole> = Api::namespaced(ctx.client.clone(), &namespace);

    let mut role = (*obj).clone();
    let previous = role.clone();

    let status = role.status.get_or_insert_with(Default::default);
    set_default_provisioned_condition(&mut status.conditions);

    let result = if role.metadata.deletion_timestamp.is_some() {
        finalize_role(&ctx, &mut role).await
    } else {
        update_role(&ctx, &mut role).await
    };

    persist_changes(&api, &previous, &role).await?;

    result
}

async fn update_role(ctx: &Ctx, role: &mut VaultCertificateRole) -> Result<Action, Error> {
    add_finalizer(role);

    let namespace = role.namespace().unwrap_or_default();
    let issuer_api: Api<VaultCertificateAuthority> = Api::namespaced(ctx.client.clone(), &namespace);

    let issuer = match issuer_api.get(&role.spec.issuer).await {
        Ok(issuer) => issuer,
        Err(error) => {
            let status = role.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_CONFIG,
                "Referenced issuer could not be found",
            );
            return Err(Error::Config(format!(
                "issuer {} not found: {error}",
                role.spec.issuer
            )));
        }
    };

    let issuer_path = issuer.mount_path();
    let role_name = role.role_name();

    if let Err(error) = ctx
        .vault
        .update_certificate_role(
            &issuer_path,
            &role_name,
            &role.role_settings(),
            &role.role_subject(),
        )
        .await
    {
        let status = role.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            "CertificateRole could not be created",
        );
        return Err(error.into());
    }

    for policy in role_policies(&issuer_path, &role_name, &namespace, &role.name_any()) {
        if let Err(error) = ctx.vault.update_policy(&policy).await {
            let status = role.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_VAULT,
                "Policies for certificate role could not be created",
            );
            return Err(error.into());
        }
    }

    let status = role.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_TRUE,
        REASON_PROVISIONED,
        "CertificateRole has been provisioned",
    );

    Ok(Action::await_change())
}

async fn finalize_role(ctx: &Ctx, role: &mut VaultCertificateRole) -> Result<Action, Error> {
    let status = role.status.get_or_insert_with(Default::default);
    set_condition(
        &mut status.conditions,
        conditions::TYPE_PROVISIONED,
        STATUS_FALSE,
        REASON_TERMINATING,
        "CertificateRole is in the process of being deleted from Vault",
    );

    if !has_finalizer(role) {
        return Ok(Action::await_change());
    }

    let namespace = role.namespace().unwrap_or_default();
    // The issuer object may already be gone; its mount path stays
    // derivable from the recorded issuer name.
    let issuer_path = names::pki_mount_path(&namespace, &role.spec.issuer);
    let role_name = role.role_name();

    for policy in role_policies(&issuer_path, &role_name, &namespace, &role.name_any()) {
        if let Err(error) = ctx.vault.delete_policy(&policy.name).await {
            let status = role.status.get_or_insert_with(Default::default);
            set_condition(
                &mut status.conditions,
                conditions::TYPE_PROVISIONED,
                STATUS_FALSE,
                REASON_ERROR_VAULT,
                "Failed to delete policies",
            );
            return Err(error.into());
        }
    }

    if let Err(error) = ctx.vault.delete_certificate_role(&issuer_path, &role_name).await {
        let status = role.status.get_or_insert_with(Default::default);
        set_condition(
            &mut status.conditions,
            conditions::TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_ERROR_VAULT,
            "Failed to delete certificate role",
        );
        return Err(error.into());
    }

    remove_finalizer(role);

    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultCertificateRole>::all(ctx.client.clone());
    let authorities = Api::<VaultCertificateAuthority>::all(ctx.client.clone());

    let controller = Controller::new(api, watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1));
    let store = controller.store();

    // A CA change re-enqueues every role issued under it so policies
    // re-sync after chain rebuilds.
    controller
        .watches(authorities, watcher::Config::default(), move |ca| {
            let namespace = ca.namespace().unwrap_or_default();
            let ca_name = ca.name_any();
            store
                .state()
                .into_iter()
                .filter(|role| {
                    role.namespace().as_deref() == Some(namespace.as_str())
                        && role.spec.issuer == ca_name
                })
                .map(|role| ObjectRef::from_obj(&*role))
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
    fn emits_three_policies_on_role_sub_paths() {
        let policies = role_policies("managed/pki/ns/ca", "managed.pki.cert.ns.c", "ns", "c");
        assert_eq!(policies.len(), 3);

        assert_eq!(policies[0].name, "managed.pki.cert.issue.ns.c");
        assert_eq!(
            policies[0].rules[0].path,
            "managed/pki/ns/ca/issue/managed.pki.cert.ns.c"
        );

        assert_eq!(policies[1].name, "managed.pki.cert.sign-csr.ns.c");
        assert_eq!(
            policies[1].rules[0].path,
            "managed/pki/ns/ca/sign/managed.pki.cert.ns.c"
        );

        assert_eq!(policies[2].name, "managed.pki.cert.sign-verbatim.ns.c");
        assert_eq!(
            policies[2].rules[0].path,
            "managed/pki/ns/ca/sign-verbatim/managed.pki.cert.ns.c"
        );
    }

    #[test]
    fn all_role_policies_grant_update() {
        for policy in role_policies("managed/pki/ns/ca", "role", "ns", "c") {
            assert_eq!(
                policy.rules[0].capabilities,
                vec![crate::vault::policy::Capability::Update]
            );
        }
    }
}
