//! # Controllers
//!
//! Nine per-kind reconcilers sharing one cluster client and one Vault
//! client. Each follows the same skeleton: fetch, snapshot, seed default
//! conditions, update or finalize, persist status/finalizer diffs, requeue
//! on error after a fixed interval.

pub mod binding;
pub mod certificate_authority;
pub mod certificate_role;
pub mod client_config;
pub mod kv_engine;
pub mod kv_secret;
pub mod sync_secret;
pub mod transit_engine;
pub mod transit_key;

use crate::constants::ERROR_REQUEUE_SECS;
use crate::crd::conditions;
use crate::observability;
use crate::vault;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, Resource, ResourceExt};
use kube_runtime::controller::Action;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

/// Shared state handed to every reconciler.
pub struct Ctx {
    pub client: Client,
    pub vault: Arc<dyn vault::Api>,
    /// Namespaces a VaultSyncSecret may target besides its own.
    pub sync_target_namespace_allow_list: Vec<String>,
}

impl Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field(
                "sync_target_namespace_allow_list",
                &self.sync_target_namespace_allow_list,
            )
            .finish_non_exhaustive()
    }
}

/// Reconciliation failures, classified at the call site so each maps onto a
/// condition reason.
#[derive(Debug, Error)]
pub enum Error {
    #[error("vault error: {0}")]
    Vault(#[from] vault::Error),

    #[error("kubernetes error: {0}")]
    Kubernetes(#[from] kube::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("waiting: {0}")]
    Waiting(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Condition reason this error class maps to.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::Vault(_) => conditions::REASON_ERROR_VAULT,
            Error::Kubernetes(_) | Error::Serialization(_) => conditions::REASON_ERROR_KUBERNETES,
            Error::Config(_) => conditions::REASON_ERROR_CONFIG,
            Error::Waiting(_) => conditions::REASON_WAITING,
        }
    }
}

/// The fixed requeue used after any non-terminal error.
pub fn requeue() -> Action {
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}

/// Generic error policy: log, count, retry after the fixed interval.
pub fn error_policy<K>(obj: Arc<K>, error: &Error, _ctx: Arc<Ctx>) -> Action
where
    K: Resource,
    K::DynamicType: Default,
{
    error!(
        name = %obj.name_any(),
        namespace = %obj.namespace().unwrap_or_default(),
        %error,
        "reconciliation failed"
    );
    observability::metrics::increment_reconciliation_errors();
    requeue()
}

pub fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.finalizers()
        .iter()
        .any(|f| f == crate::constants::FINALIZER)
}

pub fn add_finalizer<K: Resource>(obj: &mut K) {
    if !has_finalizer(obj) {
        obj.meta_mut()
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(crate::constants::FINALIZER.to_string());
    }
}

pub fn remove_finalizer<K: Resource>(obj: &mut K) {
    if let Some(finalizers) = obj.meta_mut().finalizers.as_mut() {
        finalizers.retain(|f| f != crate::constants::FINALIZER);
    }
}

/// Persist status and finalizer changes made during a reconciliation.
///
/// Mirrors the snapshot/diff pattern every controller uses: the status
/// subresource is only written when it changed, the object itself only when
/// the finalizer list changed.
pub async fn persist_changes<K>(api: &Api<K>, previous: &K, current: &K) -> Result<(), Error>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Debug,
    K::DynamicType: Default,
{
    let name = current.name_any();

    let previous_status = serde_json::to_value(previous)?
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    let current_status = serde_json::to_value(current)?
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    if previous_status != current_status {
        let patch = serde_json::json!({ "status": current_status });
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
    }

    if previous.meta().finalizers != current.meta().finalizers {
        let patch = serde_json::json!({
            "metadata": { "finalizers": current.meta().finalizers }
        });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(patch))
            .await?;
    }

    Ok(())
}

/// Log the outcome of a controller's reconcile stream item.
pub fn log_reconcile_result<T, E>(result: Result<T, E>)
where
    T: Debug,
    E: std::fmt::Display,
{
    match result {
        Ok(object) => {
            observability::metrics::increment_reconciliations();
            tracing::debug!(object = ?object, "reconciled");
        }
        Err(error) => warn!(%error, "reconcile stream error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{VaultKVSecretEngine, VaultKVSecretEngineSpec};

    #[test]
    fn error_reasons_follow_the_taxonomy() {
        assert_eq!(
            Error::Vault(vault::Error::Api("boom".to_string())).reason(),
            conditions::REASON_ERROR_VAULT
        );
        assert_eq!(
            Error::Config("missing engine".to_string()).reason(),
            conditions::REASON_ERROR_CONFIG
        );
        assert_eq!(
            Error::Waiting("engine not provisioned".to_string()).reason(),
            conditions::REASON_WAITING
        );
    }

    #[test]
    fn finalizer_helpers_are_idempotent() {
        let mut engine =
            VaultKVSecretEngine::new("e", VaultKVSecretEngineSpec::default());
        assert!(!has_finalizer(&engine));

        add_finalizer(&mut engine);
        add_finalizer(&mut engine);
        assert!(has_finalizer(&engine));
        assert_eq!(engine.meta().finalizers.as_ref().unwrap().len(), 1);

        remove_finalizer(&mut engine);
        assert!(!has_finalizer(&engine));
    }
}
