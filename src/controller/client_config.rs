//! # VaultClientConfig controller
//!
//! Passive resource: the Binding controller is its sole writer, agents its
//! consumers. Reconciliation is a no-op watch kept so the kind shows up in
//! the controller fan-out and its events are observable.

use super::{error_policy, Ctx, Error};
use crate::crd::VaultClientConfig;
use futures::StreamExt;
use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::debug;

pub async fn reconcile(obj: Arc<VaultClientConfig>, _ctx: Arc<Ctx>) -> Result<Action, Error> {
    debug!(
        name = %obj.name_any(),
        namespace = %obj.namespace().unwrap_or_default(),
        "observed client config"
    );
    Ok(Action::await_change())
}

pub async fn run(ctx: Arc<Ctx>) {
    let api = Api::<VaultClientConfig>::all(ctx.client.clone());

    Controller::new(api, watcher::Config::default())
        .with_config(kube_runtime::controller::Config::default().concurrency(1))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move { super::log_reconcile_result(result) })
        .await;
}
