//! # Test support
//!
//! Helpers for exercising reconcilers against the in-memory Vault without a
//! running cluster.

use crate::controller::Ctx;
use crate::vault;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::sync::Arc;

/// A kube client whose every request fails. Vault-only code paths never
/// touch it; a test reaching the cluster by accident fails loudly instead
/// of hanging.
pub fn disconnected_client() -> kube::Client {
    let service = tower::service_fn(|_request: http::Request<kube::client::Body>| async {
        Err::<http::Response<kube::client::Body>, std::io::Error>(std::io::Error::other(
            "no cluster available in tests",
        ))
    });
    kube::Client::new(service, "default")
}

/// A context whose cluster client is disconnected; only the Vault half is
/// usable.
pub fn vault_only_ctx(vault: Arc<dyn vault::Api>) -> Ctx {
    Ctx {
        client: disconnected_client(),
        vault,
        sync_target_namespace_allow_list: Vec::new(),
    }
}

/// A context with a namespace allow-list for sync-secret tests.
pub fn vault_only_ctx_with_allow_list(
    vault: Arc<dyn vault::Api>,
    allow_list: Vec<String>,
) -> Ctx {
    Ctx {
        client: disconnected_client(),
        vault,
        sync_target_namespace_allow_list: allow_list,
    }
}

/// The current time as a Kubernetes API timestamp.
pub fn now() -> Time {
    Time(chrono::Utc::now())
}
