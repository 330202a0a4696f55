//! # Admission webhooks
//!
//! Validating webhook server for the kinds carrying semantic rules. Routes
//! follow the `/validate-<group>-<version>-<kind>` convention; kinds with
//! structural-only validation register no route.

pub mod validate;

use crate::crd::{VaultCertificateAuthority, VaultKVSecret, VaultKVSecretEngine};
use axum::routing::post;
use axum::{Json, Router};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use tracing::{info, warn};

fn to_validate_operation(operation: &Operation) -> Option<validate::Operation> {
    match operation {
        Operation::Create => Some(validate::Operation::Create),
        Operation::Update => Some(validate::Operation::Update),
        Operation::Delete => Some(validate::Operation::Delete),
        Operation::Connect => None,
    }
}

/// Run a per-kind validator against an admission review.
fn handle_review<K>(
    review: AdmissionReview<K>,
    validator: impl Fn(validate::Operation, Option<&K>, Option<&K>) -> Result<(), String>,
) -> AdmissionReview<DynamicObject>
where
    K: Resource + DeserializeOwned + Debug + Clone,
{
    let request: AdmissionRequest<K> = match review.try_into() {
        Ok(request) => request,
        Err(error) => {
            warn!(%error, "malformed admission review");
            return AdmissionResponse::invalid(error.to_string()).into_review();
        }
    };

    let mut response = AdmissionResponse::from(&request);

    if let Some(operation) = to_validate_operation(&request.operation) {
        if let Err(reason) = validator(
            operation,
            request.object.as_ref(),
            request.old_object.as_ref(),
        ) {
            info!(reason, "rejecting admission request");
            response = response.deny(reason);
        }
    }

    response.into_review()
}

async fn validate_kv_engine(
    Json(body): Json<AdmissionReview<VaultKVSecretEngine>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(handle_review(body, |operation, object, old_object| {
        validate::validate_kv_engine(operation, object, old_object)
    }))
}

async fn validate_kv_secret(
    Json(body): Json<AdmissionReview<VaultKVSecret>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(handle_review(body, |operation, object, old_object| {
        validate::validate_kv_secret(operation, object, old_object)
    }))
}

async fn validate_certificate_authority(
    Json(body): Json<AdmissionReview<VaultCertificateAuthority>>,
) -> Json<AdmissionReview<DynamicObject>> {
    Json(handle_review(body, |operation, object, old_object| {
        validate::validate_certificate_authority(operation, object, old_object)
    }))
}

/// The webhook router. TLS termination is expected in front of the
/// listener (service mesh or kube-side caBundle secret mount).
pub fn router() -> Router {
    Router::new()
        .route(
            "/validate-heist-youniqx-com-v1alpha1-vaultkvsecretengine",
            post(validate_kv_engine),
        )
        .route(
            "/validate-heist-youniqx-com-v1alpha1-vaultkvsecret",
            post(validate_kv_secret),
        )
        .route(
            "/validate-heist-youniqx-com-v1alpha1-vaultcertificateauthority",
            post(validate_certificate_authority),
        )
}

/// Serve the webhook until the process is terminated.
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "admission webhook listening");
    axum::serve(listener, router()).await?;
    Ok(())
}
