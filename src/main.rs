//! # Heist Controller
//!
//! A Kubernetes operator that drives a HashiCorp Vault into the state
//! declared by cluster resources and materializes selected Vault data back
//! into native Secrets.
//!
//! ## Overview
//!
//! 1. **Managed bootstrap** - Ensures the operator-owned transit engine,
//!    encryption key, encrypt policy, kubernetes auth method and internal
//!    KV engine exist before any controller runs
//! 2. **Nine controllers** - One per resource kind, each with a single
//!    logical worker, sharing one Vault client and one cluster client
//! 3. **Admission webhooks** - Validating webhooks for the kinds carrying
//!    semantic rules
//! 4. **Probes and metrics** - `/healthz`, `/readyz` and Prometheus
//!    `/metrics` endpoints

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use heist_controller::controller::{self, Ctx};
use heist_controller::vault::mem::InMemoryVault;
use heist_controller::{admission, managed, observability, server, vault};
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Which Vault backend implementation to drive.
///
/// The production HTTP client ships as a separate collaborator crate and is
/// wired in by the deployment; the in-memory backend serves local
/// development and end-to-end smoke tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum VaultBackend {
    Memory,
}

#[derive(Debug, Parser)]
#[command(name = "heist-controller", about = "Vault secret-infrastructure operator")]
struct Options {
    /// Port for the metrics and probe HTTP server.
    #[arg(long, default_value_t = heist_controller::constants::DEFAULT_METRICS_PORT)]
    metrics_port: u16,

    /// Port for the admission webhook server.
    #[arg(long, default_value_t = heist_controller::constants::DEFAULT_WEBHOOK_PORT)]
    webhook_port: u16,

    /// Namespaces a VaultSyncSecret may target besides its own.
    #[arg(long = "sync-target-namespace")]
    sync_target_namespaces: Vec<String>,

    /// Vault backend implementation.
    #[arg(long, value_enum, default_value = "memory")]
    vault_backend: VaultBackend,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider was already installed");
    }

    let options = Options::parse();

    observability::metrics::register_metrics();

    let client = Client::try_default()
        .await
        .context("failed to create kubernetes client")?;

    let vault: Arc<dyn vault::Api> = match options.vault_backend {
        VaultBackend::Memory => {
            warn!("running with the in-memory vault backend; state is not persistent");
            Arc::new(InMemoryVault::new())
        }
    };

    managed::ensure_managed_components(vault.as_ref())
        .await
        .context("failed to bootstrap managed vault components")?;

    let ctx = Arc::new(Ctx {
        client,
        vault,
        sync_target_namespace_allow_list: options.sync_target_namespaces,
    });

    let state = server::ServerState::new();
    let probe_state = state.clone();
    tokio::spawn(async move {
        if let Err(error) = server::start_server(options.metrics_port, probe_state).await {
            warn!(%error, "metrics server stopped");
        }
    });

    tokio::spawn(async move {
        if let Err(error) = admission::serve(options.webhook_port).await {
            warn!(%error, "admission webhook server stopped");
        }
    });

    state.mark_ready();
    info!("starting controllers");

    // Per-kind loops run in parallel; each processes one reconcile at a
    // time. Leaves first is not required - the dependency graph converges
    // through waiting conditions and cross-watches.
    tokio::join!(
        controller::kv_engine::run(ctx.clone()),
        controller::transit_engine::run(ctx.clone()),
        controller::certificate_authority::run(ctx.clone()),
        controller::transit_key::run(ctx.clone()),
        controller::kv_secret::run(ctx.clone()),
        controller::certificate_role::run(ctx.clone()),
        controller::binding::run(ctx.clone()),
        controller::sync_secret::run(ctx.clone()),
        controller::client_config::run(ctx.clone()),
    );

    info!("all controllers stopped, shutting down");
    Ok(())
}
