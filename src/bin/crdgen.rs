//! # CRD Generator
//!
//! Prints the CustomResourceDefinition manifests for all nine kinds to
//! stdout, separated by YAML document markers.

use heist_controller::crd::{
    VaultBinding, VaultCertificateAuthority, VaultCertificateRole, VaultClientConfig,
    VaultKVSecret, VaultKVSecretEngine, VaultSyncSecret, VaultTransitEngine, VaultTransitKey,
};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let crds = [
        VaultKVSecretEngine::crd(),
        VaultTransitEngine::crd(),
        VaultCertificateAuthority::crd(),
        VaultTransitKey::crd(),
        VaultKVSecret::crd(),
        VaultCertificateRole::crd(),
        VaultBinding::crd(),
        VaultSyncSecret::crd(),
        VaultClientConfig::crd(),
    ];

    for crd in crds {
        println!("---");
        print!("{}", serde_yaml::to_string(&crd)?);
    }

    Ok(())
}
