//! # Custom Resource Definitions
//!
//! CRD types for all nine resource kinds in the `heist.youniqx.com` group,
//! plus the condition vocabulary, duration strings, and the encrypted value
//! format shared between them.

pub mod binding;
pub mod certificate_authority;
pub mod certificate_role;
pub mod client_config;
pub mod conditions;
pub mod duration;
pub mod encrypted_value;
pub mod kv_engine;
pub mod kv_secret;
pub mod sync_secret;
pub mod transit_engine;
pub mod transit_key;

pub use binding::{
    BindingCapability, CertificateAuthorityCapability, CertificateCapability,
    CertificateFieldType, CertificateTemplate, KvCapability, TransitKeyCapability, VaultBinding,
    VaultBindingAgentConfig, VaultBindingCertificate, VaultBindingCertificateAuthority,
    VaultBindingKV, VaultBindingSpec, VaultBindingStatus, VaultBindingSubject,
    VaultBindingTransitKey, VaultBindingValueTemplate,
};
pub use certificate_authority::{
    VaultCertificateAuthority, VaultCertificateAuthorityImport, VaultCertificateAuthoritySettings,
    VaultCertificateAuthoritySpec, VaultCertificateAuthorityStatus,
    VaultCertificateAuthoritySubject, VaultCertificateAuthorityTuning,
};
pub use certificate_role::{
    VaultCertificateRole, VaultCertificateRoleSettings, VaultCertificateRoleSpec,
    VaultCertificateRoleStatus, VaultCertificateRoleSubject,
};
pub use client_config::{
    VaultCertificateAuthorityKVSecretRef, VaultCertificateAuthorityRef, VaultCertificateRef,
    VaultClientConfig, VaultClientConfigSpec, VaultClientConfigStatus, VaultKVSecretRef,
    VaultTransitKeyRef,
};
pub use conditions::Condition;
pub use duration::DurationString;
pub use encrypted_value::EncryptedValue;
pub use kv_engine::{VaultKVSecretEngine, VaultKVSecretEngineSpec, VaultKVSecretEngineStatus};
pub use kv_secret::{VaultKVSecret, VaultKVSecretField, VaultKVSecretSpec, VaultKVSecretStatus};
pub use sync_secret::{
    VaultSyncCertificateAuthoritySource, VaultSyncCertificateSource, VaultSyncKVSecretSource,
    VaultSyncSecret, VaultSyncSecretSource, VaultSyncSecretSpec, VaultSyncSecretStatus,
    VaultSyncSecretTarget,
};
pub use transit_engine::{VaultTransitEngine, VaultTransitEngineSpec, VaultTransitEngineStatus};
pub use transit_key::{VaultTransitKey, VaultTransitKeySpec, VaultTransitKeyStatus};
