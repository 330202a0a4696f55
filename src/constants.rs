//! # Constants
//!
//! Shared constants used throughout the controller.

/// Finalizer attached to every managed resource. Attached before the first
/// Vault mutation, detached only once all Vault artifacts are gone.
pub const FINALIZER: &str = "youniqx.com/finalizer";

/// Annotation stamped on native Secrets owned by a VaultSyncSecret.
pub const SYNC_FROM_ANNOTATION: &str = "heist.youniqx.com/sync-from";

/// Deprecated ownership annotation. Recognized on read, never written.
pub const DEPRECATED_SYNC_FROM_ANNOTATION: &str = "youniqx.com/sync-from";

/// Requeue interval after a non-terminal reconciliation error (seconds).
pub const ERROR_REQUEUE_SECS: u64 = 60;

/// Mount path of the KV engine holding internal controller data
/// (CA certificates, chains and private keys).
pub const INTERNAL_KV_ENGINE_PATH: &str = "managed/_heist_internal";

/// Mount path of the operator-owned transit engine used to encrypt
/// user-supplied secret fields.
pub const MANAGED_TRANSIT_ENGINE_PATH: &str = "managed/transit";

/// Name of the operator-owned transit key inside the managed transit engine.
pub const MANAGED_TRANSIT_KEY_NAME: &str = "encryption-key";

/// Name of the singleton policy granting encrypt access to the managed
/// transit key.
pub const MANAGED_ENCRYPT_POLICY_NAME: &str = "managed.encrypt";

/// Mount path of the kubernetes auth method used by workload identities.
pub const KUBERNETES_AUTH_PATH: &str = "managed/kubernetes";

/// Default maximum number of retained secret versions for KV engines.
pub const DEFAULT_KV_MAX_VERSIONS: i32 = 10;

/// Default HTTP server port for metrics and health probes.
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server port for the admission webhook.
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;

/// Default file mode for agent template output files.
pub const DEFAULT_TEMPLATE_MODE: &str = "0640";

// Field names used in the internal KV secrets holding CA material.
pub const CA_PRIVATE_KEY_FIELD: &str = "private_key";
pub const CA_PRIVATE_KEY_TYPE_FIELD: &str = "private_key_type";
pub const CA_CERTIFICATE_FIELD: &str = "certificate";
pub const CA_CERTIFICATE_CHAIN_FIELD: &str = "certificate_chain";
pub const CA_CERTIFICATE_FULL_CHAIN_FIELD: &str = "full_certificate_chain";
pub const CA_ISSUER_FIELD: &str = "issuer";
pub const CA_SERIAL_NUMBER_FIELD: &str = "serial_number";
