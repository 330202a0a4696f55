//! # KV engines and secrets
//!
//! Typed configuration for KV v2 engine mounts and the secrets stored in
//! them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration block applied to a KV v2 engine mount.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct KvEngineConfig {
    /// Maximum number of secret versions to retain.
    pub max_versions: i32,

    /// Whether writes must carry a check-and-set version.
    pub cas_required: bool,

    /// Retention period for deleted versions; "0s" retains all versions.
    pub delete_version_after: String,
}

impl Default for KvEngineConfig {
    fn default() -> Self {
        Self {
            max_versions: crate::constants::DEFAULT_KV_MAX_VERSIONS,
            cas_required: true,
            delete_version_after: "0s".to_string(),
        }
    }
}

/// A KV secret: a path inside an engine plus a flat field map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct KvSecret {
    pub path: String,
    pub fields: BTreeMap<String, String>,
}

impl KvSecret {
    pub fn new(path: impl Into<String>, fields: BTreeMap<String, String>) -> Self {
        Self {
            path: path.into(),
            fields,
        }
    }
}
