//! # Kubernetes auth entities
//!
//! Roles on the kubernetes auth method bind workload identities to policy
//! sets.

use serde::{Deserialize, Serialize};

/// A role on the kubernetes auth method.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthRole {
    pub name: String,
    pub policies: Vec<String>,
    pub bound_namespaces: Vec<String>,
    pub bound_service_accounts: Vec<String>,
}
