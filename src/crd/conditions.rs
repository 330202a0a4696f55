//! # Conditions
//!
//! Status condition types and helpers shared by all nine resource kinds.
//!
//! Every kind carries a `Provisioned` condition; `VaultBinding` additionally
//! carries `Active`. Reasons are drawn from a fixed vocabulary so that
//! consumers can match on them programmatically.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition type set by every controller once the spec is satisfied in Vault.
pub const TYPE_PROVISIONED: &str = "Provisioned";

/// Condition type describing which of several rival bindings is in effect.
pub const TYPE_ACTIVE: &str = "Active";

pub const REASON_PROVISIONED: &str = "provisioned";
pub const REASON_TERMINATING: &str = "terminating";
pub const REASON_ERROR_VAULT: &str = "vault_error";
pub const REASON_INITIALIZING: &str = "initializing";
pub const REASON_ERROR_CONFIG: &str = "config_error";
pub const REASON_ERROR_KUBERNETES: &str = "kubernetes_error";
pub const REASON_WAITING: &str = "waiting";
pub const REASON_INACTIVE: &str = "inactive";
pub const REASON_RIVAL_ACTIVE: &str = "rival_active";
pub const REASON_ACTIVE: &str = "active";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

/// A single observation of a resource's state.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

/// Set or update a condition in place.
///
/// The transition timestamp only changes when the condition status actually
/// flips, matching the apimachinery meta helpers this mirrors.
pub fn set_condition(
    conditions: &mut Vec<Condition>,
    r#type: &str,
    status: &str,
    reason: &str,
    message: &str,
) {
    let now = Utc::now().to_rfc3339();
    match conditions.iter_mut().find(|c| c.r#type == r#type) {
        Some(existing) => {
            if existing.status != status {
                existing.last_transition_time = Some(now);
            }
            existing.status = status.to_string();
            existing.reason = reason.to_string();
            existing.message = message.to_string();
        }
        None => conditions.push(Condition {
            r#type: r#type.to_string(),
            status: status.to_string(),
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: Some(now),
            observed_generation: None,
        }),
    }
}

pub fn find_condition<'a>(conditions: &'a [Condition], r#type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == r#type)
}

/// True when the condition exists and its status is `False`.
///
/// A missing condition is treated as not-false, mirroring the apimachinery
/// semantics the original controllers rely on for dependency gating.
pub fn is_condition_false(conditions: &[Condition], r#type: &str) -> bool {
    find_condition(conditions, r#type).is_some_and(|c| c.status == STATUS_FALSE)
}

pub fn is_condition_true(conditions: &[Condition], r#type: &str) -> bool {
    find_condition(conditions, r#type).is_some_and(|c| c.status == STATUS_TRUE)
}

/// Seed the default `Provisioned=False/initializing` condition if missing.
pub fn set_default_provisioned_condition(conditions: &mut Vec<Condition>) {
    if find_condition(conditions, TYPE_PROVISIONED).is_none() {
        set_condition(
            conditions,
            TYPE_PROVISIONED,
            STATUS_FALSE,
            REASON_INITIALIZING,
            "provisioning is about to start",
        );
    }
}
