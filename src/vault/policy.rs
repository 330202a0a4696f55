//! # Policies
//!
//! Typed Vault policies and their HCL rendering. Policies are the unit of
//! authorization handed to kubernetes-auth roles; every managed resource
//! emits policies under deterministic names.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// A single Vault capability on a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Create,
    Read,
    Update,
    Delete,
    List,
    Sudo,
    Deny,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Create => "create",
            Capability::Read => "read",
            Capability::Update => "update",
            Capability::Delete => "delete",
            Capability::List => "list",
            Capability::Sudo => "sudo",
            Capability::Deny => "deny",
        }
    }
}

/// A path rule inside a policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rule {
    pub path: String,
    pub capabilities: Vec<Capability>,
}

impl Rule {
    pub fn new(path: impl Into<String>, capabilities: Vec<Capability>) -> Self {
        Self {
            path: path.into(),
            capabilities,
        }
    }

    /// Shorthand for a single-capability read rule.
    pub fn read(path: impl Into<String>) -> Self {
        Self::new(path, vec![Capability::Read])
    }

    /// Shorthand for a single-capability update rule.
    pub fn update(path: impl Into<String>) -> Self {
        Self::new(path, vec![Capability::Update])
    }
}

/// A named set of path rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Policy {
    pub name: String,
    pub rules: Vec<Rule>,
}

impl Policy {
    pub fn new(name: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            name: name.into(),
            rules,
        }
    }

    /// Render the policy document as HCL, the format the Vault policy API
    /// expects.
    pub fn to_hcl(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            let capabilities = rule
                .capabilities
                .iter()
                .map(|c| format!("\"{}\"", c.as_str()))
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(out, "path \"{}\" {{", rule.path);
            let _ = writeln!(out, "  capabilities = [{capabilities}]");
            let _ = writeln!(out, "}}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_single_rule_hcl() {
        let policy = Policy::new("managed.kv.ns.s", vec![Rule::read("managed/kv/ns/e/data/s")]);
        let hcl = policy.to_hcl();
        assert_eq!(
            hcl,
            "path \"managed/kv/ns/e/data/s\" {\n  capabilities = [\"read\"]\n}\n"
        );
    }

    #[test]
    fn renders_multiple_rules_and_capabilities() {
        let policy = Policy::new(
            "example",
            vec![
                Rule::new("a", vec![Capability::Read, Capability::List]),
                Rule::update("b"),
            ],
        );
        let hcl = policy.to_hcl();
        assert!(hcl.contains("path \"a\" {\n  capabilities = [\"read\", \"list\"]\n}"));
        assert!(hcl.contains("path \"b\" {\n  capabilities = [\"update\"]\n}"));
    }
}
