//! Heist Controller Library
//!
//! A Kubernetes operator that projects declarative secret-infrastructure
//! resources onto a HashiCorp Vault backend: secret engines, transit keys,
//! certificate authorities, certificate roles, encrypted KV secrets,
//! authorization bindings, and native-Secret materialization.
//!
//! Nine controllers cooperate, each owning one resource kind and observing
//! its dependencies. All share one Vault client (the [`vault::Api`] trait)
//! and one cluster client.

pub mod admission;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod managed;
pub mod names;
pub mod observability;
pub mod server;
pub mod vault;

#[cfg(test)]
pub mod testutil;
