//! # Observability
//!
//! Prometheus metrics exposed through the probe server.

pub mod metrics;
