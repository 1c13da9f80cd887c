//! Prometheus metrics registry and HTTP exposition, behind the `metrics`
//! feature. Unwired into instrumentation call sites so far; the registry and
//! `/metrics` server stand on their own as ambient observability surface.

pub mod registry;
pub mod server;

pub use registry::Metrics;
