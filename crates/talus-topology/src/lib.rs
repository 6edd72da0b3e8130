//! Routing-domain topology management for talus conformance runs.
//!
//! - **control** — the dataplane control-plane seam (trait + operation types)
//! - **dualtable** — two isolated routing tables joined by reciprocal host routes
//! - **mem** — in-process control plane for tests and local runs

pub mod control;
pub mod dualtable;
pub mod mem;

pub use control::{AppNamespace, ControlPlane, ControlPlaneError, HostRoute, RoutePath};
pub use dualtable::{DualTableTopology, NamespaceSpec, TopologySpec};
pub use mem::MemControlPlane;
