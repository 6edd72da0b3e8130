//! The dataplane control-plane seam.
//!
//! The harness never speaks the control-plane wire format itself; it
//! drives this trait. The production implementation binds to the talus
//! control-plane API, tests use [`crate::mem::MemControlPlane`].

use std::net::Ipv4Addr;

use thiserror::Error;

pub type IfIndex = u32;
pub type TableId = u32;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("interface {0} does not exist")]
    NoSuchInterface(IfIndex),
    #[error("routing table {0} does not exist")]
    NoSuchTable(TableId),
    #[error("no such route: {dest}/{prefix_len} in table {table}")]
    NoSuchRoute {
        table: TableId,
        dest: Ipv4Addr,
        prefix_len: u8,
    },
    #[error("routing table {0} is still referenced and cannot be deleted")]
    TableInUse(TableId),
    #[error("control plane request failed: {0}")]
    Backend(String),
}

/// Forwarding path of a route.
///
/// A next hop of `0.0.0.0` with no attachment interface defers resolution
/// to a fresh lookup in `nh_table` (a drop-to-lookup path) — the mechanism
/// that joins two otherwise isolated tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePath {
    pub next_hop: Ipv4Addr,
    pub sw_if_index: Option<IfIndex>,
    pub nh_table: TableId,
}

impl RoutePath {
    /// Path that resolves by re-looking the destination up in `table`.
    pub fn via_table(table: TableId) -> Self {
        RoutePath {
            next_hop: Ipv4Addr::UNSPECIFIED,
            sw_if_index: None,
            nh_table: table,
        }
    }

    /// True when this path defers to a lookup in another table instead of
    /// naming a resolved next hop.
    pub fn is_lookup(&self) -> bool {
        self.next_hop == Ipv4Addr::UNSPECIFIED && self.sw_if_index.is_none()
    }
}

/// One IPv4 route in a routing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRoute {
    pub table: TableId,
    pub dest: Ipv4Addr,
    pub prefix_len: u8,
    pub path: RoutePath,
}

impl HostRoute {
    /// /32 route to a single host.
    pub fn host(table: TableId, dest: Ipv4Addr, path: RoutePath) -> Self {
        HostRoute {
            table,
            dest,
            prefix_len: 32,
            path,
        }
    }
}

/// An application isolation scope bound to one interface. Peers present
/// the scope's id and secret to attach through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppNamespace {
    pub id: String,
    pub secret: u64,
    pub sw_if_index: IfIndex,
}

/// Dataplane control operations the harness depends on.
pub trait ControlPlane {
    /// Toggle the session layer.
    fn session_enable_disable(&mut self, enable: bool) -> Result<(), ControlPlaneError>;

    /// Create a loopback interface; returns its interface index.
    fn create_loopback(&mut self) -> Result<IfIndex, ControlPlaneError>;

    fn delete_loopback(&mut self, sw_if_index: IfIndex) -> Result<(), ControlPlaneError>;

    /// Create (`add = true`) or delete a routing table. Table 0 is the
    /// default table: it always exists and is never created or deleted.
    fn ip_table_add_del(&mut self, table: TableId, add: bool) -> Result<(), ControlPlaneError>;

    fn set_interface_flags(
        &mut self,
        sw_if_index: IfIndex,
        admin_up: bool,
    ) -> Result<(), ControlPlaneError>;

    /// Bind an interface to a routing table. The table must exist.
    fn set_interface_table(
        &mut self,
        sw_if_index: IfIndex,
        table: TableId,
    ) -> Result<(), ControlPlaneError>;

    fn interface_address_add_del(
        &mut self,
        sw_if_index: IfIndex,
        addr: Ipv4Addr,
        prefix_len: u8,
        add: bool,
    ) -> Result<(), ControlPlaneError>;

    fn ip_route_add_del(&mut self, route: &HostRoute, add: bool) -> Result<(), ControlPlaneError>;

    /// Register an isolation scope. Re-adding an existing id rebinds it.
    fn app_namespace_add(&mut self, ns: &AppNamespace) -> Result<(), ControlPlaneError>;
}
