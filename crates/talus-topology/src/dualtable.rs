//! Dual-routing-table topology for the through-hoststack scenario.
//!
//! Two loopback interfaces, one per table: table 0 (the default table)
//! and table 1 (created explicitly before anything binds to it). Each
//! interface carries one IPv4 address and anchors one isolation scope.
//! Cross-table reachability exists only while both reciprocal /32 host
//! routes are installed; each route resolves via a drop-to-lookup path
//! into the opposite table.

use std::net::Ipv4Addr;

use crate::control::{
    AppNamespace, ControlPlane, ControlPlaneError, HostRoute, IfIndex, RoutePath, TableId,
};

/// Identity of one isolation scope of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceSpec {
    pub id: String,
    pub secret: u64,
}

/// Parameters of the two-table topology: one address and one scope per
/// interface, slot 0 in table 0 and slot 1 in table 1.
#[derive(Debug, Clone)]
pub struct TopologySpec {
    pub addrs: [Ipv4Addr; 2],
    pub prefix_len: u8,
    pub namespaces: [NamespaceSpec; 2],
}

impl Default for TopologySpec {
    fn default() -> Self {
        TopologySpec {
            addrs: [Ipv4Addr::new(172, 16, 1, 1), Ipv4Addr::new(172, 16, 2, 1)],
            prefix_len: 24,
            namespaces: [
                NamespaceSpec {
                    id: "0".into(),
                    secret: 1234,
                },
                NamespaceSpec {
                    id: "1".into(),
                    secret: 5678,
                },
            ],
        }
    }
}

/// A provisioned two-table topology. Tear it down with [`Self::teardown`]
/// before the owning run concludes so no state leaks into the next one.
pub struct DualTableTopology {
    interfaces: [IfIndex; 2],
    spec: TopologySpec,
    routes_installed: bool,
}

impl DualTableTopology {
    /// Provision both interfaces, their tables, and the isolation scopes.
    ///
    /// Per interface, in order: create, admin-up, bind to its table
    /// (creating the table first for ids above 0), assign the address.
    /// Routes are not installed here; call [`Self::install_cross_routes`].
    pub fn provision(
        cp: &mut dyn ControlPlane,
        spec: TopologySpec,
    ) -> Result<Self, ControlPlaneError> {
        let mut interfaces = [0; 2];
        for slot in 0..2usize {
            let table = slot as TableId;
            let sw_if_index = cp.create_loopback()?;
            cp.set_interface_flags(sw_if_index, true)?;
            if table != 0 {
                cp.ip_table_add_del(table, true)?;
            }
            cp.set_interface_table(sw_if_index, table)?;
            cp.interface_address_add_del(sw_if_index, spec.addrs[slot], spec.prefix_len, true)?;
            interfaces[slot] = sw_if_index;

            tracing::info!(
                sw_if_index,
                table,
                addr = %spec.addrs[slot],
                "loopback provisioned"
            );
        }

        for slot in 0..2usize {
            let ns = &spec.namespaces[slot];
            cp.app_namespace_add(&AppNamespace {
                id: ns.id.clone(),
                secret: ns.secret,
                sw_if_index: interfaces[slot],
            })?;
        }

        Ok(DualTableTopology {
            interfaces,
            spec,
            routes_installed: false,
        })
    }

    /// The two reciprocal /32 routes joining the tables: each table learns
    /// the opposite loopback via a lookup in the opposite table.
    fn cross_routes(&self) -> [HostRoute; 2] {
        [
            HostRoute::host(0, self.spec.addrs[1], RoutePath::via_table(1)),
            HostRoute::host(1, self.spec.addrs[0], RoutePath::via_table(0)),
        ]
    }

    pub fn install_cross_routes(
        &mut self,
        cp: &mut dyn ControlPlane,
    ) -> Result<(), ControlPlaneError> {
        for route in self.cross_routes() {
            cp.ip_route_add_del(&route, true)?;
        }
        self.routes_installed = true;
        tracing::info!("reciprocal cross-table routes installed");
        Ok(())
    }

    pub fn remove_cross_routes(
        &mut self,
        cp: &mut dyn ControlPlane,
    ) -> Result<(), ControlPlaneError> {
        for route in self.cross_routes() {
            cp.ip_route_add_del(&route, false)?;
        }
        self.routes_installed = false;
        Ok(())
    }

    /// Address of the table-0 loopback — what a cross-table client dials.
    pub fn table0_addr(&self) -> Ipv4Addr {
        self.spec.addrs[0]
    }

    pub fn table1_addr(&self) -> Ipv4Addr {
        self.spec.addrs[1]
    }

    pub fn namespaces(&self) -> &[NamespaceSpec; 2] {
        &self.spec.namespaces
    }

    pub fn interfaces(&self) -> [IfIndex; 2] {
        self.interfaces
    }

    /// Unwind everything this topology configured, in strict reverse
    /// order: routes, then per interface (highest table first) address,
    /// table binding, admin state, then table 1 itself, then the
    /// interfaces. Must run before the owning run concludes, pass or
    /// fail.
    pub fn teardown(mut self, cp: &mut dyn ControlPlane) -> Result<(), ControlPlaneError> {
        if self.routes_installed {
            self.remove_cross_routes(cp)?;
        }
        for slot in (0..2usize).rev() {
            let sw_if_index = self.interfaces[slot];
            cp.interface_address_add_del(
                sw_if_index,
                self.spec.addrs[slot],
                self.spec.prefix_len,
                false,
            )?;
            cp.set_interface_table(sw_if_index, 0)?;
            cp.set_interface_flags(sw_if_index, false)?;
        }
        cp.ip_table_add_del(1, false)?;
        for slot in (0..2usize).rev() {
            cp.delete_loopback(self.interfaces[slot])?;
        }
        tracing::info!("dual-table topology torn down");
        Ok(())
    }
}
