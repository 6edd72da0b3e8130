//! In-process control plane for tests and local runs.
//!
//! Records the same state a real dataplane would hold and validates the
//! ordering rules the configurator must respect (tables exist before
//! anything binds to them, nothing referenced gets deleted). It can also
//! answer reachability questions over its own forwarding state, which
//! makes the reciprocal-route invariant testable without a dataplane.

use std::collections::{BTreeMap, BTreeSet};
use std::net::Ipv4Addr;

use crate::control::{
    AppNamespace, ControlPlane, ControlPlaneError, HostRoute, IfIndex, TableId,
};

#[derive(Debug, Clone)]
struct IfState {
    admin_up: bool,
    table: TableId,
    addr: Option<(Ipv4Addr, u8)>,
}

#[derive(Debug)]
pub struct MemControlPlane {
    session_enabled: bool,
    next_if_index: IfIndex,
    interfaces: BTreeMap<IfIndex, IfState>,
    tables: BTreeSet<TableId>,
    routes: Vec<HostRoute>,
    namespaces: BTreeMap<String, AppNamespace>,
}

/// Lookup chains longer than this are treated as loops.
const MAX_LOOKUP_DEPTH: u8 = 4;

impl MemControlPlane {
    pub fn new() -> Self {
        MemControlPlane {
            session_enabled: false,
            next_if_index: 1,
            interfaces: BTreeMap::new(),
            tables: BTreeSet::from([0]),
            routes: Vec::new(),
            namespaces: BTreeMap::new(),
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn session_enabled(&self) -> bool {
        self.session_enabled
    }

    pub fn interface_count(&self) -> usize {
        self.interfaces.len()
    }

    pub fn table_exists(&self, table: TableId) -> bool {
        self.tables.contains(&table)
    }

    pub fn interface_table(&self, sw_if_index: IfIndex) -> Option<TableId> {
        self.interfaces.get(&sw_if_index).map(|i| i.table)
    }

    pub fn namespace(&self, id: &str) -> Option<&AppNamespace> {
        self.namespaces.get(id)
    }

    /// Routing table a namespace's peers resolve against, via the scope's
    /// attachment interface.
    pub fn namespace_table(&self, id: &str) -> Option<TableId> {
        let ns = self.namespaces.get(id)?;
        self.interface_table(ns.sw_if_index)
    }

    pub fn routes_in(&self, table: TableId) -> Vec<&HostRoute> {
        self.routes.iter().filter(|r| r.table == table).collect()
    }

    // ── Reachability ────────────────────────────────────────────────

    /// Resolve whether `dest` is reachable from `table`, following
    /// connected subnets of admin-up interfaces and drop-to-lookup host
    /// routes into other tables.
    pub fn can_reach(&self, table: TableId, dest: Ipv4Addr) -> bool {
        self.reach(table, dest, 0)
    }

    /// A bidirectional session needs each side to route to the other:
    /// the forward path and the return path resolve independently.
    pub fn session_viable(
        &self,
        client_table: TableId,
        client_addr: Ipv4Addr,
        server_table: TableId,
        server_addr: Ipv4Addr,
    ) -> bool {
        self.can_reach(client_table, server_addr) && self.can_reach(server_table, client_addr)
    }

    fn reach(&self, table: TableId, dest: Ipv4Addr, depth: u8) -> bool {
        if depth > MAX_LOOKUP_DEPTH {
            return false;
        }
        for ifs in self.interfaces.values() {
            if ifs.table == table && ifs.admin_up {
                if let Some((addr, prefix_len)) = ifs.addr {
                    if same_subnet(addr, dest, prefix_len) {
                        return true;
                    }
                }
            }
        }
        for route in &self.routes {
            if route.table == table && same_subnet(route.dest, dest, route.prefix_len) {
                if route.path.is_lookup() {
                    return self.reach(route.path.nh_table, dest, depth + 1);
                }
                return true;
            }
        }
        false
    }

    fn interface_mut(&mut self, sw_if_index: IfIndex) -> Result<&mut IfState, ControlPlaneError> {
        self.interfaces
            .get_mut(&sw_if_index)
            .ok_or(ControlPlaneError::NoSuchInterface(sw_if_index))
    }
}

impl Default for MemControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlPlane for MemControlPlane {
    fn session_enable_disable(&mut self, enable: bool) -> Result<(), ControlPlaneError> {
        tracing::debug!(enable, "session layer toggled");
        self.session_enabled = enable;
        Ok(())
    }

    fn create_loopback(&mut self) -> Result<IfIndex, ControlPlaneError> {
        let sw_if_index = self.next_if_index;
        self.next_if_index += 1;
        self.interfaces.insert(
            sw_if_index,
            IfState {
                admin_up: false,
                table: 0,
                addr: None,
            },
        );
        Ok(sw_if_index)
    }

    fn delete_loopback(&mut self, sw_if_index: IfIndex) -> Result<(), ControlPlaneError> {
        if self.interfaces.remove(&sw_if_index).is_none() {
            return Err(ControlPlaneError::NoSuchInterface(sw_if_index));
        }
        // Scopes die with their attachment interface.
        self.namespaces.retain(|_, ns| ns.sw_if_index != sw_if_index);
        Ok(())
    }

    fn ip_table_add_del(&mut self, table: TableId, add: bool) -> Result<(), ControlPlaneError> {
        if table == 0 {
            return Err(ControlPlaneError::Backend(
                "table 0 is the default table".into(),
            ));
        }
        if add {
            self.tables.insert(table);
            return Ok(());
        }
        if !self.tables.contains(&table) {
            return Err(ControlPlaneError::NoSuchTable(table));
        }
        let referenced = self.interfaces.values().any(|i| i.table == table)
            || self
                .routes
                .iter()
                .any(|r| r.table == table || r.path.nh_table == table);
        if referenced {
            return Err(ControlPlaneError::TableInUse(table));
        }
        self.tables.remove(&table);
        Ok(())
    }

    fn set_interface_flags(
        &mut self,
        sw_if_index: IfIndex,
        admin_up: bool,
    ) -> Result<(), ControlPlaneError> {
        self.interface_mut(sw_if_index)?.admin_up = admin_up;
        Ok(())
    }

    fn set_interface_table(
        &mut self,
        sw_if_index: IfIndex,
        table: TableId,
    ) -> Result<(), ControlPlaneError> {
        if !self.tables.contains(&table) {
            return Err(ControlPlaneError::NoSuchTable(table));
        }
        self.interface_mut(sw_if_index)?.table = table;
        Ok(())
    }

    fn interface_address_add_del(
        &mut self,
        sw_if_index: IfIndex,
        addr: Ipv4Addr,
        prefix_len: u8,
        add: bool,
    ) -> Result<(), ControlPlaneError> {
        let ifs = self.interface_mut(sw_if_index)?;
        if add {
            ifs.addr = Some((addr, prefix_len));
            return Ok(());
        }
        if ifs.addr != Some((addr, prefix_len)) {
            return Err(ControlPlaneError::Backend(format!(
                "address {addr}/{prefix_len} is not configured on interface {sw_if_index}"
            )));
        }
        ifs.addr = None;
        Ok(())
    }

    fn ip_route_add_del(&mut self, route: &HostRoute, add: bool) -> Result<(), ControlPlaneError> {
        if !self.tables.contains(&route.table) {
            return Err(ControlPlaneError::NoSuchTable(route.table));
        }
        if route.path.is_lookup() && !self.tables.contains(&route.path.nh_table) {
            return Err(ControlPlaneError::NoSuchTable(route.path.nh_table));
        }
        let key = |r: &HostRoute| (r.table, r.dest, r.prefix_len);
        if add {
            if self.routes.iter().any(|r| key(r) == key(route)) {
                return Err(ControlPlaneError::Backend(format!(
                    "route {}/{} already present in table {}",
                    route.dest, route.prefix_len, route.table
                )));
            }
            self.routes.push(route.clone());
            return Ok(());
        }
        let before = self.routes.len();
        self.routes.retain(|r| key(r) != key(route));
        if self.routes.len() == before {
            return Err(ControlPlaneError::NoSuchRoute {
                table: route.table,
                dest: route.dest,
                prefix_len: route.prefix_len,
            });
        }
        Ok(())
    }

    fn app_namespace_add(&mut self, ns: &AppNamespace) -> Result<(), ControlPlaneError> {
        if !self.interfaces.contains_key(&ns.sw_if_index) {
            return Err(ControlPlaneError::NoSuchInterface(ns.sw_if_index));
        }
        self.namespaces.insert(ns.id.clone(), ns.clone());
        Ok(())
    }
}

fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, prefix_len: u8) -> bool {
    if prefix_len == 0 {
        return true;
    }
    let mask = u32::MAX << (32 - u32::from(prefix_len.min(32)));
    (u32::from(a) & mask) == (u32::from(b) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RoutePath;

    fn two_table_setup(cp: &mut MemControlPlane) -> (IfIndex, IfIndex) {
        let if0 = cp.create_loopback().unwrap();
        let if1 = cp.create_loopback().unwrap();
        cp.set_interface_flags(if0, true).unwrap();
        cp.set_interface_flags(if1, true).unwrap();
        cp.ip_table_add_del(1, true).unwrap();
        cp.set_interface_table(if1, 1).unwrap();
        cp.interface_address_add_del(if0, Ipv4Addr::new(172, 16, 1, 1), 24, true)
            .unwrap();
        cp.interface_address_add_del(if1, Ipv4Addr::new(172, 16, 2, 1), 24, true)
            .unwrap();
        (if0, if1)
    }

    #[test]
    fn binding_to_a_missing_table_is_rejected() {
        let mut cp = MemControlPlane::new();
        let if0 = cp.create_loopback().unwrap();
        match cp.set_interface_table(if0, 7) {
            Err(ControlPlaneError::NoSuchTable(7)) => {}
            other => panic!("expected NoSuchTable, got {:?}", other),
        }
    }

    #[test]
    fn a_referenced_table_cannot_be_deleted() {
        let mut cp = MemControlPlane::new();
        let (_, if1) = two_table_setup(&mut cp);
        assert!(matches!(
            cp.ip_table_add_del(1, false),
            Err(ControlPlaneError::TableInUse(1))
        ));
        cp.interface_address_add_del(if1, Ipv4Addr::new(172, 16, 2, 1), 24, false)
            .unwrap();
        cp.set_interface_table(if1, 0).unwrap();
        cp.ip_table_add_del(1, false).unwrap();
    }

    #[test]
    fn connected_subnets_are_reachable_only_within_their_table() {
        let mut cp = MemControlPlane::new();
        two_table_setup(&mut cp);
        assert!(cp.can_reach(0, Ipv4Addr::new(172, 16, 1, 1)));
        assert!(cp.can_reach(1, Ipv4Addr::new(172, 16, 2, 1)));
        assert!(!cp.can_reach(1, Ipv4Addr::new(172, 16, 1, 1)));
        assert!(!cp.can_reach(0, Ipv4Addr::new(172, 16, 2, 1)));
    }

    #[test]
    fn session_needs_both_reciprocal_routes() {
        let mut cp = MemControlPlane::new();
        two_table_setup(&mut cp);
        let loop0 = Ipv4Addr::new(172, 16, 1, 1);
        let loop1 = Ipv4Addr::new(172, 16, 2, 1);
        let forward = HostRoute::host(1, loop0, RoutePath::via_table(0));
        let reverse = HostRoute::host(0, loop1, RoutePath::via_table(1));

        cp.ip_route_add_del(&forward, true).unwrap();
        assert!(cp.can_reach(1, loop0));
        // Forward-only: the return path is still dead.
        assert!(!cp.session_viable(1, loop1, 0, loop0));

        cp.ip_route_add_del(&reverse, true).unwrap();
        assert!(cp.session_viable(1, loop1, 0, loop0));

        // Removing either route breaks the session again.
        cp.ip_route_add_del(&forward, false).unwrap();
        assert!(!cp.session_viable(1, loop1, 0, loop0));
        cp.ip_route_add_del(&forward, true).unwrap();
        cp.ip_route_add_del(&reverse, false).unwrap();
        assert!(!cp.session_viable(1, loop1, 0, loop0));
    }

    #[test]
    fn down_interfaces_do_not_forward() {
        let mut cp = MemControlPlane::new();
        let (if0, _) = two_table_setup(&mut cp);
        cp.set_interface_flags(if0, false).unwrap();
        assert!(!cp.can_reach(0, Ipv4Addr::new(172, 16, 1, 1)));
    }

    #[test]
    fn namespaces_upsert_and_die_with_their_interface() {
        let mut cp = MemControlPlane::new();
        let (if0, if1) = two_table_setup(&mut cp);
        cp.app_namespace_add(&AppNamespace {
            id: "0".into(),
            secret: 1234,
            sw_if_index: if0,
        })
        .unwrap();
        cp.app_namespace_add(&AppNamespace {
            id: "0".into(),
            secret: 4321,
            sw_if_index: if1,
        })
        .unwrap();
        assert_eq!(cp.namespace("0").unwrap().secret, 4321);
        assert_eq!(cp.namespace_table("0"), Some(1));

        cp.delete_loopback(if1).unwrap();
        assert!(cp.namespace("0").is_none());
    }

    #[test]
    fn deleting_an_absent_route_is_an_error() {
        let mut cp = MemControlPlane::new();
        let route = HostRoute::host(0, Ipv4Addr::new(10, 0, 0, 1), RoutePath::via_table(0));
        assert!(matches!(
            cp.ip_route_add_del(&route, false),
            Err(ControlPlaneError::NoSuchRoute { .. })
        ));
    }
}
