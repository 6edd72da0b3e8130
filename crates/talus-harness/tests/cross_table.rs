//! Through-hoststack scenario: peers in routing-isolated scopes, joined
//! only by the reciprocal cross-table routes.
//!
//! The topology is provisioned against the in-process control plane, so
//! the routing invariants are asserted on recorded state while the peers
//! themselves meet over the host loopback (no real dataplane carries the
//! isolated addresses here).

mod common;

use std::net::Ipv4Addr;

use talus_harness::{scenario, RunOptions};
use talus_topology::{
    ControlPlane, DualTableTopology, HostRoute, MemControlPlane, RoutePath, TopologySpec,
};

use common::{assert_gone, stage_peers};

fn viable(cp: &MemControlPlane, topo: &DualTableTopology) -> bool {
    let server_table = cp.namespace_table(&topo.namespaces()[0].id).unwrap();
    let client_table = cp.namespace_table(&topo.namespaces()[1].id).unwrap();
    cp.session_viable(
        client_table,
        topo.table1_addr(),
        server_table,
        topo.table0_addr(),
    )
}

#[test]
fn cross_table_run_passes_and_unwinds() {
    if stage_peers().is_none() {
        eprintln!("Skipping: peer binaries not built");
        return;
    }

    let mut cp = MemControlPlane::new();
    cp.session_enable_disable(true).unwrap();
    assert!(cp.session_enabled());

    let mut topo = DualTableTopology::provision(&mut cp, TopologySpec::default()).unwrap();
    topo.install_cross_routes(&mut cp).unwrap();
    assert!(viable(&cp, &topo));

    let opts = RunOptions {
        server_port: 22100,
        ..RunOptions::default()
    };
    let [server_ns, client_ns] = topo.namespaces();
    let verdict = scenario::cross_table(
        &opts,
        "talus-crosstable",
        Ipv4Addr::LOCALHOST,
        server_ns,
        client_ns,
    )
    .unwrap()
    .run()
    .unwrap();

    verdict.ensure_pass().unwrap();
    assert_gone(verdict.server_pid.unwrap());
    assert_gone(verdict.client_pid.unwrap());

    // Teardown must run regardless of the verdict and leave nothing.
    topo.teardown(&mut cp).unwrap();
    cp.session_enable_disable(false).unwrap();
    assert_eq!(cp.interface_count(), 0);
    assert!(!cp.table_exists(1));
    assert!(cp.routes_in(0).is_empty());
    assert!(!cp.session_enabled());
}

#[test]
fn removing_either_route_breaks_the_cross_table_path() {
    // Pure control-plane property; no peers needed.
    let mut cp = MemControlPlane::new();
    let mut topo = DualTableTopology::provision(&mut cp, TopologySpec::default()).unwrap();

    // No routes yet: isolated by construction.
    assert!(!viable(&cp, &topo));

    topo.install_cross_routes(&mut cp).unwrap();
    assert!(viable(&cp, &topo));

    topo.remove_cross_routes(&mut cp).unwrap();
    assert!(!viable(&cp, &topo));

    // Reinstall, then drop just the return route: still dead end-to-end.
    topo.install_cross_routes(&mut cp).unwrap();
    let return_route = HostRoute::host(0, topo.table1_addr(), RoutePath::via_table(1));
    cp.ip_route_add_del(&return_route, false).unwrap();
    assert!(!viable(&cp, &topo));
}

#[test]
fn scenario_is_repeatable_after_full_teardown() {
    if stage_peers().is_none() {
        eprintln!("Skipping: peer binaries not built");
        return;
    }

    for round in 0..2 {
        let mut cp = MemControlPlane::new();
        cp.session_enable_disable(true).unwrap();
        let mut topo = DualTableTopology::provision(&mut cp, TopologySpec::default()).unwrap();
        topo.install_cross_routes(&mut cp).unwrap();

        let opts = RunOptions {
            server_port: 22110,
            ..RunOptions::default()
        };
        let [server_ns, client_ns] = topo.namespaces();
        let verdict = scenario::cross_table(
            &opts,
            "talus-crosstable-repeat",
            Ipv4Addr::LOCALHOST,
            server_ns,
            client_ns,
        )
        .unwrap()
        .run()
        .unwrap();
        assert!(verdict.passed(), "round {round} failed: {verdict:?}");

        topo.teardown(&mut cp).unwrap();
        cp.session_enable_disable(false).unwrap();
    }
}
