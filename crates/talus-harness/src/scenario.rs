//! Canned conformance scenarios.
//!
//! Two flagship runs exist: **cut-through**, where both peers share one
//! flat local scope, and **through-hoststack**, where the peers live in
//! routing-isolated scopes and traffic must cross via configured
//! inter-table routes. Both are built here so `cargo test` and the
//! `talus-run` binary wire the contracted argument and environment
//! surfaces identically.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use talus_topology::dualtable::NamespaceSpec;

use crate::config::RunOptions;
use crate::env::{self, PeerEnv};
use crate::error::HarnessError;
use crate::lifecycle::{PeerPair, Readiness};
use crate::paths;
use crate::worker::{PeerProcess, PeerRole};

/// Name of the server peer binary under the build root.
pub const SERVER_BIN: &str = "echo_server";
/// Name of the client peer binary under the build root.
pub const CLIENT_BIN: &str = "echo_client";

/// Cut-through: both peers in the flat local scope, client dialing the
/// host loopback.
pub fn cut_thru(opts: &RunOptions, api_prefix: &str) -> Result<PeerPair, HarnessError> {
    let base = PeerEnv::base(api_prefix).scope_local();
    build_pair(opts, base.clone(), base, Ipv4Addr::LOCALHOST)
}

/// Through-hoststack: peers in the global scope, each bound to its own
/// isolation namespace, client addressed at `server_addr` (the table-0
/// loopback when a real dataplane carries the traffic).
pub fn cross_table(
    opts: &RunOptions,
    api_prefix: &str,
    server_addr: Ipv4Addr,
    server_ns: &NamespaceSpec,
    client_ns: &NamespaceSpec,
) -> Result<PeerPair, HarnessError> {
    let base = PeerEnv::base(api_prefix).scope_global();
    let server_env = base.clone().namespace(&server_ns.id, server_ns.secret);
    let client_env = base.namespace(&client_ns.id, client_ns.secret);
    build_pair(opts, server_env, client_env, server_addr)
}

fn build_pair(
    opts: &RunOptions,
    server_env: PeerEnv,
    client_env: PeerEnv,
    server_addr: Ipv4Addr,
) -> Result<PeerPair, HarnessError> {
    let server_bin = paths::peer_binary(SERVER_BIN)?;
    let client_bin = paths::peer_binary(CLIENT_BIN)?;

    let (readiness, server_env) = if opts.ready_marker {
        let path = unique_marker_path();
        (
            Readiness::Marker {
                path: path.clone(),
                timeout: opts.ready_timeout(),
            },
            server_env.with(env::READY_FILE, path.display().to_string()),
        )
    } else {
        (Readiness::Settle(opts.settle()), server_env)
    };

    let server = PeerProcess::new(
        PeerRole::Server,
        server_bin,
        vec![opts.server_port.to_string()],
        server_env,
    );
    let client = PeerProcess::new(
        PeerRole::Client,
        client_bin,
        vec![
            server_addr.to_string(),
            opts.server_port.to_string(),
            "-E".into(),
            opts.echo_phrase.clone(),
            "-X".into(),
        ],
        client_env,
    );

    Ok(PeerPair::new(
        server,
        client,
        readiness,
        Duration::from_secs(opts.timeout_secs),
    ))
}

/// Marker path unique across concurrent runs of this process.
fn unique_marker_path() -> PathBuf {
    static SEQ: AtomicU32 = AtomicU32::new(0);
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("talus_ready_{}_{}.json", std::process::id(), seq))
}
