//! Per-phase peer environment records.
//!
//! Rendezvous parameters travel to the peers through their environment.
//! Each phase (server, client) gets its own immutable record built by
//! cloning a shared base and extending it; nothing is mutated between
//! phases, so a client-only addition can never leak into the server's
//! environment.

use std::collections::BTreeMap;

/// Rendezvous-prefix identity shared by both peers of one run.
pub const API_PREFIX: &str = "TALUS_API_PREFIX";
/// Flat/local scope selector.
pub const SCOPE_LOCAL: &str = "TALUS_APP_SCOPE_LOCAL";
/// Global scope selector (used with a namespace id).
pub const SCOPE_GLOBAL: &str = "TALUS_APP_SCOPE_GLOBAL";
/// Isolation-scope identifier, per peer.
pub const NAMESPACE_ID: &str = "TALUS_APP_NAMESPACE_ID";
/// Secret authorizing use of the scope named by [`NAMESPACE_ID`].
pub const NAMESPACE_SECRET: &str = "TALUS_APP_NAMESPACE_SECRET";
/// Path the server writes its JSON ready marker to, when the harness asks
/// for the explicit readiness handshake.
pub const READY_FILE: &str = "TALUS_READY_FILE";

/// Environment overlay handed to one peer, merged over the ambient
/// environment at spawn time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerEnv {
    vars: BTreeMap<String, String>,
}

impl PeerEnv {
    /// Base record shared by both peers: the rendezvous prefix.
    pub fn base(api_prefix: &str) -> Self {
        PeerEnv::default().with(API_PREFIX, api_prefix)
    }

    /// Select the flat/local scope.
    pub fn scope_local(self) -> Self {
        self.with(SCOPE_LOCAL, "true")
    }

    /// Select the global scope; peers are then expected to carry a
    /// namespace binding as well.
    pub fn scope_global(self) -> Self {
        self.with(SCOPE_GLOBAL, "true")
    }

    /// Bind the peer to an isolation scope and its secret.
    pub fn namespace(self, id: &str, secret: u64) -> Self {
        self.with(NAMESPACE_ID, id)
            .with(NAMESPACE_SECRET, secret.to_string())
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }
}
