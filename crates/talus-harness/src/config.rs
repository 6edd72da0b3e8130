//! Tunable knobs for one scenario run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for one conformance run. Loadable from a TOML file by the
/// scenario runner; every field falls back to the reference defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Window the client gets to reach a terminal state, in seconds.
    pub timeout_secs: u64,
    /// Fixed settle delay between server and client start, in
    /// milliseconds. Only consulted when `ready_marker` is off. The delay
    /// infers readiness from wall-clock time, which is inherently racy;
    /// it is kept configurable rather than hardcoded.
    pub settle_ms: u64,
    /// Use the explicit ready-marker handshake instead of the settle
    /// delay: the server writes a JSON marker once it is listening and the
    /// harness waits (bounded) for it.
    pub ready_marker: bool,
    /// Window for the ready marker to appear, in seconds.
    pub ready_timeout_secs: u64,
    /// Port the server listens on; handed to the client as its peer port.
    pub server_port: u16,
    /// Payload the client sends and expects echoed back verbatim.
    pub echo_phrase: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            timeout_secs: 3,
            settle_ms: 200,
            ready_marker: false,
            ready_timeout_secs: 3,
            server_port: 22000,
            echo_phrase: "Hello, world! Jenny is a friend of mine".into(),
        }
    }
}

impl RunOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }
}
