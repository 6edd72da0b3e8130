//! Server-then-client orchestration for one run.
//!
//! A [`PeerPair`] owns both peers of a run and encodes the protocol: start
//! the server, wait for readiness, start the client, bound the wait on the
//! client, and tear the server down before returning — on every path. When
//! the client never finishes, both process groups are terminated in a
//! structured two-stage pass and the timeout is reported together with any
//! cleanup errors instead of being masked by them.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::verdict::{Outcome, Verdict};
use crate::worker::{PeerProcess, PeerRole, PeerState};

/// Grace period a signalled process group gets before SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(2);

/// Poll interval while waiting for the ready marker.
const READY_POLL: Duration = Duration::from_millis(20);

/// How the harness decides the server is ready for the client.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// Fixed pause; the server is assumed, not confirmed, to be listening
    /// afterwards. Zero is allowed and simply races the client against the
    /// server's startup.
    Settle(Duration),
    /// Explicit handshake: wait (bounded) for the JSON marker the server
    /// writes once it is listening. The path travels to the server in
    /// `TALUS_READY_FILE`.
    Marker { path: PathBuf, timeout: Duration },
}

/// Marker the server writes once it is ready to accept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyMarker {
    pub pid: u32,
    pub port: u16,
}

/// Both peers of one run, with the ordering and recovery rules between
/// them.
pub struct PeerPair {
    server: PeerProcess,
    client: PeerProcess,
    readiness: Readiness,
    timeout: Duration,
}

impl PeerPair {
    pub fn new(
        server: PeerProcess,
        client: PeerProcess,
        readiness: Readiness,
        timeout: Duration,
    ) -> Self {
        debug_assert_eq!(server.role(), PeerRole::Server);
        debug_assert_eq!(client.role(), PeerRole::Client);
        PeerPair {
            server,
            client,
            readiness,
            timeout,
        }
    }

    /// Drive the full run and return its verdict.
    ///
    /// Invariant: by the time this returns — pass, fail, or error — no
    /// process group started for this run is left alive.
    pub fn run(mut self) -> Result<Verdict, HarnessError> {
        let started = Instant::now();
        self.server.start()?;

        let result = self.drive_client(started);
        match result {
            Ok(mut verdict) => {
                verdict.server = self.server.shutdown(TERM_GRACE)?;
                verdict.server_pid = self.server.id();
                Ok(verdict)
            }
            Err(err) => {
                // The primary failure stands; the server still must not
                // outlive the run.
                if let Err(cleanup) = self.server.shutdown(TERM_GRACE) {
                    tracing::error!(error = %cleanup, "server teardown failed after run error");
                }
                Err(err)
            }
        }
    }

    /// Everything after the server is up: readiness, client start, bounded
    /// join, timeout recovery. The caller tears the server down.
    fn drive_client(&mut self, started: Instant) -> Result<Verdict, HarnessError> {
        self.wait_server_ready()?;
        self.client.start()?;

        let joined = self
            .client
            .join(self.timeout)
            .map_err(|source| HarnessError::Wait {
                peer: PeerRole::Client,
                source,
            })?;

        match joined {
            Some(client_state) => {
                tracing::info!(state = ?client_state, "client finished");
                Ok(Verdict {
                    outcome: Outcome::Completed,
                    client: client_state,
                    server: PeerState::Running,
                    client_pid: self.client.id(),
                    server_pid: self.server.id(),
                    timeout: self.timeout,
                    elapsed: started.elapsed(),
                    forced_teardown: false,
                })
            }
            None => self.recover_from_timeout(started),
        }
    }

    /// Two-stage teardown after a client timeout: terminate the client's
    /// group and wait it out, then the server's, collecting every cleanup
    /// error. Raises a single failure carrying the timeout and, if any,
    /// the cleanup errors.
    fn recover_from_timeout(&mut self, started: Instant) -> Result<Verdict, HarnessError> {
        tracing::error!(
            timeout = ?self.timeout,
            "client did not finish in time, terminating both process groups"
        );

        let mut cleanup_errors = Vec::new();
        let client_state = match self.client.shutdown(TERM_GRACE) {
            Ok(state) => state,
            Err(err) => {
                cleanup_errors.push(err.to_string());
                PeerState::Running
            }
        };
        let server_state = match self.server.shutdown(TERM_GRACE) {
            Ok(state) => state,
            Err(err) => {
                cleanup_errors.push(err.to_string());
                PeerState::Running
            }
        };

        if !cleanup_errors.is_empty() {
            return Err(HarnessError::TimeoutWithCleanup {
                timeout: self.timeout,
                details: cleanup_errors.join("; "),
            });
        }

        Ok(Verdict {
            outcome: Outcome::TimedOut,
            client: client_state,
            server: server_state,
            client_pid: self.client.id(),
            server_pid: self.server.id(),
            timeout: self.timeout,
            elapsed: started.elapsed(),
            forced_teardown: true,
        })
    }

    fn wait_server_ready(&mut self) -> Result<(), HarnessError> {
        match self.readiness.clone() {
            Readiness::Settle(delay) => {
                tracing::debug!(?delay, "settling before client start");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                Ok(())
            }
            Readiness::Marker { path, timeout } => self.await_marker(&path, timeout),
        }
    }

    fn await_marker(&mut self, path: &std::path::Path, timeout: Duration) -> Result<(), HarnessError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.server.poll().map_err(|source| HarnessError::Wait {
                peer: PeerRole::Server,
                source,
            })?;
            if state.is_terminal() {
                return Err(HarnessError::ServerExitedEarly { state });
            }

            // A half-written file parses as garbage; keep polling until it
            // parses or the deadline passes.
            if let Ok(bytes) = std::fs::read(path) {
                if let Ok(marker) = serde_json::from_slice::<ReadyMarker>(&bytes) {
                    tracing::debug!(pid = marker.pid, port = marker.port, "server ready");
                    let _ = std::fs::remove_file(path);
                    return Ok(());
                }
            }

            if Instant::now() >= deadline {
                let _ = std::fs::remove_file(path);
                return Err(HarnessError::ServerNotReady {
                    path: path.to_path_buf(),
                    timeout,
                });
            }
            std::thread::sleep(READY_POLL);
        }
    }
}
