//! Single peer process ownership.
//!
//! A [`PeerProcess`] wraps one externally built program for the duration of
//! a run: it launches it with a merged environment overlay in its own
//! process group, answers non-blocking "has it finished" queries, waits up
//! to a deadline, and can terminate the whole group. Group-wide signalling
//! matters because a peer may spawn helper subprocesses; the harness owns
//! the job, not just the leader.

use std::collections::BTreeMap;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use crate::env::PeerEnv;
use crate::error::HarnessError;

/// Which side of the run a process plays. Used in logs and failure
/// messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    Server,
    Client,
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerRole::Server => f.write_str("server"),
            PeerRole::Client => f.write_str("client"),
        }
    }
}

/// Observable state of a peer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    NotStarted,
    Running,
    /// Exited on its own with this code.
    Exited(i32),
    /// Terminated by this signal.
    Killed(i32),
}

impl PeerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PeerState::Exited(_) | PeerState::Killed(_))
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            PeerState::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

/// One externally spawned peer: resolved program path, ordered arguments,
/// and an environment overlay merged over the ambient environment at spawn
/// time.
pub struct PeerProcess {
    role: PeerRole,
    program: PathBuf,
    args: Vec<String>,
    env: PeerEnv,
    child: Option<Child>,
    state: PeerState,
}

/// Poll interval for bounded waits.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl PeerProcess {
    pub fn new(role: PeerRole, program: PathBuf, args: Vec<String>, env: PeerEnv) -> Self {
        PeerProcess {
            role,
            program,
            args,
            env,
            child: None,
            state: PeerState::NotStarted,
        }
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// OS pid of the group leader, once started.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(|c| c.id())
    }

    /// Launch the peer and return immediately.
    ///
    /// The child becomes the leader of a fresh process group so the whole
    /// subtree can later be signalled as a unit. A missing executable is a
    /// configuration error raised before anything is spawned.
    pub fn start(&mut self) -> Result<(), HarnessError> {
        if !self.program.exists() {
            return Err(HarnessError::BinaryMissing(self.program.clone()));
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.vars())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .process_group(0);

        tracing::info!(
            peer = %self.role,
            program = %self.program.display(),
            args = ?self.args,
            "spawning peer"
        );

        let child = cmd.spawn().map_err(|source| HarnessError::Spawn {
            peer: self.role,
            source,
        })?;
        self.child = Some(child);
        self.state = PeerState::Running;
        Ok(())
    }

    /// Non-blocking check: still running, or the terminal state.
    pub fn poll(&mut self) -> io::Result<PeerState> {
        if let Some(child) = self.child.as_mut() {
            if !self.state.is_terminal() {
                if let Some(status) = child.try_wait()? {
                    self.state = state_from(status);
                    tracing::debug!(peer = %self.role, state = ?self.state, "peer reached terminal state");
                }
            }
        }
        Ok(self.state)
    }

    /// Block until the peer exits or `timeout` elapses, whichever comes
    /// first. A timeout is not an error: `None` is an indeterminate result
    /// the caller must interpret.
    pub fn join(&mut self, timeout: Duration) -> io::Result<Option<PeerState>> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.poll()?;
            if state.is_terminal() {
                return Ok(Some(state));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// SIGTERM the peer's entire process group. A group that has already
    /// exited is tolerated; any other signalling failure is a cleanup
    /// error.
    pub fn terminate_group(&mut self) -> Result<(), HarnessError> {
        if self.state.is_terminal() {
            return Ok(());
        }
        let Some(pgid) = self.pgid() else {
            return Ok(());
        };
        // SAFETY: pgid is the process group created for our own child at
        // spawn time, and the child has not been reaped yet. A group that
        // no longer exists fails with ESRCH, handled below.
        let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
        if rc != 0 {
            let source = io::Error::last_os_error();
            if source.raw_os_error() == Some(libc::ESRCH) {
                tracing::debug!(peer = %self.role, pgid, "process group already gone");
                return Ok(());
            }
            return Err(HarnessError::Cleanup {
                peer: self.role,
                pgid,
                source,
            });
        }
        tracing::info!(peer = %self.role, pgid, "sent SIGTERM to process group");
        Ok(())
    }

    /// Terminate the group and wait until the leader is actually reaped,
    /// escalating to SIGKILL if the group ignores SIGTERM for `grace`.
    /// Returns the terminal state observed.
    pub fn shutdown(&mut self, grace: Duration) -> Result<PeerState, HarnessError> {
        if self.child.is_none() || self.state.is_terminal() {
            return Ok(self.state);
        }
        self.terminate_group()?;
        match self.join(grace) {
            Ok(Some(state)) => Ok(state),
            Ok(None) => {
                tracing::warn!(peer = %self.role, "process group ignored SIGTERM, killing");
                self.kill_group();
                self.reap()
            }
            Err(source) => Err(HarnessError::Wait {
                peer: self.role,
                source,
            }),
        }
    }

    /// SIGKILL the group, best effort.
    fn kill_group(&mut self) {
        if let Some(pgid) = self.pgid() {
            // SAFETY: same ownership argument as in `terminate_group`.
            let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
            if rc != 0 {
                tracing::debug!(peer = %self.role, pgid, "SIGKILL found no process group");
            }
        }
    }

    /// Blocking wait for the leader after a kill; always terminates
    /// promptly once SIGKILL has been delivered.
    fn reap(&mut self) -> Result<PeerState, HarnessError> {
        let Some(child) = self.child.as_mut() else {
            return Ok(self.state);
        };
        let status = child.wait().map_err(|source| HarnessError::Wait {
            peer: self.role,
            source,
        })?;
        self.state = state_from(status);
        Ok(self.state)
    }

    fn pgid(&self) -> Option<i32> {
        // The child was made leader of its own group, so pgid == pid.
        self.child.as_ref().map(|c| c.id() as libc::pid_t)
    }
}

impl Drop for PeerProcess {
    /// Backstop: a run must never leak a process group, even on a panic
    /// path that skipped the orderly shutdown.
    fn drop(&mut self) {
        if self.child.is_some() && !self.state.is_terminal() && self.state != PeerState::NotStarted
        {
            self.kill_group();
            if let Some(child) = self.child.as_mut() {
                let _ = child.wait();
            }
        }
    }
}

fn state_from(status: ExitStatus) -> PeerState {
    match status.code() {
        Some(code) => PeerState::Exited(code),
        None => PeerState::Killed(status.signal().unwrap_or(0)),
    }
}
