//! Pass/fail rendering of one run's terminal state.

use std::time::Duration;

use serde::Serialize;

use crate::error::HarnessError;
use crate::worker::{PeerRole, PeerState};

/// How the run ended, before any judgement about success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The client reached a terminal state inside the window.
    Completed,
    /// The client never finished; both process groups were forcibly
    /// terminated.
    TimedOut,
}

/// Terminal state of one run: the observed exit states, the window that
/// applied, and whether teardown had to be forced.
///
/// Only the client's exit state decides pass/fail. The server is routinely
/// killed by the harness, so its state is diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub outcome: Outcome,
    pub client: PeerState,
    pub server: PeerState,
    pub client_pid: Option<u32>,
    pub server_pid: Option<u32>,
    pub timeout: Duration,
    pub elapsed: Duration,
    pub forced_teardown: bool,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Completed && self.client == PeerState::Exited(0)
    }

    /// The result validation: raise a descriptive failure unless the
    /// client finished in time with exit code 0.
    pub fn ensure_pass(&self) -> Result<(), HarnessError> {
        match self.outcome {
            Outcome::TimedOut => Err(HarnessError::Timeout {
                timeout: self.timeout,
            }),
            // A completed verdict always carries a terminal client state;
            // anything else means the peer was never observed to finish.
            Outcome::Completed => match self.client {
                PeerState::Exited(0) => Ok(()),
                PeerState::Exited(code) => Err(HarnessError::PeerFailed {
                    peer: PeerRole::Client,
                    code,
                }),
                PeerState::Killed(signal) => Err(HarnessError::PeerKilled {
                    peer: PeerRole::Client,
                    signal,
                }),
                PeerState::NotStarted | PeerState::Running => Err(HarnessError::Timeout {
                    timeout: self.timeout,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(outcome: Outcome, client: PeerState) -> Verdict {
        Verdict {
            outcome,
            client,
            server: PeerState::Killed(libc::SIGTERM),
            client_pid: Some(100),
            server_pid: Some(101),
            timeout: Duration::from_secs(3),
            elapsed: Duration::from_millis(40),
            forced_teardown: outcome == Outcome::TimedOut,
        }
    }

    #[test]
    fn clean_client_exit_passes() {
        let v = verdict(Outcome::Completed, PeerState::Exited(0));
        assert!(v.passed());
        v.ensure_pass().unwrap();
    }

    #[test]
    fn nonzero_client_exit_names_the_peer_and_code() {
        let v = verdict(Outcome::Completed, PeerState::Exited(42));
        assert!(!v.passed());
        let err = v.ensure_pass().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("client"), "{msg}");
        assert!(msg.contains("42"), "{msg}");
    }

    #[test]
    fn timeout_reports_the_window() {
        let v = verdict(Outcome::TimedOut, PeerState::Killed(libc::SIGTERM));
        assert!(!v.passed());
        let msg = v.ensure_pass().unwrap_err().to_string();
        assert!(msg.contains("3s"), "{msg}");
    }

    #[test]
    fn signalled_client_is_reported_as_killed_not_failed() {
        let v = verdict(Outcome::Completed, PeerState::Killed(libc::SIGKILL));
        let msg = v.ensure_pass().unwrap_err().to_string();
        assert!(msg.contains("signal"), "{msg}");
    }

    #[test]
    fn verdict_serializes_for_reporting() {
        let v = verdict(Outcome::Completed, PeerState::Exited(0));
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["client"]["exited"], 0);
    }
}
