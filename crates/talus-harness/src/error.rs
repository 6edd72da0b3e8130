//! Failure taxonomy of the harness.
//!
//! Configuration errors abort a run before anything is spawned; timeout and
//! peer-exit failures carry the state a test report needs; cleanup errors are
//! kept distinct because they mean the harness could not guarantee that no
//! worker process survived the run.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::worker::{PeerRole, PeerState};

#[derive(Debug, Error)]
pub enum HarnessError {
    /// Required environment variable absent. Raised before any spawn.
    #[error("environment variable `{0}` is not set")]
    BuildDirUnset(&'static str),

    /// The resolved executable does not exist. A missing build-output
    /// directory is a configuration error, not a retryable condition.
    #[error("peer binary missing at {}", .0.display())]
    BinaryMissing(PathBuf),

    #[error("failed to spawn {peer}: {source}")]
    Spawn {
        peer: PeerRole,
        #[source]
        source: io::Error,
    },

    /// The server reached a terminal state before it ever signalled
    /// readiness; the marker will never appear.
    #[error("server exited ({state:?}) before signalling readiness")]
    ServerExitedEarly { state: PeerState },

    #[error("server ready marker {} did not appear within {timeout:?}", .path.display())]
    ServerNotReady { path: PathBuf, timeout: Duration },

    #[error("timeout: client did not finish within {timeout:?}; all worker process groups were terminated")]
    Timeout { timeout: Duration },

    /// The aggregate failure for a timed-out run whose forced teardown
    /// itself went wrong. The primary timeout is never masked by the
    /// secondary cleanup errors.
    #[error("timeout: client did not finish within {timeout:?}; cleanup errors followed: {details}")]
    TimeoutWithCleanup { timeout: Duration, details: String },

    #[error("failed to signal process group {pgid} of {peer}: {source}")]
    Cleanup {
        peer: PeerRole,
        pgid: i32,
        #[source]
        source: io::Error,
    },

    #[error("i/o error while watching {peer}: {source}")]
    Wait {
        peer: PeerRole,
        #[source]
        source: io::Error,
    },

    #[error("{peer} exited with code {code}, expected 0")]
    PeerFailed { peer: PeerRole, code: i32 },

    #[error("{peer} was killed by signal {signal}")]
    PeerKilled { peer: PeerRole, signal: i32 },
}
