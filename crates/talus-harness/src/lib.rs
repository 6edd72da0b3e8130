//! Conformance harness for the talus session layer.
//!
//! Drives two externally built peer programs (an echo server and an echo
//! client) against a running dataplane and turns their process-level
//! outcomes into test verdicts:
//! - **worker** — single-peer process ownership (spawn, poll, bounded join, group-wide kill)
//! - **lifecycle** — server-then-client orchestration with readiness and timeout recovery
//! - **verdict** — pass/fail rendering of the observed exit states
//! - **scenario** — the canned cut-through and through-hoststack runs

pub mod config;
pub mod env;
pub mod error;
pub mod lifecycle;
pub mod paths;
pub mod scenario;
pub mod verdict;
pub mod worker;

pub use config::RunOptions;
pub use error::HarnessError;
pub use lifecycle::{PeerPair, Readiness};
pub use verdict::{Outcome, Verdict};
pub use worker::{PeerProcess, PeerRole, PeerState};
