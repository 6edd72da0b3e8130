//! Shared test harness: stage the cargo-built echo peers into the
//! build-dir layout the resolver understands, and point
//! `TALUS_TEST_BUILD_DIR` at it. One staging per test process; tests
//! running in parallel threads all see the same layout.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use talus_harness::paths::BUILD_DIR_VAR;
use talus_harness::scenario::{CLIENT_BIN, SERVER_BIN};

/// Locate a binary cargo built alongside this test executable.
fn cargo_bin(name: &str) -> Option<PathBuf> {
    let mut path = std::env::current_exe().ok()?;
    path.pop(); // deps
    if path.ends_with("deps") {
        path.pop();
    }
    path.push(name);
    path.exists().then_some(path)
}

/// Stage both peers under `<tmp>/bin` and export the build-dir variable.
/// Returns `None` when the peer binaries have not been built, so callers
/// can skip instead of failing.
pub fn stage_peers() -> Option<&'static Path> {
    static STAGE: OnceLock<Option<PathBuf>> = OnceLock::new();
    STAGE
        .get_or_init(|| {
            let server = cargo_bin(SERVER_BIN)?;
            let client = cargo_bin(CLIENT_BIN)?;

            let root =
                std::env::temp_dir().join(format!("talus_stage_{}", std::process::id()));
            let bin_dir = root.join("bin");
            std::fs::create_dir_all(&bin_dir).ok()?;
            std::fs::copy(&server, bin_dir.join(SERVER_BIN)).ok()?;
            std::fs::copy(&client, bin_dir.join(CLIENT_BIN)).ok()?;

            std::env::set_var(BUILD_DIR_VAR, &root);
            Some(root)
        })
        .as_deref()
}

/// Assert a previously observed pid no longer resolves to a live process.
pub fn assert_gone(pid: u32) {
    let rc = unsafe { libc::kill(pid as libc::pid_t, 0) };
    assert_eq!(rc, -1, "pid {pid} still resolves");
}
