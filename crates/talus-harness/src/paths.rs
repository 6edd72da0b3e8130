//! Peer binary resolution.
//!
//! Peer executables live under `$TALUS_TEST_BUILD_DIR/bin/`. An unset
//! variable or a missing file aborts the run before anything is spawned.

use std::path::{Path, PathBuf};

use crate::error::HarnessError;

/// Build-output root the peer binaries are resolved from.
pub const BUILD_DIR_VAR: &str = "TALUS_TEST_BUILD_DIR";

/// Subdirectory of the build root holding the peer executables.
const APP_SUBDIR: &str = "bin";

/// Resolve a peer binary under the build root named by
/// [`BUILD_DIR_VAR`].
pub fn peer_binary(name: &str) -> Result<PathBuf, HarnessError> {
    let root =
        std::env::var(BUILD_DIR_VAR).map_err(|_| HarnessError::BuildDirUnset(BUILD_DIR_VAR))?;
    peer_binary_in(Path::new(&root), name)
}

/// Resolve a peer binary under an explicit build root.
pub fn peer_binary_in(root: &Path, name: &str) -> Result<PathBuf, HarnessError> {
    let path = root.join(APP_SUBDIR).join(name);
    if !path.exists() {
        return Err(HarnessError::BinaryMissing(path));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_an_existing_binary() {
        let root = std::env::temp_dir().join(format!("talus_paths_{}", std::process::id()));
        let bin_dir = root.join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        std::fs::write(bin_dir.join("echo_server"), b"").unwrap();

        let path = peer_binary_in(&root, "echo_server").unwrap();
        assert_eq!(path, bin_dir.join("echo_server"));

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn missing_binary_is_fatal() {
        let root = std::env::temp_dir().join("talus_paths_missing");
        match peer_binary_in(&root, "echo_server") {
            Err(HarnessError::BinaryMissing(path)) => {
                assert!(path.starts_with(&root));
            }
            other => panic!("expected BinaryMissing, got {:?}", other),
        }
    }
}
