//! Locating the configuration root

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Directory name that marks a configuration root
pub const ROOT_DIR_NAME: &str = ".pmp-flow";

/// Nearest `.pmp-flow` directory in `start` or its ancestors.
///
/// Falls back to `start/.pmp-flow`, which need not exist yet.
pub fn discover_root(start: &Path) -> PathBuf {
    for dir in start.ancestors() {
        let candidate = dir.join(ROOT_DIR_NAME);
        if candidate.is_dir() {
            debug!(root = %candidate.display(), "Discovered configuration root");
            return candidate;
        }
    }

    start.join(ROOT_DIR_NAME)
}

/// The explicit root when given, otherwise discovery from the working directory
pub fn resolve_root(explicit: Option<&Path>) -> io::Result<PathBuf> {
    match explicit {
        Some(root) => Ok(root.to_path_buf()),
        None => Ok(discover_root(&std::env::current_dir()?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_finds_root_in_ancestor() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join(ROOT_DIR_NAME);
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(discover_root(&nested), root);
    }

    #[test]
    fn test_nearest_root_wins() {
        let dir = TempDir::new().unwrap();
        let inner = dir.path().join("project");
        fs::create_dir_all(dir.path().join(ROOT_DIR_NAME)).unwrap();
        fs::create_dir_all(inner.join(ROOT_DIR_NAME)).unwrap();

        assert_eq!(discover_root(&inner), inner.join(ROOT_DIR_NAME));
    }

    #[test]
    fn test_falls_back_to_start() {
        let dir = TempDir::new().unwrap();
        let start = dir.path().join("empty");
        fs::create_dir_all(&start).unwrap();
        fs::write(start.join("notes.txt"), "").unwrap();

        let found = discover_root(&start);
        if found != start.join(ROOT_DIR_NAME) {
            // An ancestor of the temp directory carries a real root
            assert!(found.is_dir());
        }
    }

    #[test]
    fn test_explicit_root_overrides() {
        let explicit = Path::new("/srv/flows-root");
        assert_eq!(resolve_root(Some(explicit)).unwrap(), explicit);
    }
}
