use std::{
    fs, io,
    path::{Path, PathBuf},
};

use glob::{glob, Pattern};
use tracing::{debug, warn};

use crate::Result;

/// Scratch space of the builds, inside the repository directory
pub const WORK_DIR: &str = ".work";

pub fn work_root(repo_dir: &Path) -> PathBuf {
    repo_dir.join(WORK_DIR)
}

pub fn remove_work_dir(dir: &Path) -> io::Result<()> {
    if dir.exists() {
        debug!("Removing {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    Ok(())
}

/// Remove partial downloads and compressed leftovers a killed run may have
/// left in the repository. Returns how many files were removed.
pub fn remove_stale_files(repo_dir: &Path) -> Result<usize> {
    let root = Pattern::escape(&repo_dir.to_string_lossy());
    let patterns = [
        format!("{}/*.part", root),
        format!("{}/{}/**/*.part", root, WORK_DIR),
        format!("{}/*.qcow2.gz", root),
    ];

    let mut removed = 0;
    for pattern in &patterns {
        for entry in glob(pattern)?.filter_map(|e| e.ok()) {
            match fs::remove_file(&entry) {
                Ok(()) => {
                    debug!("Removed stale {}", entry.display());
                    removed += 1;
                }
                Err(err) => warn!("Unable to remove {}: {}", entry.display(), err),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_remove_stale_files() {
        let dir = tempdir().unwrap();
        let work = work_root(dir.path()).join("el7");
        fs::create_dir_all(&work).unwrap();

        fs::write(dir.path().join("el7-1.0.qcow2.part"), b"x").unwrap();
        fs::write(work.join("base.qcow2.part"), b"x").unwrap();
        fs::write(dir.path().join("el7-1.0.qcow2"), b"x").unwrap();
        fs::write(dir.path().join("el7-1.0.metadata"), b"{}").unwrap();

        assert_eq!(remove_stale_files(dir.path()).unwrap(), 2);
        assert!(dir.path().join("el7-1.0.qcow2").exists());
        assert!(dir.path().join("el7-1.0.metadata").exists());
        assert!(!work.join("base.qcow2.part").exists());
    }

    #[test]
    fn test_remove_work_dir() {
        let dir = tempdir().unwrap();
        let work = work_root(dir.path()).join("el7");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("base.qcow2"), b"x").unwrap();

        remove_work_dir(&work).unwrap();
        assert!(!work.exists());
        remove_work_dir(&work).unwrap();
    }
}
