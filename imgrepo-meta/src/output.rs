//! All-or-nothing output of the repository documents
//!
//! Every document is first written to a temporary file in the destination
//! directory (same filesystem, so the final rename is atomic). Only once all
//! of them are staged are they renamed into place. If a rename fails, the
//! documents already moved are put back to what they were before the run.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{Error, Result};

/// A fully written document waiting to be renamed into place
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

fn write_error(path: PathBuf) -> impl Fn(std::io::Error) -> Error {
    move |source| Error::OutputWrite {
        path: path.clone(),
        source,
    }
}

/// Write `contents` to a temporary sibling of `dir/name`
pub fn stage(dir: &Path, name: &str, contents: &[u8]) -> Result<StagedFile> {
    let target = dir.join(name);
    let err = write_error(target.clone());

    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .rand_bytes(8)
        .tempfile_in(dir)
        .map_err(&err)?;
    tmp.write_all(contents).map_err(&err)?;
    tmp.flush().map_err(&err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))
            .map_err(&err)?;
    }
    tmp.as_file().sync_all().map_err(&err)?;

    debug!("Staged {:?} at {:?}", target, tmp.path());
    Ok(StagedFile { tmp, target })
}

/// Rename every staged file into place, rolling back on failure
pub fn commit_all(staged: Vec<StagedFile>) -> Result<()> {
    // Previous content of each replaced target, None when it did not exist
    let mut committed: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();

    for file in staged {
        let target = file.target.clone();
        let previous = match fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                rollback(&committed);
                return Err(Error::OutputWrite {
                    path: target,
                    source,
                });
            }
        };

        if let Err(e) = file.tmp.persist(&target) {
            rollback(&committed);
            return Err(Error::OutputWrite {
                path: target,
                source: e.error,
            });
        }
        committed.push((target, previous));
    }

    Ok(())
}

fn rollback(committed: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in committed.iter().rev() {
        let result = match previous {
            Some(bytes) => path
                .parent()
                .ok_or_else(|| std::io::Error::other("no parent directory"))
                .and_then(|dir| {
                    let mut tmp = NamedTempFile::new_in(dir)?;
                    tmp.write_all(bytes)?;
                    tmp.persist(path).map(|_| ()).map_err(|e| e.error)
                }),
            None => fs::remove_file(path),
        };

        match result {
            Ok(()) => debug!("Rolled back {:?}", path),
            Err(e) => warn!("Failed to roll back {:?}: {}", path, e),
        }
    }
}

/// Stage and commit a set of `(file name, contents)` documents in `dir`
pub fn write_documents(dir: &Path, documents: &[(&str, &[u8])]) -> Result<()> {
    fs::create_dir_all(dir).map_err(write_error(dir.to_path_buf()))?;

    let staged = documents
        .iter()
        .map(|(name, contents)| stage(dir, name, contents))
        .collect::<Result<Vec<_>>>()?;

    commit_all(staged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_write_documents() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("repo");

        write_documents(&out, &[("repo.metadata", b"{}\n"), ("index", b"[a]\n")]).unwrap();

        assert_eq!(dir_entries(&out), vec!["index", "repo.metadata"]);
        assert_eq!(fs::read(out.join("repo.metadata")).unwrap(), b"{}\n");
        assert_eq!(fs::read(out.join("index")).unwrap(), b"[a]\n");
    }

    #[test]
    fn test_stage_reports_target_path() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");

        let err = stage(&missing, "index", b"x").err().unwrap();
        match err {
            Error::OutputWrite { path, .. } => assert_eq!(path, missing.join("index")),
            other => panic!("unexpected error: {other}"),
        }

        let staged = stage(dir.path(), "index", b"x").unwrap();
        assert_eq!(staged.target(), dir.path().join("index"));
    }

    #[test]
    fn test_overwrites_previous_documents() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index"), "old").unwrap();

        write_documents(dir.path(), &[("index", b"new")]).unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("index")).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn test_documents_are_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_documents(dir.path(), &[("index", b"x")]).unwrap();
        let mode = fs::metadata(dir.path().join("index")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[test]
    fn test_failed_commit_rolls_back() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("repo.metadata"), "old").unwrap();
        // A directory in the way makes the second rename fail
        fs::create_dir(dir.path().join("index")).unwrap();
        fs::write(dir.path().join("index").join("keep"), "").unwrap();

        let err = write_documents(dir.path(), &[("repo.metadata", b"new"), ("index", b"new")])
            .unwrap_err();
        assert!(matches!(err, Error::OutputWrite { .. }));

        assert_eq!(
            fs::read_to_string(dir.path().join("repo.metadata")).unwrap(),
            "old"
        );
        // No temporary files left behind
        assert_eq!(dir_entries(dir.path()), vec!["index", "repo.metadata"]);
    }
}
