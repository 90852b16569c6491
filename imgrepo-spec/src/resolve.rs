use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::format::RepoFormat;
use crate::spec::ImageSpec;
use crate::{Error, Result};

pub const DEFAULT_SPECS_DIR: &str = "image-specs";

/// Expand spec paths: a directory stands for the regular files directly in
/// it (hidden files skipped, sorted), anything else must be a file.
pub fn resolve_spec_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();

    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            let mut files = Vec::new();
            for entry in std::fs::read_dir(path)? {
                let entry = entry?;
                let hidden = entry.file_name().to_string_lossy().starts_with('.');
                if !hidden && entry.file_type()?.is_file() {
                    files.push(entry.path());
                }
            }
            files.sort();
            debug!("Found {} specs in {}", files.len(), path.display());
            resolved.extend(files);
        } else if path.is_file() {
            resolved.push(path.to_path_buf());
        } else {
            return Err(Error::SpecNotFound(path.to_path_buf()));
        }
    }

    Ok(resolved)
}

/// Parse and verify every spec, rejecting two specs with the same id or two
/// specs that would build the same image file
pub fn load_specs<P: AsRef<Path>>(paths: &[P], format: RepoFormat) -> Result<Vec<ImageSpec>> {
    let mut seen: HashMap<String, PathBuf> = HashMap::new();
    let mut images: HashMap<String, PathBuf> = HashMap::new();
    let mut specs = Vec::new();

    for path in resolve_spec_paths(paths)? {
        let spec = ImageSpec::load(&path, format)?;
        if let Some(first) = seen.insert(spec.id.clone(), path.clone()) {
            return Err(Error::DuplicateSpec {
                id: spec.id,
                first,
                second: path,
            });
        }
        let file = spec.image_file_name();
        if let Some(first) = images.insert(file.clone(), path.clone()) {
            return Err(Error::DuplicateImage {
                file,
                first,
                second: path,
            });
        }
        specs.push(spec);
    }

    Ok(specs)
}
