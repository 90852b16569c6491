//! Built image artifacts
//!
//! An [`ArtifactDescriptor`] is what the build step knows about an image it
//! produced; an [`ImageArtifact`] is the same image after it has been found on
//! disk, sized and checksummed.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::checksum::{checksum_reader, Checksums};
use crate::{Error, Result};

pub const DEFAULT_ARCH: &str = "x86_64";

/// Extension of the per-image descriptor sidecar
pub const SIDECAR_EXTENSION: &str = "metadata";

/// Extension of the per-image checksum sidecar
pub const HASH_EXTENSION: &str = "hash";

/// Extensions stripped from an image file name to get its handle
const IMAGE_EXTENSIONS: [&str; 3] = [".xz", ".gz", ".qcow2"];

fn default_arch() -> String {
    DEFAULT_ARCH.to_string()
}

/// Description of a built image, handed to the metadata builder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub name: String,
    pub version: String,
    pub distro: String,

    #[serde(default = "default_arch")]
    pub arch: String,

    /// Image location. Sidecars store the bare file name, resolved against
    /// the directory the sidecar lives in.
    pub file: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osinfo: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<String>,

    /// Build time in unix seconds; the file mtime is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,

    /// Size before compression, when the artifact is compressed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uncompressed_size: Option<u64>,

    /// Free-form properties forwarded to the index
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub props: IndexMap<String, String>,
}

impl ArtifactDescriptor {
    pub fn new(
        file: impl Into<PathBuf>,
        name: impl Into<String>,
        version: impl Into<String>,
        distro: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            distro: distro.into(),
            arch: default_arch(),
            file: file.into(),
            osinfo: None,
            expand: None,
            timestamp: None,
            uncompressed_size: None,
            props: IndexMap::new(),
        }
    }

    pub fn with_arch(mut self, arch: impl Into<String>) -> Self {
        self.arch = arch.into();
        self
    }

    pub fn with_osinfo(mut self, osinfo: impl Into<String>) -> Self {
        self.osinfo = Some(osinfo.into());
        self
    }

    pub fn with_expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Logical identity of the image inside a repository
    pub fn key(&self) -> (&str, &str) {
        (&self.name, &self.version)
    }

    /// Section id of the image in the virt-builder index
    pub fn index_id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }

    /// File name of the image, used to build its URL
    pub fn file_name(&self) -> Result<String> {
        self.file
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.to_string())
            .ok_or_else(|| Error::InvalidDescriptor {
                path: self.file.clone(),
                reason: "image path has no usable file name".to_string(),
            })
    }

    /// Path of the descriptor sidecar next to the image
    pub fn sidecar_path(&self) -> Result<PathBuf> {
        let handle = handle(&self.file_name()?);
        Ok(self
            .file
            .with_file_name(format!("{}.{}", handle, SIDECAR_EXTENSION)))
    }

    /// Write this descriptor next to the image so the repo can be regenerated
    /// later without rebuilding.
    pub fn write_sidecar(&self) -> Result<PathBuf> {
        let path = self.sidecar_path()?;
        let mut stored = self.clone();
        stored.file = PathBuf::from(self.file_name()?);

        let json = serde_json::to_string_pretty(&stored)?;
        fs::write(&path, json + "\n").map_err(|source| Error::OutputWrite {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Parse a sidecar, resolving the image path against its directory
    pub fn from_sidecar(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut descriptor: Self =
            serde_json::from_str(&content).map_err(|e| Error::InvalidDescriptor {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if descriptor.file.is_relative() {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            descriptor.file = dir.join(&descriptor.file);
        }
        Ok(descriptor)
    }
}

/// Handle of an image file: its name with compression and format
/// extensions removed.
pub fn handle(file_name: &str) -> String {
    let mut handle = file_name;
    for ext in IMAGE_EXTENSIONS {
        if let Some(stripped) = handle.strip_suffix(ext) {
            handle = stripped;
        }
    }
    handle.to_string()
}

/// Write the `<handle>.hash` sidecar holding the image's SHA-256
pub fn write_hash_sidecar(image: &Path, sha256: &str) -> Result<PathBuf> {
    let file_name = image
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::InvalidDescriptor {
            path: image.to_path_buf(),
            reason: "image path has no usable file name".to_string(),
        })?;
    let path = image.with_file_name(format!("{}.{}", handle(file_name), HASH_EXTENSION));
    fs::write(&path, sha256).map_err(|source| Error::OutputWrite {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Load every descriptor sidecar in `dir`, skipping the given document names
pub fn read_sidecars(dir: &Path, skip: &[&str]) -> Result<Vec<ArtifactDescriptor>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if skip.contains(&file_name) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some(SIDECAR_EXTENSION) {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .iter()
        .map(|path| {
            tracing::debug!("Loading sidecar {:?}", path);
            ArtifactDescriptor::from_sidecar(path)
        })
        .collect()
}

/// A descriptor whose image has been located and checksummed
#[derive(Debug, Clone)]
pub struct ImageArtifact {
    pub descriptor: ArtifactDescriptor,
    pub file_name: String,
    pub checksums: Checksums,
    pub timestamp: i64,
}

impl ImageArtifact {
    /// Stat and hash the image a descriptor points at.
    ///
    /// Failing to open the file is a [`Error::MissingArtifact`]; failing
    /// halfway through reading it is a [`Error::ChecksumIo`].
    pub fn from_descriptor(descriptor: ArtifactDescriptor) -> Result<Self> {
        let file_name = descriptor.file_name()?;
        let path = descriptor.file.clone();

        let missing = || Error::MissingArtifact { path: path.clone() };
        let metadata = fs::metadata(&path).map_err(|_| missing())?;
        if !metadata.is_file() {
            return Err(missing());
        }
        let file = File::open(&path).map_err(|_| missing())?;

        let checksums = checksum_reader(file).map_err(|source| Error::ChecksumIo {
            path: path.clone(),
            source,
        })?;

        let timestamp = match descriptor.timestamp {
            Some(ts) => ts,
            None => metadata
                .modified()
                .map(|m| DateTime::<Utc>::from(m).timestamp())
                .map_err(|source| Error::ChecksumIo {
                    path: path.clone(),
                    source,
                })?,
        };

        tracing::debug!(
            "Checksummed {} ({} bytes): {}",
            file_name,
            checksums.size,
            checksums.sha512
        );

        Ok(Self {
            descriptor,
            file_name,
            checksums,
            timestamp,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn version(&self) -> &str {
        &self.descriptor.version
    }

    /// Size of the file on disk
    pub fn size(&self) -> u64 {
        self.checksums.size
    }

    pub fn handle(&self) -> String {
        handle(&self.file_name)
    }
}
