use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Artifact not found or unreadable: {}", .path.display())]
    MissingArtifact { path: PathBuf },

    #[error("Duplicate artifact {name} {version}: {} and {}", .first.display(), .second.display())]
    DuplicateArtifact {
        name: String,
        version: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Artifacts {} and {} share the {field} {value}", .first.display(), .second.display())]
    ConflictingArtifact {
        field: &'static str,
        value: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Failed to checksum {}: {source}", .path.display())]
    ChecksumIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid base URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid artifact descriptor {}: {reason}", .path.display())]
    InvalidDescriptor { path: PathBuf, reason: String },

    #[error("Failed to start checksum workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
