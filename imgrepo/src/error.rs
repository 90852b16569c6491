use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Spec(#[from] imgrepo_spec::Error),

    #[error(transparent)]
    Meta(#[from] imgrepo_meta::Error),

    #[error("Required tool not found in PATH: {0}")]
    ToolNotFound(String),

    #[error("{program} failed with exit code {code:?}: {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("Failed to download {url}: HTTP {status}")]
    Download { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Build finished without producing {}", .0.display())]
    MissingOutput(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
