use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Spec path not found: {}", .0.display())]
    SpecNotFound(PathBuf),

    #[error("Malformed spec file {}, missing props {missing:?}", .path.display())]
    MissingProps { path: PathBuf, missing: Vec<String> },

    #[error("Invalid {key} {value:?} in {}: it must not contain '/' or whitespace", .path.display())]
    InvalidProp {
        path: PathBuf,
        key: String,
        value: String,
    },

    #[error("Invalid base '{base}': expected <image_type>:<base_image> where <image_type> is one of {supported}")]
    MalformedBase { base: String, supported: String },

    #[error("Unsupported image type '{kind}', select one of {supported}")]
    UnknownImageKind { kind: String, supported: String },

    #[error("Spec id {id} defined twice: {} and {}", .first.display(), .second.display())]
    DuplicateSpec {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Specs {} and {} both build {file}", .first.display(), .second.display())]
    DuplicateImage {
        file: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Circular dependencies found!\n{0}")]
    CircularDependency(String),
}

pub type Result<T> = std::result::Result<T, Error>;
