pub mod cleanup;
pub mod compress;
pub mod error;
pub mod fetch;
pub mod image;
pub mod pipeline;
pub mod runner;
pub mod types;

pub use error::{Error, Result};
pub use pipeline::{BuildReport, Pipeline};
pub use types::{BuildOptions, BuiltImage};
