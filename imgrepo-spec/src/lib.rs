pub mod base;
pub mod depsolver;
pub mod error;
pub mod format;
pub mod lint;
pub mod logging;
pub mod resolve;
pub mod spec;

pub use base::BaseImage;
pub use error::{Error, Result};
pub use format::RepoFormat;
pub use spec::ImageSpec;
