use std::fmt::Display;

use clap::ValueEnum;

/// Props every spec needs regardless of the repository format
pub const COMMON_PROPS: [&str; 1] = ["name"];

/// Props needed by lago metadata
pub const LAGO_PROPS: [&str; 3] = ["base", "name", "distro"];

/// Props needed by the virt-builder index
pub const VIRT_BUILDER_PROPS: [&str; 5] = ["base", "name", "osinfo", "arch", "expand"];

/// Which metadata the repository is generated for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum RepoFormat {
    Lago,
    VirtBuilder,
    #[default]
    All,
}

impl RepoFormat {
    /// Sorted, deduplicated list of props a spec must define
    pub fn required_props(&self) -> Vec<&'static str> {
        let mut props: Vec<&'static str> = COMMON_PROPS.to_vec();
        if self.includes_lago() {
            props.extend(LAGO_PROPS);
        }
        if self.includes_virt_builder() {
            props.extend(VIRT_BUILDER_PROPS);
        }
        props.sort_unstable();
        props.dedup();
        props
    }

    pub fn includes_lago(&self) -> bool {
        matches!(self, RepoFormat::Lago | RepoFormat::All)
    }

    pub fn includes_virt_builder(&self) -> bool {
        matches!(self, RepoFormat::VirtBuilder | RepoFormat::All)
    }
}

impl Display for RepoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepoFormat::Lago => write!(f, "lago"),
            RepoFormat::VirtBuilder => write!(f, "virt-builder"),
            RepoFormat::All => write!(f, "all"),
        }
    }
}
