use std::{path::PathBuf, time::Duration};

use imgrepo_meta::ArtifactDescriptor;
use imgrepo_spec::{ImageSpec, RepoFormat};

pub const DEFAULT_REPO_DIR: &str = "image-repo";
pub const DEFAULT_REPO_NAME: &str = "test";
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8181";

/// Spec props that map to descriptor fields; the rest travel as free props
const DESCRIPTOR_PROPS: [&str; 6] = ["name", "version", "distro", "arch", "osinfo", "expand"];

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub repo_dir: PathBuf,
    pub repo_format: RepoFormat,
    pub repo_name: String,
    pub base_url: String,
    /// xz-compress images before publishing them
    pub compress: bool,
    /// Limit for each external command
    pub timeout: Option<Duration>,
    /// Images built, and hashed, concurrently; 0 means one per CPU
    pub jobs: usize,
    /// Keep the scratch directories of finished builds
    pub keep_work: bool,
}

impl BuildOptions {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            repo_format: RepoFormat::default(),
            repo_name: DEFAULT_REPO_NAME.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            compress: false,
            timeout: None,
            jobs: 1,
            keep_work: false,
        }
    }

    pub fn parallelism(&self) -> usize {
        match self.jobs {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            jobs => jobs,
        }
    }
}

/// An image produced by this run
#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub spec: ImageSpec,
    pub kind: &'static str,
    pub path: PathBuf,
    pub uncompressed_size: Option<u64>,
}

impl BuiltImage {
    pub fn descriptor(&self, timestamp: i64) -> ArtifactDescriptor {
        let spec = &self.spec;
        let mut descriptor =
            ArtifactDescriptor::new(&self.path, spec.name(), spec.version(), spec.distro())
                .with_arch(spec.arch())
                .with_timestamp(timestamp);

        if let Some(osinfo) = spec.osinfo() {
            descriptor = descriptor.with_osinfo(osinfo);
        }
        if let Some(expand) = spec.expand() {
            descriptor = descriptor.with_expand(expand);
        }
        descriptor.uncompressed_size = self.uncompressed_size;

        for (key, value) in &spec.props {
            if !DESCRIPTOR_PROPS.contains(&key.as_str()) {
                descriptor = descriptor.with_prop(key, value);
            }
        }
        descriptor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_spec() {
        let spec = ImageSpec::parse(
            "/specs/el7",
            "#name=el7\n#version=2.0\n#base=libguestfs:centos-7.2\n#distro=el7\n\
             #osinfo=centos7.0\n#notes=Minimal install\n",
        );
        let built = BuiltImage {
            spec,
            kind: "libguestfs",
            path: PathBuf::from("/repo/el7-2.0.qcow2.xz"),
            uncompressed_size: Some(4096),
        };

        let descriptor = built.descriptor(1_450_000_000);
        assert_eq!(descriptor.key(), ("el7", "2.0"));
        assert_eq!(descriptor.distro, "el7");
        assert_eq!(descriptor.arch, "x86_64");
        assert_eq!(descriptor.osinfo.as_deref(), Some("centos7.0"));
        assert_eq!(descriptor.expand, None);
        assert_eq!(descriptor.timestamp, Some(1_450_000_000));
        assert_eq!(descriptor.uncompressed_size, Some(4096));
        assert_eq!(
            descriptor.props.keys().collect::<Vec<_>>(),
            vec!["base", "notes"]
        );
    }

    #[test]
    fn test_parallelism() {
        let mut options = BuildOptions::new("repo");
        assert_eq!(options.parallelism(), 1);
        options.jobs = 0;
        assert!(options.parallelism() >= 1);
    }
}
