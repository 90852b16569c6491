//! Image spec files
//!
//! A spec is a virt-builder commands file whose leading comment lines carry
//! properties:
//!
//! ```text
//! #name=el7-base
//! #base=libguestfs:centos-7.2
//! #distro=el7
//! install vim
//! run-command yum clean all
//! ```
//!
//! The whole file is handed to the image tools as `--commands-from-file`;
//! the property lines are comments to them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::base::BaseImage;
use crate::format::RepoFormat;
use crate::{Error, Result};

pub const DEFAULT_VERSION: &str = "1.0";
pub const DEFAULT_ARCH: &str = "x86_64";

static PROP_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?P<key>[^\s=]+)\s*=\s*(?P<value>.*?)\s*$").expect("valid prop regex")
});

/// A parsed spec file
#[derive(Debug, Clone)]
pub struct ImageSpec {
    /// File base name, unique within a run
    pub id: String,
    /// Path of the spec, also the commands file
    pub path: PathBuf,
    pub props: IndexMap<String, String>,
    /// Lines that are neither props nor blank
    pub commands: Vec<String>,
    prop_lines: HashMap<String, usize>,
}

impl ImageSpec {
    /// Parse spec content; later definitions of a prop override earlier ones
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        let path = path.into();
        let id = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut props = IndexMap::new();
        let mut prop_lines = HashMap::new();
        let mut commands = Vec::new();

        for (idx, line) in content.lines().enumerate() {
            if let Some(caps) = PROP_REGEX.captures(line) {
                let key = caps["key"].to_string();
                prop_lines.insert(key.clone(), idx + 1);
                props.insert(key, caps["value"].to_string());
                continue;
            }

            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with('#') {
                commands.push(trimmed.to_string());
            }
        }

        Self {
            id,
            path,
            props,
            commands,
            prop_lines,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(path, &content))
    }

    /// Parse and check the props `format` needs
    pub fn load(path: &Path, format: RepoFormat) -> Result<Self> {
        let spec = Self::from_file(path)?;
        spec.verify(format)?;
        Ok(spec)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.props.get(key).map(|v| v.as_str())
    }

    /// 1-based line the prop was (last) defined on
    pub fn line_of(&self, key: &str) -> Option<usize> {
        self.prop_lines.get(key).copied()
    }

    pub fn missing_props(&self, format: RepoFormat) -> Vec<String> {
        format
            .required_props()
            .into_iter()
            .filter(|p| !self.props.contains_key(*p))
            .map(|p| p.to_string())
            .collect()
    }

    /// `name` and `version` props that cannot be part of a file name
    pub fn invalid_file_name_props(&self) -> Vec<(&'static str, &str)> {
        ["name", "version"]
            .into_iter()
            .filter_map(|key| self.get(key).map(|value| (key, value)))
            .filter(|(_, value)| value.contains('/') || value.chars().any(char::is_whitespace))
            .collect()
    }

    pub fn verify(&self, format: RepoFormat) -> Result<()> {
        let missing = self.missing_props(format);
        if !missing.is_empty() {
            return Err(Error::MissingProps {
                path: self.path.clone(),
                missing,
            });
        }
        if let Some((key, value)) = self.invalid_file_name_props().into_iter().next() {
            return Err(Error::InvalidProp {
                path: self.path.clone(),
                key: key.to_string(),
                value: value.to_string(),
            });
        }
        self.base()?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.get("name").unwrap_or(&self.id)
    }

    pub fn version(&self) -> &str {
        self.get("version").unwrap_or(DEFAULT_VERSION)
    }

    pub fn distro(&self) -> &str {
        self.get("distro").unwrap_or_default()
    }

    pub fn arch(&self) -> &str {
        self.get("arch").unwrap_or(DEFAULT_ARCH)
    }

    pub fn osinfo(&self) -> Option<&str> {
        self.get("osinfo")
    }

    pub fn expand(&self) -> Option<&str> {
        self.get("expand")
    }

    pub fn base(&self) -> Result<BaseImage> {
        self.get("base")
            .ok_or_else(|| Error::MissingProps {
                path: self.path.clone(),
                missing: vec!["base".to_string()],
            })?
            .parse()
    }

    /// Use the fetched base image as is, without customizing it
    pub fn meta_data_only(&self) -> bool {
        matches!(
            self.get("meta_data_only").map(|v| v.to_lowercase()).as_deref(),
            Some("true" | "yes" | "1")
        )
    }

    /// File name of the built image, `<name>-<version>.qcow2`
    pub fn image_file_name(&self) -> String {
        format!("{}-{}.qcow2", self.name(), self.version())
    }
}

impl std::fmt::Display for ImageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPEC: &str = "\
#name=el7-base
#base = libguestfs:centos-7.2
#distro=el7
#osinfo=centos7.0
#arch=x86_64
#expand=/dev/sda3
# plain comment
install vim

run-command yum clean all
";

    #[test]
    fn test_parse_props_and_commands() {
        let spec = ImageSpec::parse("/specs/el7-base.spec", SPEC);
        assert_eq!(spec.id, "el7-base.spec");
        assert_eq!(spec.name(), "el7-base");
        assert_eq!(spec.get("base"), Some("libguestfs:centos-7.2"));
        assert_eq!(spec.line_of("distro"), Some(3));
        assert_eq!(spec.commands, vec!["install vim", "run-command yum clean all"]);
        assert_eq!(
            spec.props.keys().collect::<Vec<_>>(),
            vec!["name", "base", "distro", "osinfo", "arch", "expand"]
        );
    }

    #[test]
    fn test_defaults() {
        let spec = ImageSpec::parse("/specs/x", "#name=x\n");
        assert_eq!(spec.version(), "1.0");
        assert_eq!(spec.arch(), "x86_64");
        assert_eq!(spec.image_file_name(), "x-1.0.qcow2");
        assert!(!spec.meta_data_only());
    }

    #[test]
    fn test_value_trailing_whitespace_trimmed() {
        let spec = ImageSpec::parse("s", "#version = 2.1   \n#meta_data_only=True\n");
        assert_eq!(spec.version(), "2.1");
        assert!(spec.meta_data_only());
    }

    #[test]
    fn test_verify_reports_missing_props() {
        let spec = ImageSpec::parse("/specs/fc23", "#name=fc23\n#base=libguestfs:fedora-23\n");
        assert!(spec.verify(RepoFormat::Lago).is_err());

        match spec.verify(RepoFormat::All) {
            Err(Error::MissingProps { missing, .. }) => {
                assert_eq!(missing, vec!["arch", "distro", "expand", "osinfo"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_verify_checks_base() {
        let spec = ImageSpec::parse("s", "#name=a\n#base=nope\n#distro=el7\n");
        assert!(matches!(
            spec.verify(RepoFormat::Lago),
            Err(Error::MalformedBase { .. })
        ));

        let spec = ImageSpec::parse("s", SPEC);
        assert!(spec.verify(RepoFormat::All).is_ok());
    }

    #[test]
    fn test_verify_rejects_path_in_name() {
        let spec = ImageSpec::parse(
            "s",
            "#name=../escape\n#base=simple:/tmp/a.qcow2\n#distro=el7\n",
        );
        match spec.verify(RepoFormat::Lago) {
            Err(Error::InvalidProp { key, value, .. }) => {
                assert_eq!(key, "name");
                assert_eq!(value, "../escape");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let spec = ImageSpec::parse(
            "s",
            "#name=el7\n#version=1 beta\n#base=simple:/tmp/a.qcow2\n#distro=el7\n",
        );
        assert!(matches!(
            spec.verify(RepoFormat::Lago),
            Err(Error::InvalidProp { key, .. }) if key == "version"
        ));
    }
}
