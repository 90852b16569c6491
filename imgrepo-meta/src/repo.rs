//! lago repository metadata (`repo.metadata`)
//!
//! Layout expected by lago clients:
//! - `name`: repository name
//! - `sources`: where templates are fetched from (one http source)
//! - `templates`: template name -> version -> entry

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::artifact::ImageArtifact;
use crate::Result;

pub const CHECKSUM_TYPE: &str = "sha512";

/// Helper to skip serializing empty strings
fn is_empty_string(s: &str) -> bool {
    s.is_empty()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceArgs {
    pub baseurl: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub args: SourceArgs,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One version of a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateVersion {
    pub source: String,
    pub handle: String,
    pub timestamp: i64,
    pub url: String,
    pub file: String,
    pub size: u64,
    pub checksum: String,
    pub checksum_type: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub distro: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub versions: BTreeMap<String, TemplateVersion>,
}

/// Complete repository metadata document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetadata {
    pub name: String,
    pub sources: BTreeMap<String, Source>,
    pub templates: BTreeMap<String, Template>,
}

impl RepoMetadata {
    /// Empty repository served over http from `base_url`
    pub fn new(repo_name: &str, base_url: &str) -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            repo_name.to_string(),
            Source {
                args: SourceArgs {
                    baseurl: base_url.to_string(),
                },
                kind: "http".to_string(),
            },
        );

        Self {
            name: repo_name.to_string(),
            sources,
            templates: BTreeMap::new(),
        }
    }

    /// Record an artifact published at `url`.
    ///
    /// Returns the entry it replaced, if any; callers reject duplicates
    /// before getting here.
    pub fn add_artifact(&mut self, artifact: &ImageArtifact, url: String) -> Option<TemplateVersion> {
        let entry = TemplateVersion {
            source: self.name.clone(),
            handle: artifact.handle(),
            timestamp: artifact.timestamp,
            url,
            file: artifact.file_name.clone(),
            size: artifact.size(),
            checksum: artifact.checksums.sha512.clone(),
            checksum_type: CHECKSUM_TYPE.to_string(),
            distro: artifact.descriptor.distro.clone(),
        };

        self.templates
            .entry(artifact.name().to_string())
            .or_default()
            .versions
            .insert(artifact.version().to_string(), entry)
    }

    pub fn has_version(&self, name: &str, version: &str) -> bool {
        self.templates
            .get(name)
            .map(|t| t.versions.contains_key(version))
            .unwrap_or(false)
    }

    /// All entries, ordered by name then version
    pub fn entries(&self) -> Vec<(&str, &str, &TemplateVersion)> {
        self.templates
            .iter()
            .flat_map(|(name, template)| {
                template
                    .versions
                    .iter()
                    .map(move |(version, entry)| (name.as_str(), version.as_str(), entry))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.templates.values().map(|t| t.versions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)? + "\n")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}
