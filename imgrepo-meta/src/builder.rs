//! Repository metadata builder
//!
//! Turns a list of artifact descriptors into the lago `repo.metadata` and the
//! virt-builder `index`, then writes both atomically.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info};
use url::Url;

use crate::artifact::{ArtifactDescriptor, ImageArtifact};
use crate::index::{IndexDocument, IndexEntry};
use crate::output::write_documents;
use crate::repo::RepoMetadata;
use crate::{Error, Result};

pub const REPO_METADATA_FILE: &str = "repo.metadata";
pub const INDEX_FILE: &str = "index";

/// Where and under which name a repository is published
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub repo_name: String,
    /// Base URL without trailing slash
    pub base_url: String,
    pub output_dir: PathBuf,
}

impl RepoConfig {
    pub fn new(
        repo_name: impl Into<String>,
        base_url: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            repo_name: repo_name.into(),
            base_url: normalize_base_url(base_url)?,
            output_dir: output_dir.into(),
        })
    }

    /// Absolute URL of a file published in this repository
    pub fn url_for(&self, file_name: &str) -> String {
        join_url(&self.base_url, file_name)
    }
}

/// Validate a base URL and strip its trailing slashes
pub fn normalize_base_url(base_url: &str) -> Result<String> {
    let invalid = |reason: String| Error::InvalidBaseUrl {
        url: base_url.to_string(),
        reason,
    };

    let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" | "file" => {}
        other => return Err(invalid(format!("unsupported scheme '{}'", other))),
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(invalid("query and fragment are not allowed".to_string()));
    }

    Ok(base_url.trim_end_matches('/').to_string())
}

/// Join a base URL and a relative name with exactly one separator
pub fn join_url(base_url: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

/// The two documents describing a repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDocuments {
    pub metadata: RepoMetadata,
    pub index: IndexDocument,
}

impl RepoDocuments {
    /// Serialized `(repo.metadata, index)`
    pub fn render(&self) -> Result<(String, String)> {
        Ok((self.metadata.to_json()?, self.index.render()))
    }
}

pub struct MetadataBuilder {
    config: RepoConfig,
    jobs: usize,
}

impl MetadataBuilder {
    pub fn new(config: RepoConfig) -> Self {
        Self { config, jobs: 1 }
    }

    /// Number of images hashed concurrently; 0 uses one worker per CPU
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    /// Validate and checksum every descriptor.
    ///
    /// Duplicates are rejected first, along with distinct images that would
    /// share an index section or a URL. Then every image must exist, and only
    /// then are files hashed. The result is sorted by name then version.
    pub fn resolve(&self, descriptors: &[ArtifactDescriptor]) -> Result<Vec<ImageArtifact>> {
        let mut sorted: Vec<&ArtifactDescriptor> = descriptors.iter().collect();
        sorted.sort_by(|a, b| a.key().cmp(&b.key()).then_with(|| a.file.cmp(&b.file)));

        for pair in sorted.windows(2) {
            if pair[0].key() == pair[1].key() {
                return Err(Error::DuplicateArtifact {
                    name: pair[0].name.clone(),
                    version: pair[0].version.clone(),
                    first: pair[0].file.clone(),
                    second: pair[1].file.clone(),
                });
            }
        }

        let mut index_ids: HashMap<String, &Path> = HashMap::new();
        let mut file_names: HashMap<String, &Path> = HashMap::new();
        for descriptor in &sorted {
            let file_name = descriptor.file_name()?;
            for (field, value, seen) in [
                ("index id", descriptor.index_id(), &mut index_ids),
                ("file name", file_name, &mut file_names),
            ] {
                if let Some(first) = seen.insert(value.clone(), descriptor.file.as_path()) {
                    return Err(Error::ConflictingArtifact {
                        field,
                        value,
                        first: first.to_path_buf(),
                        second: descriptor.file.clone(),
                    });
                }
            }
        }

        for descriptor in &sorted {
            if !descriptor.file.is_file() {
                return Err(Error::MissingArtifact {
                    path: descriptor.file.clone(),
                });
            }
        }

        info!("Checksumming {} image(s)", sorted.len());
        if self.jobs == 1 {
            return sorted
                .into_iter()
                .map(|d| ImageArtifact::from_descriptor(d.clone()))
                .collect();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()?;
        // Collecting an indexed parallel iterator keeps the sorted order
        pool.install(|| {
            sorted
                .into_par_iter()
                .map(|d| ImageArtifact::from_descriptor(d.clone()))
                .collect()
        })
    }

    /// Build both documents in memory
    pub fn build(&self, descriptors: &[ArtifactDescriptor]) -> Result<RepoDocuments> {
        let artifacts = self.resolve(descriptors)?;

        let mut metadata = RepoMetadata::new(&self.config.repo_name, &self.config.base_url);
        let mut index = IndexDocument::default();

        for artifact in &artifacts {
            let url = self.config.url_for(&artifact.file_name);
            debug!("{} {} -> {}", artifact.name(), artifact.version(), url);

            let replaced = metadata.add_artifact(artifact, url.clone());
            debug_assert!(replaced.is_none());
            index.push(IndexEntry::from_artifact(artifact, url));
        }

        Ok(RepoDocuments { metadata, index })
    }

    /// Write previously built documents into the output directory
    pub fn write(&self, documents: &RepoDocuments) -> Result<()> {
        let (metadata, index) = documents.render()?;
        write_documents(
            &self.config.output_dir,
            &[
                (REPO_METADATA_FILE, metadata.as_bytes()),
                (INDEX_FILE, index.as_bytes()),
            ],
        )?;

        info!(
            "Wrote metadata for {} image(s) -> {:?}",
            documents.metadata.len(),
            self.config.output_dir
        );
        Ok(())
    }

    /// Build and write both documents; nothing is written on failure
    pub fn generate(&self, descriptors: &[ArtifactDescriptor]) -> Result<RepoDocuments> {
        let documents = self.build(descriptors)?;
        self.write(&documents)?;
        Ok(documents)
    }

    pub fn repo_metadata_path(&self) -> PathBuf {
        self.config.output_dir.join(REPO_METADATA_FILE)
    }

    pub fn index_path(&self) -> PathBuf {
        self.config.output_dir.join(INDEX_FILE)
    }
}

/// Regenerate a repository from the descriptor sidecars in `repo_dir`
pub fn generate_from_sidecars(
    config: RepoConfig,
    repo_dir: &Path,
    jobs: usize,
) -> Result<RepoDocuments> {
    let descriptors =
        crate::artifact::read_sidecars(repo_dir, &[REPO_METADATA_FILE, INDEX_FILE])?;
    info!(
        "Found {} image descriptor(s) in {:?}",
        descriptors.len(),
        repo_dir
    );
    MetadataBuilder::new(config)
        .with_jobs(jobs)
        .generate(&descriptors)
}
